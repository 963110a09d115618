use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use super::{truncate_chars, Sink, SinkKind};
use crate::command::{CommandRunner, CommandSpec};
use crate::config::DesktopConfig;
use crate::error::Result;

/// Desktop popup via a notify-send compatible binary.
pub struct DesktopSink {
    runner: Arc<dyn CommandRunner>,
    config: DesktopConfig,
}

impl DesktopSink {
    pub fn new(runner: Arc<dyn CommandRunner>, config: DesktopConfig) -> Self {
        Self { runner, config }
    }

    pub fn command_for(&self, text: &str, sender: Option<&str>) -> CommandSpec {
        let title = match sender {
            Some(sender) => format!("{} from {}", self.config.title, sender),
            None => self.config.title.clone(),
        };
        let body = truncate_chars(text, self.config.max_chars, "...");

        CommandSpec::new(
            self.config.program.clone(),
            Duration::from_secs(self.config.timeout_secs),
        )
        .arg("-t")
        .arg(self.config.display_timeout_ms.to_string())
        .arg("-i")
        .arg(self.config.icon.clone())
        // Message text may start with '-'.
        .arg("--")
        .arg(title)
        .arg(body)
    }
}

#[async_trait]
impl Sink for DesktopSink {
    fn kind(&self) -> SinkKind {
        SinkKind::Desktop
    }

    async fn deliver(&self, text: &str, sender: Option<&str>) -> Result<()> {
        let spec = self.command_for(text, sender);
        self.runner.run_checked(&spec).await?;
        info!("Desktop notification sent");
        Ok(())
    }
}
