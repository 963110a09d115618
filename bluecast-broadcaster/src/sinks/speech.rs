use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{truncate_chars, Sink, SinkKind};
use crate::command::{CommandRunner, CommandSpec};
use crate::config::SpeechConfig;
use crate::error::Result;

const TRUNCATION_MARKER: &str = "... message truncated";
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Text-to-speech through an external synthesizer.
///
/// At most one utterance plays at a time, process-wide. A message arriving
/// while another is being spoken is not spoken at all: the single permit is
/// try-acquired and overlapping requests are dropped rather than queued.
pub struct SpeechSink {
    runner: Arc<dyn CommandRunner>,
    config: SpeechConfig,
    in_flight: Arc<Semaphore>,
}

impl SpeechSink {
    pub fn new(runner: Arc<dyn CommandRunner>, config: SpeechConfig) -> Self {
        Self {
            runner,
            config,
            in_flight: Arc::new(Semaphore::new(1)),
        }
    }

    /// Whether the synthesizer answers `--version`.
    pub async fn probe(runner: &dyn CommandRunner, program: &str) -> bool {
        let spec = CommandSpec::new(program, PROBE_TIMEOUT).arg("--version");
        match runner.run_checked(&spec).await {
            Ok(_) => true,
            Err(e) => {
                debug!("Speech probe failed: {}", e);
                false
            }
        }
    }

    pub fn command_for(&self, text: &str) -> CommandSpec {
        let spoken = truncate_chars(text, self.config.max_chars, TRUNCATION_MARKER);
        let amplitude = (self.config.volume.clamp(0.0, 1.0) * 200.0).round() as u32;

        CommandSpec::new(
            self.config.program.clone(),
            Duration::from_secs(self.config.timeout_secs),
        )
        .arg("-s")
        .arg(self.config.rate.to_string())
        .arg("-a")
        .arg(amplitude.to_string())
        // Message text may start with '-'.
        .arg("--")
        .arg(spoken)
    }

    pub fn is_speaking(&self) -> bool {
        self.in_flight.available_permits() == 0
    }

    /// Start speaking `text` in the background.
    ///
    /// Returns `None` when another utterance is still playing.
    pub fn speak(&self, text: &str) -> Option<JoinHandle<()>> {
        let permit = match Arc::clone(&self.in_flight).try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                debug!("Speech already in progress, skipping message");
                return None;
            }
        };

        let spec = self.command_for(text);
        let runner = Arc::clone(&self.runner);

        Some(tokio::spawn(async move {
            let _permit = permit;
            match runner.run(&spec).await {
                Ok(output) if output.success => info!("Message spoken successfully"),
                Ok(output) => warn!(
                    "Speech synthesizer exited with {:?}: {}",
                    output.code,
                    output.stderr.trim()
                ),
                Err(e) if e.is_timeout() => warn!("Speech timed out: {}", e),
                Err(e) => error!("Error in text-to-speech: {}", e),
            }
        }))
    }
}

#[async_trait]
impl Sink for SpeechSink {
    fn kind(&self) -> SinkKind {
        SinkKind::Speech
    }

    async fn deliver(&self, text: &str, _sender: Option<&str>) -> Result<()> {
        // Fire and forget; outcome is logged by the spawned task.
        let _ = self.speak(text);
        Ok(())
    }
}
