use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{info, warn};

use crate::command::CommandRunner;
use crate::config::SinkConfig;
use crate::events::SystemEventKind;
use crate::sinks::{ConsoleSink, DesktopSink, FileLogSink, Sink, SinkKind, SpeechSink};

const TEST_MESSAGE: &str = "This is a test message from the Bluetooth receiver";
const TEST_SENDER: &str = "Test Device";

/// Fans one message out to every enabled sink.
///
/// Sinks run in [`SinkKind`] order (console, speech, desktop, file), one at a
/// time. A failing sink is logged and skipped; nothing is ever returned to the
/// caller. Once [`close`](Self::close)d, both dispatch operations do nothing.
pub struct Dispatcher {
    sinks: Vec<Box<dyn Sink>>,
    closed: AtomicBool,
}

impl Dispatcher {
    pub fn new(mut sinks: Vec<Box<dyn Sink>>) -> Self {
        // Stable: two sinks of one kind keep their relative order.
        sinks.sort_by_key(|sink| sink.kind());
        Self {
            sinks,
            closed: AtomicBool::new(false),
        }
    }

    /// Build the enabled sinks from configuration.
    pub fn from_config(config: &SinkConfig, runner: Arc<dyn CommandRunner>) -> Self {
        let mut sinks: Vec<Box<dyn Sink>> = Vec::new();

        if config.console.enabled {
            sinks.push(Box::new(ConsoleSink::stdout()));
        }
        if config.speech.enabled {
            sinks.push(Box::new(SpeechSink::new(
                Arc::clone(&runner),
                config.speech.clone(),
            )));
        }
        if config.desktop.enabled {
            sinks.push(Box::new(DesktopSink::new(
                Arc::clone(&runner),
                config.desktop.clone(),
            )));
        }
        if config.file.enabled {
            let dir = config.file.dir.clone().unwrap_or_else(|| PathBuf::from("logs"));
            sinks.push(Box::new(FileLogSink::new(dir)));
        }

        Self::new(sinks)
    }

    pub fn sink_kinds(&self) -> Vec<SinkKind> {
        self.sinks.iter().map(|sink| sink.kind()).collect()
    }

    /// Present a normalized message to every sink.
    pub async fn dispatch(&self, text: &str, sender: Option<&str>) {
        if self.is_closed() {
            return;
        }

        for sink in &self.sinks {
            if let Err(e) = sink.deliver(text, sender).await {
                warn!("{} sink failed: {}", sink.kind().as_str(), e);
            }
        }
    }

    /// Record a lifecycle notice on console and file sinks only.
    pub async fn dispatch_system_event(&self, kind: SystemEventKind, detail: &str) {
        if self.is_closed() {
            return;
        }

        for sink in self
            .sinks
            .iter()
            .filter(|sink| sink.kind().receives_system_events())
        {
            if let Err(e) = sink.deliver_event(kind, detail).await {
                warn!("{} sink failed on {}: {}", sink.kind().as_str(), kind, e);
            }
        }

        info!("System event: {}", kind);
    }

    /// Stop accepting work. Idempotent.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Push a fixed test message through each sink individually.
    pub async fn test_all_outputs(&self) {
        info!("Testing all broadcast outputs...");
        for sink in &self.sinks {
            let kind = sink.kind().as_str();
            match sink.deliver(TEST_MESSAGE, Some(TEST_SENDER)).await {
                Ok(()) => info!("✓ {} output ok", kind),
                Err(e) => warn!("✗ {} output failed: {}", kind, e),
            }
        }
    }
}
