use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Local;

use super::{Sink, SinkKind};
use crate::error::Result;
use crate::events::SystemEventKind;

const SEPARATOR_WIDTH: usize = 50;

enum Output {
    Stdout,
    Captured(Arc<Mutex<String>>),
}

/// Bordered block on standard output.
///
/// Stdout write failures panic like `println!`: losing the console is a
/// process-level fault, not a sink failure.
pub struct ConsoleSink {
    output: Output,
}

/// Handle onto a captured console's text.
#[derive(Clone)]
pub struct ConsoleCapture(Arc<Mutex<String>>);

impl ConsoleCapture {
    pub fn contents(&self) -> String {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl ConsoleSink {
    pub fn stdout() -> Self {
        Self {
            output: Output::Stdout,
        }
    }

    /// Console that writes into memory instead of stdout.
    pub fn captured() -> (Self, ConsoleCapture) {
        let buffer = Arc::new(Mutex::new(String::new()));
        let sink = Self {
            output: Output::Captured(Arc::clone(&buffer)),
        };
        (sink, ConsoleCapture(buffer))
    }

    pub fn format_message(timestamp: &str, text: &str, sender: Option<&str>) -> String {
        let separator = "=".repeat(SEPARATOR_WIDTH);
        let mut block = format!("\n{separator}\nBLUETOOTH MESSAGE RECEIVED\n{separator}\n");
        block.push_str(&format!("Time: {timestamp}\n"));
        if let Some(sender) = sender {
            block.push_str(&format!("From: {sender}\n"));
        }
        block.push_str(&format!("Message: {text}\n{separator}\n\n"));
        block
    }

    pub fn format_event(timestamp: &str, kind: SystemEventKind, detail: &str) -> String {
        if detail.is_empty() {
            format!("\n[{timestamp}] System Event: {kind}\n")
        } else {
            format!("\n[{timestamp}] System Event: {kind} - {detail}\n")
        }
    }

    fn write(&self, text: &str) {
        match &self.output {
            Output::Stdout => print!("{text}"),
            Output::Captured(buffer) => buffer
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push_str(text),
        }
    }
}

#[async_trait]
impl Sink for ConsoleSink {
    fn kind(&self) -> SinkKind {
        SinkKind::Console
    }

    async fn deliver(&self, text: &str, sender: Option<&str>) -> Result<()> {
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        self.write(&Self::format_message(&timestamp, text, sender));
        Ok(())
    }

    async fn deliver_event(&self, kind: SystemEventKind, detail: &str) -> Result<()> {
        let timestamp = Local::now().format("%H:%M:%S").to_string();
        self.write(&Self::format_event(&timestamp, kind, detail));
        Ok(())
    }
}
