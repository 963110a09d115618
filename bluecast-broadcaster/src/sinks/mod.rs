//! Notification sinks
//!
//! Each sink wraps one side-effecting output behind the same
//! `deliver(text, sender)` contract. [`SinkKind`] declaration order is the
//! dispatch order.

mod console;
mod desktop;
mod file;
mod speech;

use async_trait::async_trait;

use crate::error::Result;
use crate::events::SystemEventKind;

pub use console::{ConsoleCapture, ConsoleSink};
pub use desktop::DesktopSink;
pub use file::FileLogSink;
pub use speech::SpeechSink;

/// Output channel kinds, in dispatch order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SinkKind {
    Console,
    Speech,
    Desktop,
    File,
}

impl SinkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Console => "console",
            Self::Speech => "speech",
            Self::Desktop => "desktop",
            Self::File => "file",
        }
    }

    /// Routine lifecycle notices skip speech and desktop popups.
    pub fn receives_system_events(&self) -> bool {
        matches!(self, Self::Console | Self::File)
    }
}

#[async_trait]
pub trait Sink: Send + Sync {
    fn kind(&self) -> SinkKind;

    /// Present one normalized message.
    async fn deliver(&self, text: &str, sender: Option<&str>) -> Result<()>;

    /// Record a lifecycle notice. Only called for kinds where
    /// [`SinkKind::receives_system_events`] holds.
    async fn deliver_event(&self, _kind: SystemEventKind, _detail: &str) -> Result<()> {
        Ok(())
    }
}

/// Cut `text` to `max_chars` characters, appending `marker` when cut.
pub(crate) fn truncate_chars(text: &str, max_chars: usize, marker: &str) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}{}", &text[..byte_idx], marker),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_order_is_dispatch_order() {
        let mut kinds = vec![SinkKind::File, SinkKind::Desktop, SinkKind::Console, SinkKind::Speech];
        kinds.sort();
        assert_eq!(
            kinds,
            vec![SinkKind::Console, SinkKind::Speech, SinkKind::Desktop, SinkKind::File]
        );
    }

    #[test]
    fn test_system_event_routing() {
        assert!(SinkKind::Console.receives_system_events());
        assert!(SinkKind::File.receives_system_events());
        assert!(!SinkKind::Speech.receives_system_events());
        assert!(!SinkKind::Desktop.receives_system_events());
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("short", 10, "..."), "short");
        assert_eq!(truncate_chars("exactly10!", 10, "..."), "exactly10!");
        assert_eq!(truncate_chars("abcdefghijk", 10, "..."), "abcdefghij...");
        assert_eq!(truncate_chars("ééééé", 2, "…"), "éé…");
    }
}
