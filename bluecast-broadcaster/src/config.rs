//! Sink configuration, immutable after start

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    pub enabled: bool,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Text-to-speech settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    pub enabled: bool,

    /// Synthesis binary (espeak-compatible flags)
    pub program: String,

    /// Words per minute
    pub rate: u32,

    /// 0.0 to 1.0, scaled to espeak amplitude 0-200
    pub volume: f32,

    /// Longer text is cut and suffixed with a truncation marker
    pub max_chars: usize,

    pub timeout_secs: u64,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            program: "espeak".to_string(),
            rate: 150,
            volume: 0.8,
            max_chars: 200,
            timeout_secs: 30,
        }
    }
}

/// Desktop popup settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DesktopConfig {
    pub enabled: bool,
    pub program: String,
    pub title: String,
    pub icon: String,

    /// How long the popup stays on screen
    pub display_timeout_ms: u64,

    pub max_chars: usize,

    /// Hard limit on the notifier process itself
    pub timeout_secs: u64,
}

impl Default for DesktopConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            program: "notify-send".to_string(),
            title: "Bluetooth Message".to_string(),
            icon: "bluetooth".to_string(),
            display_timeout_ms: 5000,
            max_chars: 100,
            timeout_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FileLogConfig {
    pub enabled: bool,

    /// Directory for `messages_*.log` / `system_*.log` (None = platform logs dir)
    pub dir: Option<PathBuf>,
}

impl Default for FileLogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    pub console: ConsoleConfig,
    pub speech: SpeechConfig,
    pub desktop: DesktopConfig,
    pub file: FileLogConfig,
}
