//! Configuration management

use anyhow::{Context, Result};
use bluecast_broadcaster::{MessageLimits, SinkConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Which listener the daemon binds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Bluetooth RFCOMM (the normal deployment)
    Rfcomm,
    /// Plain TCP with identical semantics, for hosts without an adapter
    Tcp,
}

/// Listener and retry settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub kind: TransportKind,

    /// RFCOMM channel the phone app connects to
    pub rfcomm_channel: u8,

    /// Address for the TCP listener
    pub tcp_bind: String,

    /// HCI device checked for availability (e.g. "hci0")
    pub hci_device: String,

    /// Receive buffer; each read is treated as one message
    pub buffer_size: usize,

    /// Pause after a transport error before accepting again
    pub retry_delay_secs: u64,

    /// Refuse to start unless the adapter reports UP RUNNING
    pub require_adapter: bool,

    /// Power on and make the adapter discoverable/pairable at startup
    pub make_discoverable: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            kind: TransportKind::Rfcomm,
            rfcomm_channel: 1,
            tcp_bind: "127.0.0.1:7878".to_string(),
            hci_device: "hci0".to_string(),
            buffer_size: 1024,
            retry_delay_secs: 5,
            require_adapter: true,
            make_discoverable: true,
        }
    }
}

impl TransportConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

/// Background status logging
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub enabled: bool,
    pub interval_secs: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 300,
        }
    }
}

/// Daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Path to configuration file
    #[serde(skip)]
    pub config_path: PathBuf,

    pub transport: TransportConfig,

    /// Accepted message length window
    pub messages: MessageLimits,

    pub sinks: SinkConfig,

    pub monitor: MonitorConfig,
}

impl DaemonConfig {
    /// Load configuration from `path` (or the platform default), creating it
    /// with defaults when missing.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(path) => path.to_path_buf(),
            None => bluecast_paths::get_config_file_path()
                .context("Failed to resolve config file path")?,
        };

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read {}", config_path.display()))?;

            let mut config = Self::from_toml(&contents)
                .with_context(|| format!("Failed to parse {}", config_path.display()))?;

            config.config_path = config_path;
            Ok(config)
        } else {
            let config = Self {
                config_path,
                ..Self::default()
            };
            config.save().context("Failed to save default config")?;
            Ok(config)
        }
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: DaemonConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(&self.config_path, contents).context("Failed to write config file")?;

        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.messages.min_length > self.messages.max_length {
            anyhow::bail!(
                "messages.min_length ({}) exceeds messages.max_length ({})",
                self.messages.min_length,
                self.messages.max_length
            );
        }
        if self.transport.buffer_size == 0 {
            anyhow::bail!("transport.buffer_size must be positive");
        }
        if self.transport.retry_delay_secs == 0 {
            anyhow::bail!("transport.retry_delay_secs must be at least 1");
        }
        if self.transport.kind == TransportKind::Rfcomm
            && !(1..=30).contains(&self.transport.rfcomm_channel)
        {
            anyhow::bail!(
                "transport.rfcomm_channel must be 1-30, got {}",
                self.transport.rfcomm_channel
            );
        }
        Ok(())
    }

    /// Fill in the log directory from the platform default when unset.
    pub fn resolve_log_dir(&mut self) -> Result<PathBuf> {
        if let Some(dir) = &self.sinks.file.dir {
            bluecast_paths::ensure_private_dir(dir)?;
            return Ok(dir.clone());
        }

        let dir = bluecast_paths::get_logs_dir().context("Failed to resolve logs directory")?;
        self.sinks.file.dir = Some(dir.clone());
        Ok(dir)
    }
}
