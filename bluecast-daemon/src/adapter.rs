//! Bluetooth adapter control through BlueZ command-line tools
//!
//! Availability, pairing mode, paired devices and adapter details are all
//! answered by `hciconfig`/`bluetoothctl`. Answers are cached with a TTL so
//! the status monitor and the supervisor can ask freely.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use bluecast_broadcaster::{CommandRunner, CommandSpec};
use serde::Serialize;
use tracing::{error, info};

use crate::cache::TtlCache;

const AVAILABILITY_TTL: Duration = Duration::from_secs(30);
const PAIRED_DEVICES_TTL: Duration = Duration::from_secs(60);
const ADAPTER_INFO_TTL: Duration = Duration::from_secs(120);

const HCICONFIG_TIMEOUT: Duration = Duration::from_secs(5);
const BLUETOOTHCTL_TIMEOUT: Duration = Duration::from_secs(10);

/// Commands fed to `bluetoothctl` to make the host pairable.
const DISCOVERABLE_SCRIPT: &str = "power on\nagent on\ndefault-agent\ndiscoverable on\npairable on\n";

/// A remote device BlueZ has a pairing for
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PairedDevice {
    pub address: String,
    pub name: String,
}

pub struct AdapterControl {
    runner: Arc<dyn CommandRunner>,
    device: String,
    availability: Mutex<TtlCache<bool>>,
    paired: Mutex<TtlCache<Vec<PairedDevice>>>,
    info: Mutex<TtlCache<BTreeMap<String, String>>>,
}

impl AdapterControl {
    pub fn new(runner: Arc<dyn CommandRunner>, device: impl Into<String>) -> Self {
        Self {
            runner,
            device: device.into(),
            availability: Mutex::new(TtlCache::new(AVAILABILITY_TTL)),
            paired: Mutex::new(TtlCache::new(PAIRED_DEVICES_TTL)),
            info: Mutex::new(TtlCache::new(ADAPTER_INFO_TTL)),
        }
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    /// True when `hciconfig <device>` reports the adapter UP RUNNING.
    pub async fn is_available(&self, now: Instant) -> bool {
        if let Some(cached) = lock(&self.availability).get(now) {
            return cached;
        }

        let spec = CommandSpec::new("hciconfig", HCICONFIG_TIMEOUT).arg(self.device.clone());
        let available = match self.runner.run(&spec).await {
            Ok(output) => output.stdout.contains("UP RUNNING"),
            Err(e) => {
                error!("Error checking Bluetooth status: {}", e);
                false
            }
        };

        lock(&self.availability).insert(available, now);
        available
    }

    /// Power on, register an agent, and turn on discoverable + pairable.
    pub async fn make_discoverable(&self) -> bool {
        let spec = CommandSpec::new("bluetoothctl", BLUETOOTHCTL_TIMEOUT).stdin(DISCOVERABLE_SCRIPT);
        match self.runner.run(&spec).await {
            Ok(_) => {
                info!("Adapter is now discoverable and pairable");
                // Power state may have changed.
                lock(&self.availability).invalidate();
                true
            }
            Err(e) => {
                error!("Error making adapter discoverable: {}", e);
                false
            }
        }
    }

    pub async fn paired_devices(&self, now: Instant) -> Vec<PairedDevice> {
        if let Some(cached) = lock(&self.paired).get(now) {
            return cached;
        }

        let spec = CommandSpec::new("bluetoothctl", BLUETOOTHCTL_TIMEOUT).arg("paired-devices");
        match self.runner.run(&spec).await {
            Ok(output) => {
                let devices = parse_paired_devices(&output.stdout);
                lock(&self.paired).insert(devices.clone(), now);
                devices
            }
            Err(e) => {
                error!("Error getting paired devices: {}", e);
                Vec::new()
            }
        }
    }

    /// `bluetoothctl show` as key/value pairs.
    pub async fn adapter_info(&self, now: Instant) -> BTreeMap<String, String> {
        if let Some(cached) = lock(&self.info).get(now) {
            return cached;
        }

        let spec = CommandSpec::new("bluetoothctl", BLUETOOTHCTL_TIMEOUT).arg("show");
        match self.runner.run(&spec).await {
            Ok(output) => {
                let info = parse_adapter_info(&output.stdout);
                lock(&self.info).insert(info.clone(), now);
                info
            }
            Err(e) => {
                error!("Error getting adapter info: {}", e);
                BTreeMap::new()
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Parse `Device <address> <name>` lines.
pub fn parse_paired_devices(stdout: &str) -> Vec<PairedDevice> {
    stdout
        .lines()
        .filter(|line| line.starts_with("Device"))
        .filter_map(|line| {
            let mut parts = line.splitn(3, ' ');
            let _ = parts.next();
            let address = parts.next()?.to_string();
            let name = parts
                .next()
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .unwrap_or("Unknown")
                .to_string();
            Some(PairedDevice { address, name })
        })
        .collect()
}

/// Parse `Key: value` lines; the first colon splits.
pub fn parse_adapter_info(stdout: &str) -> BTreeMap<String, String> {
    stdout
        .lines()
        .filter_map(|line| line.split_once(':'))
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bluecast_broadcaster::{CommandOutput, ScriptedRunner};

    const HCI_UP: &str = "hci0:\tType: Primary  Bus: UART\n\tUP RUNNING PSCAN\n";

    #[test]
    fn test_parse_paired_devices() {
        let out = "Device 11:22:33:44:55:66 Pixel 7\nDevice AA:BB:CC:DD:EE:FF\nController 00:00 pi\n";
        let devices = parse_paired_devices(out);
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].address, "11:22:33:44:55:66");
        assert_eq!(devices[0].name, "Pixel 7");
        assert_eq!(devices[1].name, "Unknown");
    }

    #[test]
    fn test_parse_adapter_info() {
        let out = "Controller B8:27:EB:00:00:01 (public)\n\tName: raspberrypi\n\tPowered: yes\n\tModalias: usb:v1D6Bp0246d0537\n";
        let info = parse_adapter_info(out);
        assert_eq!(info.get("Name").map(String::as_str), Some("raspberrypi"));
        assert_eq!(info.get("Powered").map(String::as_str), Some("yes"));
        assert_eq!(info.get("Modalias").map(String::as_str), Some("usb:v1D6Bp0246d0537"));
    }

    #[tokio::test]
    async fn test_availability_cached_for_ttl() {
        let runner = Arc::new(ScriptedRunner::new().respond("hciconfig", CommandOutput::ok(HCI_UP)));
        let adapter = AdapterControl::new(runner.clone(), "hci0");
        let start = Instant::now();

        assert!(adapter.is_available(start).await);
        assert!(adapter.is_available(start + Duration::from_secs(10)).await);
        assert_eq!(runner.calls_to("hciconfig").len(), 1);

        assert!(adapter.is_available(start + Duration::from_secs(31)).await);
        assert_eq!(runner.calls_to("hciconfig").len(), 2);
        assert_eq!(runner.calls_to("hciconfig")[0].args, vec!["hci0"]);
    }

    #[tokio::test]
    async fn test_down_or_missing_adapter_unavailable() {
        let down = ScriptedRunner::new().respond("hciconfig", CommandOutput::ok("hci0:\n\tDOWN\n"));
        let adapter = AdapterControl::new(Arc::new(down), "hci0");
        assert!(!adapter.is_available(Instant::now()).await);

        let missing = ScriptedRunner::new().missing("hciconfig");
        let adapter = AdapterControl::new(Arc::new(missing), "hci0");
        assert!(!adapter.is_available(Instant::now()).await);
    }

    #[tokio::test]
    async fn test_make_discoverable_feeds_script() {
        let runner = Arc::new(ScriptedRunner::new());
        let adapter = AdapterControl::new(runner.clone(), "hci0");

        assert!(adapter.make_discoverable().await);

        let calls = runner.calls_to("bluetoothctl");
        assert_eq!(calls.len(), 1);
        let script = calls[0].stdin.as_deref().unwrap();
        assert!(script.contains("discoverable on"));
        assert!(script.contains("pairable on"));
    }

    #[tokio::test]
    async fn test_paired_devices_failure_is_empty_and_uncached() {
        let runner = Arc::new(ScriptedRunner::new().time_out("bluetoothctl"));
        let adapter = AdapterControl::new(runner.clone(), "hci0");
        let now = Instant::now();

        assert!(adapter.paired_devices(now).await.is_empty());
        assert!(adapter.paired_devices(now).await.is_empty());
        assert_eq!(runner.calls_to("bluetoothctl").len(), 2);
    }
}
