//! Periodic status logging

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use sysinfo::System;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::adapter::AdapterControl;
use crate::session::SharedRegistry;

#[derive(Debug, Clone, Serialize)]
pub struct StatusSummary {
    pub uptime_secs: u64,
    pub memory_usage_percent: f64,
    pub paired_devices: usize,
    pub connected_clients: usize,
}

pub struct StatusMonitor {
    adapter: Arc<AdapterControl>,
    registry: SharedRegistry,
    running: Arc<AtomicBool>,
    interval: Duration,
}

impl StatusMonitor {
    pub fn new(
        adapter: Arc<AdapterControl>,
        registry: SharedRegistry,
        running: Arc<AtomicBool>,
        interval: Duration,
    ) -> Self {
        Self {
            adapter,
            registry,
            running,
            interval,
        }
    }

    pub async fn collect(&self) -> StatusSummary {
        let mut sys = System::new();
        sys.refresh_memory();
        let memory_usage_percent = match sys.total_memory() {
            0 => 0.0,
            total => sys.used_memory() as f64 / total as f64 * 100.0,
        };

        let paired_devices = self.adapter.paired_devices(Instant::now()).await.len();
        let connected_clients = self
            .registry
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len();

        StatusSummary {
            uptime_secs: System::uptime(),
            memory_usage_percent,
            paired_devices,
            connected_clients,
        }
    }

    /// Log a summary every interval until shutdown. Never touches the accept loop.
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(self.interval) => {}
                    _ = shutdown.changed() => break,
                }

                if !self.running.load(Ordering::SeqCst) {
                    break;
                }

                let summary = self.collect().await;
                match serde_json::to_string(&summary) {
                    Ok(json) => info!("Status: {}", json),
                    Err(e) => warn!("Failed to encode status summary: {}", e),
                }
            }
        })
    }
}
