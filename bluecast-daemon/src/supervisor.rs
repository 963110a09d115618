//! Service lifecycle: startup checks, accept loop, retry and shutdown
//!
//! ```text
//! STOPPED -> STARTING -> LISTENING -> (ACCEPTING <-> SESSION_ACTIVE) -> STOPPING -> STOPPED
//! ```
//!
//! One task runs accept and session back to back, so at most one peer is
//! served at a time. Every await that can block for long is raced against
//! the shutdown channel; [`ShutdownHandle::stop`] therefore drops the live
//! socket and the listener promptly.

use std::future::Future;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use bluecast_broadcaster::{Dispatcher, MessageLimits, SystemEventKind};
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::adapter::AdapterControl;
use crate::config::DaemonConfig;
use crate::error::{DaemonError, Result};
use crate::monitor::StatusMonitor;
use crate::session::{SessionHandler, SharedRegistry};
use crate::transport::Listener;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Stopped,
    Starting,
    Listening,
    Accepting,
    SessionActive,
    Stopping,
}

#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    pub require_adapter: bool,
    pub make_discoverable: bool,
    pub retry_delay: Duration,
    pub limits: MessageLimits,
    pub buffer_size: usize,
    /// `None` disables the status monitor.
    pub monitor_interval: Option<Duration>,
}

impl SupervisorSettings {
    pub fn from_config(config: &DaemonConfig) -> Self {
        Self {
            require_adapter: config.transport.require_adapter,
            make_discoverable: config.transport.make_discoverable,
            retry_delay: config.transport.retry_delay(),
            limits: config.messages,
            buffer_size: config.transport.buffer_size,
            monitor_interval: config
                .monitor
                .enabled
                .then(|| Duration::from_secs(config.monitor.interval_secs)),
        }
    }
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self::from_config(&DaemonConfig::default())
    }
}

type SharedState = Arc<Mutex<ServiceState>>;

fn lock_state(state: &SharedState) -> std::sync::MutexGuard<'_, ServiceState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

/// Requests shutdown of a running [`Supervisor`]. Cheap to clone.
#[derive(Clone)]
pub struct ShutdownHandle {
    running: Arc<AtomicBool>,
    shutdown_tx: Arc<watch::Sender<bool>>,
    state: SharedState,
}

impl ShutdownHandle {
    /// Begin STOPPING. Returns false when already stopping or stopped.
    pub fn stop(&self) -> bool {
        {
            let mut state = lock_state(&self.state);
            if matches!(*state, ServiceState::Stopped | ServiceState::Stopping) {
                return false;
            }
            *state = ServiceState::Stopping;
        }

        info!("Stopping Bluetooth receiver...");
        self.running.store(false, Ordering::SeqCst);
        self.shutdown_tx.send_replace(true);
        true
    }
}

pub struct Supervisor {
    dispatcher: Arc<Dispatcher>,
    adapter: Arc<AdapterControl>,
    registry: SharedRegistry,
    settings: SupervisorSettings,
    running: Arc<AtomicBool>,
    shutdown_tx: Arc<watch::Sender<bool>>,
    state: SharedState,
}

impl Supervisor {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        adapter: Arc<AdapterControl>,
        settings: SupervisorSettings,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            dispatcher,
            adapter,
            registry: SharedRegistry::default(),
            settings,
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx: Arc::new(shutdown_tx),
            state: Arc::new(Mutex::new(ServiceState::Stopped)),
        }
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            running: Arc::clone(&self.running),
            shutdown_tx: Arc::clone(&self.shutdown_tx),
            state: Arc::clone(&self.state),
        }
    }

    pub fn state(&self) -> ServiceState {
        *lock_state(&self.state)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn registry(&self) -> SharedRegistry {
        Arc::clone(&self.registry)
    }

    /// Move to `next` unless a stop is already in progress.
    fn advance(&self, next: ServiceState) {
        let mut state = lock_state(&self.state);
        if *state != ServiceState::Stopping {
            *state = next;
        }
    }

    fn finish(&self) {
        self.running.store(false, Ordering::SeqCst);
        *lock_state(&self.state) = ServiceState::Stopped;
    }

    fn startup_failed(&self, reason: String) -> DaemonError {
        error!("{}", reason);
        self.finish();
        DaemonError::Startup(reason)
    }

    /// Run until stopped. `bind` opens the listener once the adapter checks pass.
    ///
    /// Startup failures are returned without retry. Transport errors after
    /// startup are logged and retried after the configured delay forever.
    pub async fn run<F, Fut, L>(&self, bind: F) -> Result<()>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = io::Result<L>>,
        L: Listener,
    {
        {
            let mut state = lock_state(&self.state);
            if *state != ServiceState::Stopped {
                return Err(DaemonError::AlreadyRunning);
            }
            *state = ServiceState::Starting;
        }
        self.shutdown_tx.send_replace(false);
        self.running.store(true, Ordering::SeqCst);

        info!("Starting Bluetooth receiver...");

        if self.settings.require_adapter && !self.adapter.is_available(Instant::now()).await {
            return Err(self.startup_failed(format!(
                "Bluetooth adapter {} is not available",
                self.adapter.device()
            )));
        }

        if self.settings.make_discoverable {
            self.adapter.make_discoverable().await;
        }

        let info = self.adapter.adapter_info(Instant::now()).await;
        if let Some(name) = info.get("Name") {
            info!(
                "Adapter: {} (powered: {})",
                name,
                info.get("Powered").map(String::as_str).unwrap_or("unknown")
            );
        }

        let mut listener = match bind().await {
            Ok(listener) => listener,
            Err(e) => return Err(self.startup_failed(format!("Failed to bind listener: {}", e))),
        };

        self.advance(ServiceState::Listening);
        self.dispatcher
            .dispatch_system_event(
                SystemEventKind::ServiceStarted,
                &format!("Bluetooth receiver started on {}", listener.local_endpoint()),
            )
            .await;

        let monitor = self.settings.monitor_interval.map(|interval| {
            StatusMonitor::new(
                Arc::clone(&self.adapter),
                Arc::clone(&self.registry),
                Arc::clone(&self.running),
                interval,
            )
            .spawn(self.shutdown_tx.subscribe())
        });

        let handler = SessionHandler::new(
            Arc::clone(&self.dispatcher),
            Arc::clone(&self.registry),
            self.settings.limits,
            self.settings.buffer_size,
        );
        let mut shutdown = self.shutdown_tx.subscribe();

        while self.is_running() && !*shutdown.borrow() {
            self.advance(ServiceState::Accepting);
            self.dispatcher
                .dispatch_system_event(SystemEventKind::WaitingConnection, "Waiting for connections...")
                .await;

            let accepted = tokio::select! {
                accepted = listener.accept() => accepted,
                _ = shutdown.changed() => break,
            };

            let failed = match accepted {
                Ok((stream, remote)) => {
                    self.advance(ServiceState::SessionActive);
                    let end = handler.run(stream, &remote, shutdown.clone()).await;
                    end.is_transport_error()
                }
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                    true
                }
            };

            if failed && self.is_running() {
                warn!("Retrying in {}s", self.settings.retry_delay.as_secs());
                tokio::select! {
                    _ = tokio::time::sleep(self.settings.retry_delay) => {}
                    _ = shutdown.changed() => break,
                }
            }
        }

        self.advance(ServiceState::Stopping);
        drop(listener);
        if let Some(monitor) = monitor {
            monitor.abort();
        }

        self.dispatcher
            .dispatch_system_event(SystemEventKind::ServiceStopped, "Bluetooth receiver stopped")
            .await;
        self.dispatcher.close();
        self.finish();
        info!("Bluetooth receiver stopped");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bluecast_broadcaster::{CommandOutput, ScriptedRunner};

    fn supervisor(runner: ScriptedRunner, settings: SupervisorSettings) -> Supervisor {
        Supervisor::new(
            Arc::new(Dispatcher::new(Vec::new())),
            Arc::new(AdapterControl::new(Arc::new(runner), "hci0")),
            settings,
        )
    }

    fn quiet_settings() -> SupervisorSettings {
        SupervisorSettings {
            monitor_interval: None,
            ..SupervisorSettings::default()
        }
    }

    #[tokio::test]
    async fn test_unavailable_adapter_is_startup_failure() {
        let runner = ScriptedRunner::new().respond("hciconfig", CommandOutput::ok("hci0:\n\tDOWN\n"));
        let supervisor = supervisor(runner, quiet_settings());

        let result = supervisor
            .run(|| async { crate::transport::TcpTransport::bind("127.0.0.1:0").await })
            .await;

        assert!(matches!(result, Err(DaemonError::Startup(_))));
        assert_eq!(supervisor.state(), ServiceState::Stopped);
        assert!(!supervisor.is_running());
    }

    #[tokio::test]
    async fn test_bind_failure_is_startup_failure() {
        let settings = SupervisorSettings {
            require_adapter: false,
            ..quiet_settings()
        };
        let supervisor = supervisor(ScriptedRunner::new(), settings);

        let result = supervisor
            .run(|| async {
                Err::<crate::transport::TcpTransport, _>(io::Error::new(
                    io::ErrorKind::AddrInUse,
                    "channel busy",
                ))
            })
            .await;

        match result {
            Err(DaemonError::Startup(reason)) => assert!(reason.contains("channel busy")),
            other => panic!("expected startup failure, got {:?}", other),
        }
    }

    #[test]
    fn test_stop_before_start_is_noop() {
        let supervisor = supervisor(ScriptedRunner::new(), quiet_settings());
        let handle = supervisor.shutdown_handle();
        assert!(!handle.stop());
        assert_eq!(supervisor.state(), ServiceState::Stopped);
    }

    #[test]
    fn test_settings_follow_config() {
        let mut config = DaemonConfig::default();
        config.monitor.enabled = false;
        config.transport.retry_delay_secs = 7;

        let settings = SupervisorSettings::from_config(&config);
        assert_eq!(settings.retry_delay, Duration::from_secs(7));
        assert!(settings.monitor_interval.is_none());
        assert_eq!(settings.buffer_size, 1024);
    }
}
