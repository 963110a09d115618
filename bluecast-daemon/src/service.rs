//! Wiring: configuration in, running service out

use std::sync::Arc;
use std::time::Instant;

use bluecast_broadcaster::sinks::SpeechSink;
use bluecast_broadcaster::{CommandRunner, Dispatcher, SinkConfig};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::adapter::AdapterControl;
use crate::config::DaemonConfig;
use crate::error::Result;
use crate::supervisor::{ShutdownHandle, Supervisor, SupervisorSettings};
use crate::transport;

/// Build the dispatcher, disabling speech when the synthesizer is missing.
pub async fn build_dispatcher(config: &SinkConfig, runner: Arc<dyn CommandRunner>) -> Dispatcher {
    let mut config = config.clone();

    if config.speech.enabled && !SpeechSink::probe(runner.as_ref(), &config.speech.program).await {
        warn!(
            "{} not available, speech output disabled",
            config.speech.program
        );
        config.speech.enabled = false;
    }

    let dispatcher = Dispatcher::from_config(&config, runner);
    let kinds: Vec<&str> = dispatcher.sink_kinds().iter().map(|k| k.as_str()).collect();
    info!("Enabled outputs: {}", kinds.join(", "));
    dispatcher
}

/// Stop the supervisor on SIGINT or SIGTERM.
pub fn install_signal_handler(handle: ShutdownHandle) -> JoinHandle<()> {
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("Received shutdown signal");
        handle.stop();
    })
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
        }
        Err(e) => {
            warn!("Failed to install SIGTERM handler: {}", e);
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

/// Run the receiver until a signal stops it.
pub async fn run_service(config: &DaemonConfig, runner: Arc<dyn CommandRunner>) -> Result<()> {
    let dispatcher = Arc::new(build_dispatcher(&config.sinks, Arc::clone(&runner)).await);
    let adapter = Arc::new(AdapterControl::new(
        runner,
        config.transport.hci_device.clone(),
    ));

    let supervisor = Supervisor::new(
        dispatcher,
        adapter,
        SupervisorSettings::from_config(config),
    );
    let signals = install_signal_handler(supervisor.shutdown_handle());

    let result = supervisor.run(|| transport::bind(&config.transport)).await;
    signals.abort();
    result
}

/// Push the fixed test message through every enabled output.
pub async fn test_outputs(config: &DaemonConfig, runner: Arc<dyn CommandRunner>) {
    let dispatcher = build_dispatcher(&config.sinks, runner).await;
    dispatcher.test_all_outputs().await;

    // Speech runs detached; let it finish before the process exits.
    tokio::time::sleep(std::time::Duration::from_secs(config.sinks.speech.timeout_secs.min(3))).await;
    dispatcher.close();
}

/// Log adapter availability and details. Returns availability.
pub async fn check_adapter(config: &DaemonConfig, runner: Arc<dyn CommandRunner>) -> bool {
    let adapter = AdapterControl::new(runner, config.transport.hci_device.clone());
    let now = Instant::now();

    let available = adapter.is_available(now).await;
    if available {
        info!("✓ Bluetooth adapter {} is UP RUNNING", adapter.device());
    } else {
        warn!("✗ Bluetooth adapter {} is not available", adapter.device());
    }

    for (key, value) in adapter.adapter_info(now).await {
        info!("  {}: {}", key, value);
    }

    let paired = adapter.paired_devices(now).await;
    info!("Paired devices: {}", paired.len());
    for device in paired {
        info!("  {} ({})", device.name, device.address);
    }

    available
}

#[cfg(test)]
mod tests {
    use super::*;
    use bluecast_broadcaster::{CommandOutput, ScriptedRunner, SinkKind};

    #[tokio::test]
    async fn test_missing_synthesizer_disables_speech() {
        let runner = Arc::new(ScriptedRunner::new().missing("espeak"));
        let dispatcher = build_dispatcher(&SinkConfig::default(), runner).await;
        assert_eq!(
            dispatcher.sink_kinds(),
            vec![SinkKind::Console, SinkKind::Desktop, SinkKind::File]
        );
    }

    #[tokio::test]
    async fn test_available_synthesizer_kept() {
        let runner = Arc::new(ScriptedRunner::new());
        let dispatcher = build_dispatcher(&SinkConfig::default(), runner.clone()).await;
        assert!(dispatcher.sink_kinds().contains(&SinkKind::Speech));
        assert_eq!(runner.calls_to("espeak")[0].args, vec!["--version"]);
    }

    #[tokio::test]
    async fn test_check_adapter_reports_state() {
        let up = ScriptedRunner::new().respond("hciconfig", CommandOutput::ok("hci0:\n\tUP RUNNING\n"));
        assert!(check_adapter(&DaemonConfig::default(), Arc::new(up)).await);

        let missing = ScriptedRunner::new().missing("hciconfig");
        assert!(!check_adapter(&DaemonConfig::default(), Arc::new(missing)).await);
    }
}
