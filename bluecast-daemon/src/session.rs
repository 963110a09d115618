//! One connected peer, from accept to disconnect

use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex};

use bluecast_broadcaster::{normalize, Dispatcher, MessageLimits, SystemEventKind};
use chrono::{DateTime, Local};
use serde::Serialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::transport::BoxedConnection;

/// Live state of an accepted connection.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub remote: String,
    pub started_at: DateTime<Local>,
    pub messages_received: u64,
}

/// Sessions keyed by remote identifier. Holds zero or one entry.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<String, Session>,
}

impl SessionRegistry {
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn get(&self, remote: &str) -> Option<&Session> {
        self.sessions.get(remote)
    }
}

pub type SharedRegistry = Arc<Mutex<SessionRegistry>>;

fn lock(registry: &SharedRegistry) -> std::sync::MutexGuard<'_, SessionRegistry> {
    registry.lock().unwrap_or_else(|e| e.into_inner())
}

/// Registers a session on creation and removes it on drop.
pub struct SessionGuard {
    registry: SharedRegistry,
    remote: String,
}

impl SessionGuard {
    pub fn register(registry: &SharedRegistry, remote: &str) -> Self {
        lock(registry).sessions.insert(
            remote.to_string(),
            Session {
                remote: remote.to_string(),
                started_at: Local::now(),
                messages_received: 0,
            },
        );
        Self {
            registry: Arc::clone(registry),
            remote: remote.to_string(),
        }
    }

    pub fn record_message(&self) -> u64 {
        let mut registry = lock(&self.registry);
        match registry.sessions.get_mut(&self.remote) {
            Some(session) => {
                session.messages_received += 1;
                session.messages_received
            }
            None => 0,
        }
    }

    pub fn snapshot(&self) -> Option<Session> {
        lock(&self.registry).sessions.get(&self.remote).cloned()
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        lock(&self.registry).sessions.remove(&self.remote);
    }
}

/// Why a session loop ended.
#[derive(Debug)]
pub enum SessionEnd {
    PeerClosed,
    TransportError(io::Error),
    Shutdown,
}

impl SessionEnd {
    pub fn is_transport_error(&self) -> bool {
        matches!(self, SessionEnd::TransportError(_))
    }
}

pub fn acknowledgment(at: &DateTime<Local>) -> String {
    format!("Message received at {}", at.format("%H:%M:%S"))
}

/// Reads frames from one peer and fans each accepted message out.
pub struct SessionHandler {
    dispatcher: Arc<Dispatcher>,
    registry: SharedRegistry,
    limits: MessageLimits,
    buffer_size: usize,
}

impl SessionHandler {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        registry: SharedRegistry,
        limits: MessageLimits,
        buffer_size: usize,
    ) -> Self {
        Self {
            dispatcher,
            registry,
            limits,
            buffer_size: buffer_size.max(1),
        }
    }

    pub async fn run(
        &self,
        mut stream: BoxedConnection,
        remote: &str,
        mut shutdown: watch::Receiver<bool>,
    ) -> SessionEnd {
        let guard = SessionGuard::register(&self.registry, remote);
        info!("Accepted connection from {}", remote);
        self.dispatcher
            .dispatch_system_event(
                SystemEventKind::ConnectionEstablished,
                &format!("Connected to {}", remote),
            )
            .await;

        let mut buffer = vec![0u8; self.buffer_size];

        let end = loop {
            if *shutdown.borrow() {
                break SessionEnd::Shutdown;
            }

            let read = tokio::select! {
                read = stream.read(&mut buffer) => read,
                _ = shutdown.changed() => break SessionEnd::Shutdown,
            };

            let n = match read {
                Ok(0) => break SessionEnd::PeerClosed,
                Ok(n) => n,
                Err(e) => break SessionEnd::TransportError(e),
            };

            let Some(text) = normalize(&buffer[..n], &self.limits) else {
                debug!("Dropped invalid frame of {} bytes from {}", n, remote);
                continue;
            };

            info!("Received message from {}: {} chars", remote, text.chars().count());
            self.dispatcher.dispatch(&text, Some(remote)).await;
            guard.record_message();

            // A peer that stops reading can stall this write indefinitely.
            let ack = acknowledgment(&Local::now());
            let written = tokio::select! {
                written = stream.write_all(ack.as_bytes()) => written,
                _ = shutdown.changed() => break SessionEnd::Shutdown,
            };
            if let Err(e) = written {
                debug!("Acknowledgment to {} failed: {}", remote, e);
            }
        };

        // The stream is closed before the disconnect is announced.
        drop(stream);

        let session = guard.snapshot();
        let count = session.as_ref().map_or(0, |s| s.messages_received);
        match &end {
            SessionEnd::TransportError(e) => warn!("Connection error with {}: {}", remote, e),
            SessionEnd::Shutdown => info!("Closing connection to {} for shutdown", remote),
            SessionEnd::PeerClosed => info!("Client {} disconnected", remote),
        }
        if let Some(session) = &session {
            let duration = Local::now().signed_duration_since(session.started_at);
            info!(
                "Session stats: {} messages in {}s",
                count,
                duration.num_seconds()
            );
        }

        self.dispatcher
            .dispatch_system_event(
                SystemEventKind::ConnectionClosed,
                &format!("Disconnected from {} ({} messages)", remote, count),
            )
            .await;

        drop(guard);
        end
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bluecast_broadcaster::sinks::{ConsoleCapture, ConsoleSink};
    use bluecast_broadcaster::Sink;
    use tokio::io::duplex;

    fn handler() -> (SessionHandler, SharedRegistry, ConsoleCapture) {
        let (console, capture) = ConsoleSink::captured();
        let sinks: Vec<Box<dyn Sink>> = vec![Box::new(console)];
        let registry = SharedRegistry::default();
        let handler = SessionHandler::new(
            Arc::new(Dispatcher::new(sinks)),
            Arc::clone(&registry),
            MessageLimits::default(),
            1024,
        );
        (handler, registry, capture)
    }

    #[test]
    fn test_acknowledgment_format() {
        let at = Local::now();
        let ack = acknowledgment(&at);
        assert!(ack.starts_with("Message received at "));
        assert_eq!(ack.len(), "Message received at ".len() + 8);
    }

    #[test]
    fn test_guard_removes_entry_on_drop() {
        let registry = SharedRegistry::default();
        {
            let guard = SessionGuard::register(&registry, "AA:BB");
            assert_eq!(guard.record_message(), 1);
            assert_eq!(guard.record_message(), 2);
            assert_eq!(lock(&registry).len(), 1);
        }
        assert!(lock(&registry).is_empty());
    }

    #[tokio::test]
    async fn test_message_dispatched_then_acknowledged() {
        let (handler, registry, console) = handler();
        let (_tx, rx) = watch::channel(false);
        let (server, mut client) = duplex(4096);

        let run = tokio::spawn(async move {
            handler.run(Box::new(server), "11:22:33:44:55:66", rx).await
        });

        client.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 64];
        let n = client.read(&mut buf).await.unwrap();
        let ack = std::str::from_utf8(&buf[..n]).unwrap();
        assert!(ack.starts_with("Message received at "));

        // Acknowledgment follows dispatch of the same message.
        assert!(console.contents().contains("Message: ping"));
        assert_eq!(
            lock(&registry)
                .get("11:22:33:44:55:66")
                .map(|s| s.messages_received),
            Some(1)
        );

        drop(client);
        let end = run.await.unwrap();
        assert!(matches!(end, SessionEnd::PeerClosed));
        assert!(lock(&registry).is_empty());

        let out = console.contents();
        let established = out.find("CONNECTION_ESTABLISHED").unwrap();
        let closed = out.find("CONNECTION_CLOSED - Disconnected from 11:22:33:44:55:66 (1 messages)");
        assert!(closed.unwrap() > established);
    }

    #[tokio::test]
    async fn test_invalid_frame_gets_no_ack() {
        let (handler, registry, console) = handler();
        let (_tx, rx) = watch::channel(false);
        let (server, mut client) = duplex(4096);

        let run = tokio::spawn(async move { handler.run(Box::new(server), "peer", rx).await });

        client.write_all(b"\x00\x01  ").await.unwrap();
        tokio::task::yield_now().await;
        drop(client);
        run.await.unwrap();

        assert!(!console.contents().contains("BLUETOOTH MESSAGE RECEIVED"));
        assert!(console.contents().contains("(0 messages)"));
        assert!(lock(&registry).is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_unblocks_pending_read() {
        let (handler, registry, _console) = handler();
        let (tx, rx) = watch::channel(false);
        let (server, _client) = duplex(64);

        let run = tokio::spawn(async move { handler.run(Box::new(server), "peer", rx).await });
        tokio::task::yield_now().await;

        tx.send_replace(true);
        let end = run.await.unwrap();
        assert!(matches!(end, SessionEnd::Shutdown));
        assert!(lock(&registry).is_empty());
    }
}
