//! Message fan-out for bluecast
//!
//! Turns raw frames received from a paired phone into clean text and
//! presents each message to every enabled notification sink: console,
//! speech synthesis, desktop popup and a daily append-only log.
//!
//! # Pieces
//!
//! - [`normalize`] - decode, sanitize and bounds-check one frame
//! - [`Dispatcher`] - fault-isolated fan-out in fixed sink order
//! - [`sinks`] - the four sink adapters behind the [`Sink`] trait
//! - [`command`] - typed external program invocation ([`CommandRunner`])
//!
//! # Example Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use bluecast_broadcaster::{normalize, Dispatcher, MessageLimits, SinkConfig, SystemRunner};
//!
//! #[tokio::main]
//! async fn main() {
//!     let dispatcher = Dispatcher::from_config(&SinkConfig::default(), Arc::new(SystemRunner));
//!
//!     if let Some(text) = normalize(b"Hello\x00World\n", &MessageLimits::default()) {
//!         dispatcher.dispatch(&text, Some("AA:BB:CC:DD:EE:FF")).await;
//!     }
//! }
//! ```

pub mod command;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod normalizer;
pub mod sinks;

// Re-exports
pub use command::{CommandOutput, CommandRunner, CommandSpec, ScriptedRunner, SystemRunner};
pub use config::{ConsoleConfig, DesktopConfig, FileLogConfig, SinkConfig, SpeechConfig};
pub use dispatcher::Dispatcher;
pub use error::{CommandError, Result, SinkError};
pub use events::SystemEventKind;
pub use normalizer::{normalize, MessageLimits};
pub use sinks::{Sink, SinkKind};
