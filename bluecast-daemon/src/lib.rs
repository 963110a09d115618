//! bluecast daemon library
//!
//! Receives text from a paired phone over Bluetooth RFCOMM (or TCP) and hands
//! each message to the broadcaster. Modules are public for integration tests.

pub mod adapter;
pub mod cache;
pub mod config;
pub mod error;
pub mod monitor;
pub mod service;
pub mod session;
pub mod supervisor;
pub mod transport;

pub use config::DaemonConfig;
pub use error::{DaemonError, Result};
pub use supervisor::{ServiceState, ShutdownHandle, Supervisor, SupervisorSettings};
