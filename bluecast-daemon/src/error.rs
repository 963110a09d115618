use thiserror::Error;

#[derive(Error, Debug)]
pub enum DaemonError {
    /// Adapter unavailable or listener could not be bound. Not retried.
    #[error("Startup failed: {0}")]
    Startup(String),

    #[error("Service already running")]
    AlreadyRunning,
}

pub type Result<T> = std::result::Result<T, DaemonError>;
