use std::fmt;

/// Lifecycle notices routed to console and file sinks only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SystemEventKind {
    ServiceStarted,
    ServiceStopped,
    WaitingConnection,
    ConnectionEstablished,
    ConnectionClosed,
}

impl SystemEventKind {
    /// Name written into the system log.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ServiceStarted => "SERVICE_STARTED",
            Self::ServiceStopped => "SERVICE_STOPPED",
            Self::WaitingConnection => "WAITING_CONNECTION",
            Self::ConnectionEstablished => "CONNECTION_ESTABLISHED",
            Self::ConnectionClosed => "CONNECTION_CLOSED",
        }
    }
}

impl fmt::Display for SystemEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
