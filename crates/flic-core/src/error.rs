//! Bridge error types with rich context

use thiserror::Error;

use crate::types::RemovedReason;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Bridge error types organized by layer/domain
#[derive(Debug, Error)]
pub enum Error {
    // ─────────────────────────────────────────────────────────────
    // Common/Infrastructure Errors
    // ─────────────────────────────────────────────────────────────
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    // ─────────────────────────────────────────────────────────────
    // Daemon Supervision Errors (adapter-fatal)
    // ─────────────────────────────────────────────────────────────
    #[error("flicd binary not found. Install flicd or set daemon_binary in the config.")]
    FlicdNotFound,

    #[error("Failed to spawn flicd: {reason}")]
    ProcessSpawn { reason: String },

    #[error("flicd exited unexpectedly with code: {code:?}")]
    DaemonExited { code: Option<i32> },

    #[error("Flic daemon error: {message}")]
    Daemon { message: String },

    // ─────────────────────────────────────────────────────────────
    // Transport Errors
    // ─────────────────────────────────────────────────────────────
    #[error("No Flic daemon reachable at {host}:{port}")]
    DaemonUnreachable { host: String, port: u16 },

    #[error("Flic daemon rejected the session: {message}")]
    SessionRejected { message: String },

    #[error("Session transport error: {message}")]
    Transport { message: String },

    // ─────────────────────────────────────────────────────────────
    // Negotiation Errors (scoped to a single address)
    // ─────────────────────────────────────────────────────────────
    #[error("Too many pending connections")]
    TooManyPendingConnections,

    #[error("Connection attempt timed out")]
    NegotiationTimedOut,

    #[error("Connection channel removed: {}", reason.describe())]
    ChannelRemoved { reason: RemovedReason },

    // ─────────────────────────────────────────────────────────────
    // Operator Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Read-only property: {name}")]
    ReadOnlyProperty { name: String },

    // ─────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ─────────────────────────────────────────────────────────────
    // Channel/Communication Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Channel send error: {message}")]
    ChannelSend { message: String },

    #[error("Channel closed unexpectedly")]
    ChannelClosed,
}

// ─────────────────────────────────────────────────────────────────
// Convenience Constructors
// ─────────────────────────────────────────────────────────────────

impl Error {
    pub fn daemon(message: impl Into<String>) -> Self {
        Self::Daemon {
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    pub fn session_rejected(message: impl Into<String>) -> Self {
        Self::SessionRejected {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn channel_send(message: impl Into<String>) -> Self {
        Self::ChannelSend {
            message: message.into(),
        }
    }

    pub fn read_only_property(name: impl Into<String>) -> Self {
        Self::ReadOnlyProperty { name: name.into() }
    }

    /// Check if this error is scoped to a single button address.
    ///
    /// Negotiation failures never affect other in-flight negotiations
    /// and are not retried; the next scan naturally re-offers the
    /// address.
    pub fn is_negotiation_failure(&self) -> bool {
        matches!(
            self,
            Error::TooManyPendingConnections
                | Error::NegotiationTimedOut
                | Error::ChannelRemoved { .. }
        )
    }

    /// Check if this error should tear down the whole adapter
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::FlicdNotFound
                | Error::ProcessSpawn { .. }
                | Error::DaemonExited { .. }
                | Error::DaemonUnreachable { .. }
        )
    }

    /// Check if this is a recoverable error
    pub fn is_recoverable(&self) -> bool {
        self.is_negotiation_failure()
            || matches!(
                self,
                Error::ReadOnlyProperty { .. } | Error::Daemon { .. } | Error::ChannelSend { .. }
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_messages() {
        let err = Error::daemon("connection lost");
        assert_eq!(err.to_string(), "Flic daemon error: connection lost");

        let err = Error::FlicdNotFound;
        assert!(err.to_string().contains("flicd binary not found"));

        let err = Error::ChannelRemoved {
            reason: RemovedReason::VerifyTimeout,
        };
        assert!(err.to_string().contains("verification timed out"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_error_is_fatal() {
        assert!(Error::FlicdNotFound.is_fatal());
        assert!(Error::DaemonExited { code: Some(1) }.is_fatal());
        assert!(Error::DaemonUnreachable {
            host: "localhost".into(),
            port: 5551
        }
        .is_fatal());
        assert!(!Error::NegotiationTimedOut.is_fatal());
    }

    #[test]
    fn test_error_is_negotiation_failure() {
        assert!(Error::TooManyPendingConnections.is_negotiation_failure());
        assert!(Error::NegotiationTimedOut.is_negotiation_failure());
        assert!(Error::ChannelRemoved {
            reason: RemovedReason::ButtonIsPrivate
        }
        .is_negotiation_failure());
        assert!(!Error::FlicdNotFound.is_negotiation_failure());
    }

    #[test]
    fn test_timeout_distinct_from_daemon_removal() {
        // The 30-second abandonment path must stay distinguishable from
        // a daemon-reported removal reason.
        let timeout = Error::NegotiationTimedOut;
        let removed = Error::ChannelRemoved {
            reason: RemovedReason::InternetBackendError,
        };
        assert_ne!(timeout.to_string(), removed.to_string());
    }

    #[test]
    fn test_read_only_property_is_recoverable() {
        let err = Error::read_only_property("battery");
        assert!(err.is_recoverable());
        assert!(!err.is_fatal());
    }
}
