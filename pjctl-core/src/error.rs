//! Domain-specific error types for the projector control protocol.
//!
//! All fallible operations return `Result<T, PjError>`. Timeouts while
//! reading a command's ack or response never reach the caller; they are
//! logged inside the engine and the batch is truncated instead.

use std::time::Duration;
use thiserror::Error;

/// Shorthand result type used across the crate.
pub type Result<T> = std::result::Result<T, PjError>;

/// The canonical error type for the projector control protocol.
#[derive(Debug, Error)]
pub enum PjError {
    // ── Session Errors ───────────────────────────────────────────
    /// The session could not be established: TCP failure, handshake
    /// timeout, or the retry budget ran out.
    #[error("connect error: {0}")]
    Connect(String),

    /// The device rejected the configured password.
    #[error("authentication rejected by device")]
    Auth,

    /// The device answered with bytes that do not fit the protocol.
    #[error("command error: {0}")]
    Command(String),

    // ── Transport Errors ─────────────────────────────────────────
    /// The device actively refused the TCP connection.
    #[error("connection refused")]
    ConnectionRefused,

    /// TCP connect did not complete in time.
    #[error("connect timeout after {0:?}")]
    ConnectTimeout(Duration),

    /// A read did not complete in time.
    #[error("read timeout after {0:?}")]
    ReadTimeout(Duration),

    /// A write did not drain in time.
    #[error("write timeout after {0:?}")]
    WriteTimeout(Duration),

    /// The TCP/IO layer reported an error.
    #[error("connection error: {0}")]
    Connection(#[from] std::io::Error),

    // ── Caller Errors ────────────────────────────────────────────
    /// A command frame could not be encoded.
    #[error("invalid command: {0}")]
    InvalidCommand(String),

    /// An operation was attempted in the wrong state.
    #[error("protocol violation: {0}")]
    ProtocolViolation(&'static str),

    /// Configuration values are unusable.
    #[error("invalid config: {0}")]
    Config(String),
}

impl PjError {
    /// Returns `true` for any deadline expiry.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::ConnectTimeout(_) | Self::ReadTimeout(_) | Self::WriteTimeout(_)
        )
    }

    /// Returns `true` when retrying the same request cannot succeed.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Auth | Self::InvalidCommand(_) | Self::Config(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let e = PjError::Command("Handshake init invalid".into());
        assert!(e.to_string().contains("Handshake init invalid"));

        let e = PjError::ReadTimeout(Duration::from_secs(2));
        assert!(e.to_string().contains("2s"));
    }

    #[test]
    fn from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        let e: PjError = io_err.into();
        assert!(matches!(e, PjError::Connection(_)));
    }

    #[test]
    fn classification() {
        assert!(PjError::ReadTimeout(Duration::ZERO).is_timeout());
        assert!(PjError::ConnectTimeout(Duration::ZERO).is_timeout());
        assert!(!PjError::Auth.is_timeout());

        assert!(PjError::Auth.is_terminal());
        assert!(!PjError::ConnectionRefused.is_terminal());
        assert!(!PjError::Connect("retries exceeded".into()).is_terminal());
    }
}
