//! Handshake state machine.
//!
//! Models the lifecycle of a device session with validated transitions
//! that return `Result` instead of panicking.

use std::fmt;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::PjError;

/// The current phase of a device session.
///
/// ```text
///  Disconnected ──► Connecting ──► AwaitGreeting ──► AwaitAuthAck ──► Ready
///       ▲               ▲  │              │                 │            │
///       │               └──┴── busy ◄─────┘                 │            │
///       └───────────────────── any failure ◄────────────────┴────────────┘
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum HandshakePhase {
    /// No socket. Initial / terminal state.
    #[default]
    Disconnected,

    /// TCP connect in progress (including refused-connection retries).
    Connecting,

    /// Socket open; waiting for the device greeting.
    AwaitGreeting,

    /// Session request sent; waiting for the auth ack.
    AwaitAuthAck,

    /// Handshake complete; commands may be exchanged.
    Ready {
        /// When the session became ready.
        since: Instant,
    },
}

impl fmt::Display for HandshakePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::AwaitGreeting => write!(f, "AwaitGreeting"),
            Self::AwaitAuthAck => write!(f, "AwaitAuthAck"),
            Self::Ready { .. } => write!(f, "Ready"),
        }
    }
}

impl HandshakePhase {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready { .. })
    }

    pub fn is_disconnected(&self) -> bool {
        matches!(self, Self::Disconnected)
    }

    /// How long the session has been ready, if it is.
    pub fn ready_for(&self) -> Option<Duration> {
        match self {
            Self::Ready { since } => Some(since.elapsed()),
            _ => None,
        }
    }

    // ── Transitions ──────────────────────────────────────────────

    /// Valid from: `Disconnected`.
    pub fn begin_connect(&mut self) -> Result<(), PjError> {
        match self {
            Self::Disconnected => {
                *self = Self::Connecting;
                Ok(())
            }
            _ => Err(PjError::ProtocolViolation(
                "cannot connect: not in Disconnected state",
            )),
        }
    }

    /// Valid from: `Connecting`.
    pub fn socket_open(&mut self) -> Result<(), PjError> {
        match self {
            Self::Connecting => {
                *self = Self::AwaitGreeting;
                Ok(())
            }
            _ => Err(PjError::ProtocolViolation(
                "cannot await greeting: not in Connecting state",
            )),
        }
    }

    /// Go back to `Connecting` after a busy greeting.
    ///
    /// Valid from: `AwaitGreeting`.
    pub fn retry(&mut self) -> Result<(), PjError> {
        match self {
            Self::AwaitGreeting => {
                *self = Self::Connecting;
                Ok(())
            }
            _ => Err(PjError::ProtocolViolation(
                "cannot retry: not in AwaitGreeting state",
            )),
        }
    }

    /// Valid from: `AwaitGreeting`.
    pub fn greeted(&mut self) -> Result<(), PjError> {
        match self {
            Self::AwaitGreeting => {
                *self = Self::AwaitAuthAck;
                Ok(())
            }
            _ => Err(PjError::ProtocolViolation(
                "cannot authenticate: not in AwaitGreeting state",
            )),
        }
    }

    /// Valid from: `AwaitAuthAck`.
    pub fn authenticated(&mut self) -> Result<(), PjError> {
        match self {
            Self::AwaitAuthAck => {
                *self = Self::Ready {
                    since: Instant::now(),
                };
                Ok(())
            }
            _ => Err(PjError::ProtocolViolation(
                "cannot complete handshake: not in AwaitAuthAck state",
            )),
        }
    }

    /// Force-reset to `Disconnected` regardless of current state.
    pub fn force_disconnect(&mut self) {
        *self = Self::Disconnected;
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path() {
        let mut phase = HandshakePhase::default();
        assert!(phase.is_disconnected());

        phase.begin_connect().unwrap();
        phase.socket_open().unwrap();
        assert_eq!(phase, HandshakePhase::AwaitGreeting);
        phase.greeted().unwrap();
        assert_eq!(phase, HandshakePhase::AwaitAuthAck);
        phase.authenticated().unwrap();
        assert!(phase.is_ready());

        phase.force_disconnect();
        assert!(phase.is_disconnected());
    }

    #[test]
    fn busy_goes_back_to_connecting() {
        let mut phase = HandshakePhase::Connecting;
        phase.socket_open().unwrap();
        phase.retry().unwrap();
        assert_eq!(phase, HandshakePhase::Connecting);
        phase.socket_open().unwrap();
        phase.greeted().unwrap();
    }

    #[test]
    fn invalid_transitions() {
        let mut phase = HandshakePhase::Disconnected;
        assert!(phase.greeted().is_err());
        assert!(phase.authenticated().is_err());
        assert!(phase.retry().is_err());

        let mut phase = HandshakePhase::Ready {
            since: Instant::now(),
        };
        assert!(phase.begin_connect().is_err());
        assert!(phase.socket_open().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn ready_for_tracks_session_age() {
        let mut phase = HandshakePhase::AwaitAuthAck;
        assert!(phase.ready_for().is_none());

        phase.authenticated().unwrap();
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(phase.ready_for(), Some(Duration::from_secs(3)));

        phase.force_disconnect();
        assert!(phase.ready_for().is_none());
    }

    #[test]
    fn display_format() {
        assert_eq!(HandshakePhase::Disconnected.to_string(), "Disconnected");
        assert_eq!(HandshakePhase::AwaitAuthAck.to_string(), "AwaitAuthAck");
        assert_eq!(
            HandshakePhase::Ready {
                since: Instant::now()
            }
            .to_string(),
            "Ready"
        );
    }
}
