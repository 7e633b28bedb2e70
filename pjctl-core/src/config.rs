//! Session configuration consumed by the engine.

use std::time::Duration;

use crate::error::{PjError, Result};
use crate::wire::DEFAULT_PORT;

// ── ProtocolTiming ───────────────────────────────────────────────

/// Delays and retry budgets of the session protocol.
///
/// The defaults are what devices expect; only tests and unusual
/// firmware should need to change them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolTiming {
    /// Minimum gap between the end of one handshake and the next attempt.
    pub handshake_spacing: Duration,
    /// Backoff step after a refused connect, multiplied by the attempt number.
    pub refused_backoff: Duration,
    /// Backoff step after a busy greeting, multiplied by the attempt number.
    pub busy_backoff: Duration,
    /// Total handshake attempts shared by refusals and busy greetings.
    pub max_attempts: u32,
    /// Pause after every frame of a batch.
    pub inter_frame_delay: Duration,
    /// How long an idle session stays open after a batch.
    pub keepalive_ttl: Duration,
}

impl Default for ProtocolTiming {
    fn default() -> Self {
        Self {
            handshake_spacing: Duration::from_millis(750),
            refused_backoff: Duration::from_millis(200),
            busy_backoff: Duration::from_millis(250),
            max_attempts: 10,
            inter_frame_delay: Duration::from_millis(500),
            keepalive_ttl: Duration::from_secs(2),
        }
    }
}

// ── DeviceConfig ─────────────────────────────────────────────────

/// Everything needed to open sessions with one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    /// Host name or IP address.
    pub host: String,
    /// TCP control port.
    pub port: u16,
    /// Deadline applied to every connect, read and write.
    pub timeout: Duration,
    /// Optional session password.
    pub password: Option<String>,
    pub timing: ProtocolTiming,
}

impl DeviceConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            timeout: Duration::from_secs(2),
            password: None,
            timing: ProtocolTiming::default(),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// An empty password is the same as none.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        let password = password.into();
        self.password = (!password.is_empty()).then_some(password);
        self
    }

    pub fn with_timing(mut self, timing: ProtocolTiming) -> Self {
        self.timing = timing;
        self
    }

    /// Reject values that can never produce a working session.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(PjError::Config("host is empty".into()));
        }
        if self.port == 0 {
            return Err(PjError::Config("port must be non-zero".into()));
        }
        if self.timeout.is_zero() {
            return Err(PjError::Config("timeout must be non-zero".into()));
        }
        if self.timing.max_attempts == 0 {
            return Err(PjError::Config("max_attempts must be at least 1".into()));
        }
        Ok(())
    }
}
