//! Configuration for the pjctl command-line tool.

use std::path::Path;
use std::time::Duration;

use pjctl_core::{DEFAULT_PORT, DeviceConfig};
use serde::{Deserialize, Serialize};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PjctlConfig {
    /// Target device.
    pub device: DeviceSection,
    /// State listener settings.
    pub polling: PollingSection,
    /// Logging settings.
    pub logging: LoggingSection,
}

/// Device connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSection {
    /// Host name or IP address.
    pub host: String,
    /// TCP control port.
    pub port: u16,
    /// Per-operation timeout in milliseconds.
    pub timeout_ms: u64,
    /// Session password. Empty means none.
    pub password: String,
}

/// Listener timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingSection {
    /// Pause between status refreshes, in seconds.
    pub interval_secs: u64,
    /// Minimum time between full (slow) refreshes, in seconds.
    pub full_sync_secs: u64,
    /// Pause after a timeout, in seconds.
    pub timeout_backoff_secs: u64,
    /// Pause after any other failure, in seconds.
    pub error_backoff_secs: u64,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for DeviceSection {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_PORT,
            timeout_ms: 2000,
            password: String::new(),
        }
    }
}

impl Default for PollingSection {
    fn default() -> Self {
        Self {
            interval_secs: 2,
            full_sync_secs: 6,
            timeout_backoff_secs: 1,
            error_backoff_secs: 15,
        }
    }
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl PjctlConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::debug!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Convert the device section into the engine configuration.
    pub fn to_device_config(&self) -> DeviceConfig {
        DeviceConfig::new(self.device.host.clone())
            .with_port(self.device.port)
            .with_timeout(Duration::from_millis(self.device.timeout_ms))
            .with_password(self.device.password.clone())
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let cfg = PjctlConfig::default();
        let text = toml::to_string_pretty(&cfg).unwrap();
        assert!(text.contains("timeout_ms"));
        assert!(text.contains("full_sync_secs"));
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let cfg: PjctlConfig = toml::from_str(
            r#"
            [device]
            host = "10.0.0.40"
            password = "secret"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.device.host, "10.0.0.40");
        assert_eq!(cfg.device.port, 20554);
        assert_eq!(cfg.polling.interval_secs, 2);
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn to_device_config_maps_fields() {
        let mut cfg = PjctlConfig::default();
        cfg.device.host = "pj.local".into();
        cfg.device.timeout_ms = 500;
        let dev = cfg.to_device_config();
        assert_eq!(dev.host, "pj.local");
        assert_eq!(dev.timeout, Duration::from_millis(500));
        assert!(dev.password.is_none());
        assert!(dev.validate().is_ok());
    }

    #[test]
    fn missing_file_uses_defaults() {
        let cfg = PjctlConfig::load(Path::new("/nonexistent/pjctl.toml"));
        assert!(cfg.device.host.is_empty());
    }
}
