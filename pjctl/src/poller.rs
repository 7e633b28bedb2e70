//! Caller-owned state listener.
//!
//! A [`Poller`] keeps the last known value of every polled command and
//! reports only what changed since the previous tick. Each tick starts
//! with a status refresh (power, input, signal). The quick set is read
//! whenever a signal is present, the extended set once per full-sync
//! interval or right after any value changed.

use std::collections::BTreeMap;
use std::time::Duration;

use pjctl_core::{CommandFrame, Device, POWER_ON, Result, Transport};
use tokio::time::Instant;
use tracing::debug;

use crate::catalog::{
    CommandDescriptor, HDR, HDR_PROCESSING, INPUT, LASER_POWER, LIGHT_TIME, LOW_LATENCY,
    PICTURE_MODE, POWER, SIGNAL,
};

/// Last known value per command name.
pub type State = BTreeMap<String, String>;

/// Values that changed on a tick. `None` marks a value that was cleared.
pub type Changes = BTreeMap<String, Option<String>>;

const REFRESH: &[CommandDescriptor] = &[POWER, INPUT, SIGNAL];
const QUICK: &[CommandDescriptor] = &[HDR];
const FULL: &[CommandDescriptor] = &[PICTURE_MODE, LOW_LATENCY, LASER_POWER, LIGHT_TIME];

/// Signal value reported while a source is present.
const SIGNAL_PRESENT: &str = "signal";
/// Signal value assumed while the device is not powered on.
const SIGNAL_NONE: &str = "none";
/// HDR values without a processing mode to read.
const HDR_PLAIN: &[&str] = &["none", "sdr"];

pub struct Poller {
    state: State,
    next_full_sync: Instant,
    full_sync: Duration,
}

impl Poller {
    pub fn new(full_sync: Duration) -> Self {
        Self {
            state: State::new(),
            next_full_sync: Instant::now(),
            full_sync,
        }
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    /// Run one polling tick against `device`.
    pub async fn poll<T: Transport>(&mut self, device: &Device<T>) -> Result<Changes> {
        let mut fresh = query(device, REFRESH).await?;
        let Some(power) = fresh.get(POWER.name).cloned() else {
            // Power went unanswered; nothing else in the refresh is trustworthy.
            return Ok(Changes::new());
        };
        let on = power == POWER_ON;

        if !on {
            fresh.insert(SIGNAL.name.to_string(), SIGNAL_NONE.to_string());
        } else if fresh.get(SIGNAL.name).map(String::as_str) == Some(SIGNAL_PRESENT) {
            fresh.extend(query(device, QUICK).await?);
            if fresh.iter().any(|(name, value)| self.state.get(name) != Some(value)) {
                self.next_full_sync = Instant::now();
            }

            if Instant::now() >= self.next_full_sync {
                debug!("full sync");
                let mut full = FULL.to_vec();
                if fresh
                    .get(HDR.name)
                    .is_some_and(|hdr| !HDR_PLAIN.contains(&hdr.as_str()))
                {
                    full.insert(0, HDR_PROCESSING);
                }
                fresh.extend(query(device, &full).await?);
                self.next_full_sync = Instant::now() + self.full_sync;
            }
        }

        Ok(self.apply(fresh, on))
    }

    /// Merge `fresh` into the stored state and return the difference.
    fn apply(&mut self, fresh: State, on: bool) -> Changes {
        let mut changes = Changes::new();
        for (name, value) in fresh {
            if self.state.get(&name) != Some(&value) {
                changes.insert(name.clone(), Some(value.clone()));
                self.state.insert(name, value);
            }
        }

        if !on {
            self.state.retain(|name, _| {
                let keep = REFRESH.iter().any(|d| d.name == name.as_str());
                if !keep {
                    changes.insert(name.clone(), None);
                }
                keep
            });
        }
        changes
    }
}

/// Send reference queries for `commands` as one batch and collect the answers.
async fn query<T: Transport>(device: &Device<T>, commands: &[CommandDescriptor]) -> Result<State> {
    let mut batch = commands
        .iter()
        .map(CommandDescriptor::reference)
        .collect::<Result<Vec<CommandFrame>>>()?;
    device.send(&mut batch).await?;

    Ok(commands
        .iter()
        .zip(batch)
        .filter_map(|(d, frame)| frame.response.map(|v| (d.name.to_string(), v)))
        .collect())
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use pjctl_core::ProtocolTiming;
    use pjctl_core::fake::{DeviceScript, FakeTransport};

    fn on_with_signal() -> DeviceScript {
        DeviceScript::default()
            .value("PW", b"1")
            .value("IP", b"7")
            .value("SC", b"1")
            .value("IFHR", b"1")
            .value("PMHP", b"1")
            .value("PMPM", b"03")
            .value("PMLL", b"0")
            .value("PMLP", b"1")
            .value("IFLT", b"1234")
    }

    fn device(script: DeviceScript) -> (FakeTransport, Device<FakeTransport>) {
        let fake = FakeTransport::new(script);
        let device = Device::with_transport(fake.clone(), None, ProtocolTiming::default());
        (fake, device)
    }

    fn queried(fake: &FakeTransport, code: &str) -> usize {
        fake.writes()
            .iter()
            .filter(|w| w.len() > 4 && &w[3..w.len() - 1] == code.as_bytes())
            .count()
    }

    #[tokio::test(start_paused = true)]
    async fn standby_reads_power_only() {
        let (fake, device) = device(DeviceScript::default().value("PW", b"0"));
        let mut poller = Poller::new(Duration::from_secs(6));

        let changes = poller.poll(&device).await.unwrap();
        assert_eq!(changes.get("power"), Some(&Some("standby".to_string())));
        assert_eq!(changes.get("signal"), Some(&Some("none".to_string())));
        assert!(!changes.contains_key("input"));
        assert_eq!(queried(&fake, "IP"), 0);
        assert_eq!(queried(&fake, "IFHR"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn first_tick_reads_everything() {
        let (_fake, device) = device(on_with_signal());
        let mut poller = Poller::new(Duration::from_secs(6));

        let changes = poller.poll(&device).await.unwrap();
        assert_eq!(changes.get("power"), Some(&Some("on".to_string())));
        assert_eq!(changes.get("input"), Some(&Some("hdmi2".to_string())));
        assert_eq!(changes.get("hdr"), Some(&Some("hdr10".to_string())));
        assert_eq!(changes.get("picture_mode"), Some(&Some("hdr10".to_string())));
        assert_eq!(changes.get("light_time"), Some(&Some("1234".to_string())));
        assert_eq!(changes.get("hdr_processing"), Some(&Some("static".to_string())));
        assert_eq!(poller.state().len(), 9);
    }

    #[tokio::test(start_paused = true)]
    async fn unchanged_tick_skips_full_sync() {
        let (fake, device) = device(on_with_signal());
        let mut poller = Poller::new(Duration::from_secs(60));

        poller.poll(&device).await.unwrap();
        let changes = poller.poll(&device).await.unwrap();
        assert!(changes.is_empty());
        assert_eq!(queried(&fake, "IFHR"), 2);
        assert_eq!(queried(&fake, "PMPM"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn full_sync_repeats_after_interval() {
        let (fake, device) = device(on_with_signal());
        let mut poller = Poller::new(Duration::from_secs(6));

        poller.poll(&device).await.unwrap();
        tokio::time::sleep(Duration::from_secs(7)).await;
        poller.poll(&device).await.unwrap();
        assert_eq!(queried(&fake, "PMPM"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn sdr_skips_hdr_processing() {
        let (fake, device) = device(on_with_signal().value("IFHR", b"0"));
        let mut poller = Poller::new(Duration::from_secs(6));

        let changes = poller.poll(&device).await.unwrap();
        assert_eq!(changes.get("hdr"), Some(&Some("sdr".to_string())));
        assert!(!changes.contains_key("hdr_processing"));
        assert_eq!(queried(&fake, "PMHP"), 0);
        assert_eq!(queried(&fake, "PMPM"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn quick_set_change_forces_full_sync() {
        let (fake, device) = device(on_with_signal());
        let mut poller = Poller::new(Duration::from_secs(60));
        poller.poll(&device).await.unwrap();

        // Pretend the last tick saw a different HDR format.
        poller.state.insert("hdr".to_string(), "sdr".to_string());
        let changes = poller.poll(&device).await.unwrap();

        assert_eq!(changes.get("hdr"), Some(&Some("hdr10".to_string())));
        assert_eq!(queried(&fake, "PMPM"), 2);
    }

    #[test]
    fn power_off_clears_extended_values() {
        let mut poller = Poller::new(Duration::from_secs(6));
        let on: State = [
            ("power", "on"),
            ("input", "hdmi1"),
            ("signal", "signal"),
            ("hdr", "sdr"),
            ("picture_mode", "film"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        poller.apply(on, true);

        let off: State = [("power", "cooling"), ("signal", "none")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let changes = poller.apply(off, false);

        assert_eq!(changes.get("power"), Some(&Some("cooling".to_string())));
        assert_eq!(changes.get("hdr"), Some(&None));
        assert_eq!(changes.get("picture_mode"), Some(&None));
        assert!(!changes.contains_key("input"));
        assert_eq!(poller.state().get("input").map(String::as_str), Some("hdmi1"));
        assert!(!poller.state().contains_key("hdr"));
    }
}
