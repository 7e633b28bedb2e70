//! In-memory device for exercising the engine without sockets.
//!
//! [`FakeTransport`] answers handshake tokens and command frames the way
//! a projector would, following a [`DeviceScript`]. Every connect, write
//! and disconnect is logged with its (tokio) timestamp so tests can check
//! ordering and spacing under a paused clock.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::time::{Instant, sleep};

use crate::error::{PjError, Result};
use crate::transport::{ConnectionInfo, Transport};
use crate::wire::{
    ECHO_LEN, END, HEAD_ACK, HEAD_LEN, HEAD_REF, HEAD_RES, PJ_ACK, PJ_NG, PJ_OK, PJ_REQ,
};

/// How long a silent fake device makes a read wait before timing out.
pub const FAKE_TIMEOUT: Duration = Duration::from_secs(2);

// ── DeviceScript ─────────────────────────────────────────────────

/// Behaviour of the fake device.
#[derive(Debug, Clone, Default)]
pub struct DeviceScript {
    failures: u32,
    refusals: u32,
    busy: u32,
    greeting: Option<&'static [u8]>,
    mute_greeting: bool,
    auth_reply: Option<&'static [u8]>,
    mute_auth: bool,
    values: HashMap<String, Vec<u8>>,
    silent: HashSet<String>,
    mute_response: HashSet<String>,
    bad_ack: HashSet<String>,
}

impl DeviceScript {
    /// Fail the next `n` connects with a timeout.
    pub fn fail_connect(mut self, n: u32) -> Self {
        self.failures = n;
        self
    }

    /// Refuse the next `n` connects.
    pub fn refuse(mut self, n: u32) -> Self {
        self.refusals = n;
        self
    }

    /// Greet the next `n` connects with `PJ_NG`.
    pub fn busy(mut self, n: u32) -> Self {
        self.busy = n;
        self
    }

    /// Replace the `PJ_OK` greeting.
    pub fn greeting(mut self, token: &'static [u8]) -> Self {
        self.greeting = Some(token);
        self
    }

    /// Accept connects but never greet.
    pub fn mute_greeting(mut self) -> Self {
        self.mute_greeting = true;
        self
    }

    /// Never answer the session request.
    pub fn mute_auth(mut self) -> Self {
        self.mute_auth = true;
        self
    }

    /// Replace the `PJACK` auth reply.
    pub fn auth_reply(mut self, token: &'static [u8]) -> Self {
        self.auth_reply = Some(token);
        self
    }

    /// Payload returned for reference queries of `code` (default `0`).
    pub fn value(mut self, code: &str, payload: &[u8]) -> Self {
        self.values.insert(code.to_string(), payload.to_vec());
        self
    }

    /// Never acknowledge `code`.
    pub fn silent(mut self, code: &str) -> Self {
        self.silent.insert(code.to_string());
        self
    }

    /// Acknowledge `code` but never send its reference response.
    pub fn mute_response(mut self, code: &str) -> Self {
        self.mute_response.insert(code.to_string());
        self
    }

    /// Acknowledge `code` with the wrong opcode echo.
    pub fn bad_ack(mut self, code: &str) -> Self {
        self.bad_ack.insert(code.to_string());
        self
    }
}

// ── Event log ────────────────────────────────────────────────────

/// One observable transport action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Connect,
    Refused,
    /// Connect failed for a reason other than refusal.
    Failed,
    Write(Vec<u8>),
    Disconnect,
}

#[derive(Debug, Default)]
struct FakeState {
    script: DeviceScript,
    connected: bool,
    pending: VecDeque<Bytes>,
    log: Vec<(Instant, Event)>,
}

impl FakeState {
    fn answer(&mut self, data: &[u8]) {
        if data.starts_with(PJ_REQ) {
            if self.script.mute_auth {
                return;
            }
            let reply = self.script.auth_reply.unwrap_or(PJ_ACK);
            self.pending.push_back(Bytes::from_static(reply));
            return;
        }
        if data.len() < HEAD_LEN + ECHO_LEN + 1 {
            return;
        }

        let code = String::from_utf8_lossy(&data[HEAD_LEN..data.len() - 1]).into_owned();
        if self.script.silent.contains(&code) {
            return;
        }

        let echo = &data[HEAD_LEN..HEAD_LEN + ECHO_LEN];
        let mut ack = HEAD_ACK.to_vec();
        if self.script.bad_ack.contains(&code) {
            ack.extend_from_slice(b"XX");
        } else {
            ack.extend_from_slice(echo);
        }
        ack.push(END);
        self.pending.push_back(Bytes::from(ack));

        if &data[..HEAD_LEN] == HEAD_REF && !self.script.mute_response.contains(&code) {
            let mut res = HEAD_RES.to_vec();
            res.extend_from_slice(echo);
            match self.script.values.get(&code) {
                Some(payload) => res.extend_from_slice(payload),
                None => res.push(b'0'),
            }
            res.push(END);
            self.pending.push_back(Bytes::from(res));
        }
    }
}

// ── FakeTransport ────────────────────────────────────────────────

/// Scripted [`Transport`]. Clones share the same device and log.
#[derive(Debug, Clone)]
pub struct FakeTransport {
    info: ConnectionInfo,
    state: Arc<Mutex<FakeState>>,
}

impl FakeTransport {
    pub fn new(script: DeviceScript) -> Self {
        Self {
            info: ConnectionInfo::new("fake", 20554),
            state: Arc::new(Mutex::new(FakeState {
                script,
                ..Default::default()
            })),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn log(&self, event: Event) {
        self.state().log.push((Instant::now(), event));
    }

    /// Everything that happened, in order.
    pub fn events(&self) -> Vec<(Instant, Event)> {
        self.state().log.clone()
    }

    /// Bytes written by the client, one entry per write.
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.events()
            .into_iter()
            .filter_map(|(_, e)| match e {
                Event::Write(data) => Some(data),
                _ => None,
            })
            .collect()
    }

    /// Successful connects.
    pub fn connects(&self) -> usize {
        self.count(|e| matches!(e, Event::Connect))
    }

    /// Connects that failed without a refusal.
    pub fn failures(&self) -> usize {
        self.count(|e| matches!(e, Event::Failed))
    }

    /// Refused connects.
    pub fn refusals(&self) -> usize {
        self.count(|e| matches!(e, Event::Refused))
    }

    fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.state().log.iter().filter(|(_, e)| pred(e)).count()
    }

    /// Handles alive on the shared device, this one included.
    pub fn strong_count(&self) -> usize {
        Arc::strong_count(&self.state)
    }

    async fn next_reply(&mut self) -> Result<Bytes> {
        let reply = {
            let mut state = self.state();
            if !state.connected {
                return Err(PjError::ProtocolViolation("transport is not connected"));
            }
            state.pending.pop_front()
        };
        match reply {
            Some(data) => Ok(data),
            None => {
                sleep(FAKE_TIMEOUT).await;
                Err(PjError::ReadTimeout(FAKE_TIMEOUT))
            }
        }
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn connect(&mut self) -> Result<()> {
        let event = {
            let mut state = self.state();
            if state.connected {
                return Err(PjError::ProtocolViolation("transport already connected"));
            }
            if state.script.failures > 0 {
                state.script.failures -= 1;
                Event::Failed
            } else if state.script.refusals > 0 {
                state.script.refusals -= 1;
                Event::Refused
            } else {
                state.connected = true;
                let greeting = if state.script.busy > 0 {
                    state.script.busy -= 1;
                    PJ_NG.as_slice()
                } else {
                    state.script.greeting.unwrap_or(PJ_OK)
                };
                if !state.script.mute_greeting {
                    state.pending.push_back(Bytes::from_static(greeting));
                }
                Event::Connect
            }
        };

        let result = match event {
            Event::Failed => Err(PjError::ConnectTimeout(FAKE_TIMEOUT)),
            Event::Refused => Err(PjError::ConnectionRefused),
            _ => Ok(()),
        };
        self.log(event);
        result
    }

    async fn read(&mut self, _n: usize) -> Result<Bytes> {
        self.next_reply().await
    }

    async fn read_line(&mut self) -> Result<Bytes> {
        self.next_reply().await
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        {
            let mut state = self.state();
            if !state.connected {
                return Err(PjError::ProtocolViolation("transport is not connected"));
            }
            state.answer(data);
        }
        self.log(Event::Write(data.to_vec()));
        Ok(())
    }

    async fn disconnect(&mut self) {
        let was_connected = {
            let mut state = self.state();
            state.pending.clear();
            std::mem::replace(&mut state.connected, false)
        };
        if was_connected {
            self.log(Event::Disconnect);
        }
    }

    fn is_connected(&self) -> bool {
        self.state().connected
    }

    fn info(&self) -> &ConnectionInfo {
        &self.info
    }
}
