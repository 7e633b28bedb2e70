//! Per-device session state guarded by the engine lock.
//!
//! Everything in here runs with the [`Device`](crate::Device) lock held,
//! so no two batches ever touch the transport at the same time.

use bytes::BytesMut;
use tokio::time::{Instant, sleep};
use tokio_util::codec::Encoder;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::codec::{self, AuthSecret, RequestCodec};
use crate::command::CommandFrame;
use crate::config::ProtocolTiming;
use crate::error::{PjError, Result};
use crate::phase::HandshakePhase;
use crate::transport::Transport;

/// Outcome of a single frame exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Exchange {
    /// The device acknowledged (and answered) the frame.
    Done,
    /// The device stopped answering; the rest of the batch is dropped.
    Quiet,
}

pub(crate) struct Session<T> {
    pub(crate) transport: T,
    pub(crate) phase: HandshakePhase,
    pub(crate) secret: Option<AuthSecret>,
    pub(crate) timing: ProtocolTiming,
    /// Completion time of the last successful handshake.
    pub(crate) last_handshake: Option<Instant>,
    /// Cancels the pending deferred disconnect, if any.
    keepalive: Option<CancellationToken>,
    /// Set while a batch is running; still set on entry means the
    /// previous caller was cancelled mid-exchange.
    in_flight: bool,
}

impl<T: Transport> Session<T> {
    pub(crate) fn new(transport: T, secret: Option<AuthSecret>, timing: ProtocolTiming) -> Self {
        Self {
            transport,
            phase: HandshakePhase::default(),
            secret,
            timing,
            last_handshake: None,
            keepalive: None,
            in_flight: false,
        }
    }

    // ── Keepalive bookkeeping ────────────────────────────────────

    /// Cancel the pending deferred disconnect. Returns whether one existed.
    pub(crate) fn cancel_keepalive(&mut self) -> bool {
        match self.keepalive.take() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Replace the pending deferred disconnect with `token`.
    pub(crate) fn arm_keepalive(&mut self, token: CancellationToken) {
        self.cancel_keepalive();
        self.keepalive = Some(token);
    }

    /// Called by the deferred disconnect once it owns the lock.
    pub(crate) async fn expire_keepalive(&mut self, token: &CancellationToken) {
        if token.is_cancelled() {
            return;
        }
        self.keepalive = None;
        debug!(device = %self.transport.info(), "keepalive window expired");
        self.close().await;
    }

    pub(crate) fn has_keepalive(&self) -> bool {
        self.keepalive.is_some()
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Mark the start of a locked section that talks to the device.
    ///
    /// A socket left behind by a cancelled caller may hold unread
    /// replies, so it is closed before anyone reuses it.
    pub(crate) async fn enter(&mut self) {
        self.recover().await;
        self.in_flight = true;
    }

    /// Close the socket if the last locked section never finished.
    pub(crate) async fn recover(&mut self) {
        if self.in_flight {
            warn!(device = %self.transport.info(), "previous exchange was interrupted");
            self.cancel_keepalive();
            self.close().await;
            self.in_flight = false;
        }
    }

    pub(crate) fn leave(&mut self) {
        self.in_flight = false;
    }

    /// Run the handshake unless the socket is already open.
    pub(crate) async fn ensure_connected(&mut self) -> Result<()> {
        if self.transport.is_connected() {
            return Ok(());
        }
        self.handshake().await
    }

    /// Close the transport and reset the phase.
    pub(crate) async fn close(&mut self) {
        if self.transport.is_connected() {
            self.transport.disconnect().await;
            debug!(
                device = %self.transport.info(),
                session = ?self.phase.ready_for(),
                "disconnected"
            );
        }
        self.phase.force_disconnect();
    }

    // ── Command exchange ─────────────────────────────────────────

    /// Exchange every frame of `batch` in order.
    ///
    /// Returns the index of the last frame processed, `None` when the
    /// batch is empty.
    pub(crate) async fn run_batch(
        &mut self,
        batch: &mut [CommandFrame],
        refresh: bool,
    ) -> Result<Option<usize>> {
        if batch.is_empty() {
            return Ok(None);
        }
        self.ensure_connected().await?;

        let mut last = None;
        for i in 0..batch.len() {
            last = Some(i);
            if self.exchange(&mut batch[i]).await? == Exchange::Quiet {
                break;
            }

            // Some devices drop back-to-back commands.
            sleep(self.timing.inter_frame_delay).await;

            if refresh && !batch[0].is_power_on() {
                debug!(
                    power = batch[0].response.as_deref().unwrap_or("?"),
                    "device not on, skipping remaining queries"
                );
                break;
            }
        }
        Ok(last)
    }

    /// Send one frame and read its ack (and response for references).
    pub(crate) async fn exchange(&mut self, frame: &mut CommandFrame) -> Result<Exchange> {
        if !self.phase.is_ready() || !self.transport.is_connected() {
            return Err(PjError::ProtocolViolation("exchange without a ready session"));
        }

        let mut request = BytesMut::new();
        RequestCodec.encode(&*frame, &mut request)?;
        debug!(
            kind = if frame.is_reference() { "ref" } else { "op" },
            code = frame.opcode(),
            bytes = %request.escape_ascii(),
            "sending"
        );
        self.transport.write(&request).await?;

        let ack = match self.transport.read_line().await {
            Ok(line) => line,
            Err(PjError::ReadTimeout(_)) => {
                warn!(code = frame.opcode(), "response timeout");
                return Ok(Exchange::Quiet);
            }
            Err(e) => return Err(e),
        };
        debug!(bytes = %ack.escape_ascii(), "received ack");
        codec::check_ack(&ack, frame)?;

        if frame.is_reference() {
            let line = match self.transport.read_line().await {
                Ok(line) => line,
                Err(PjError::ReadTimeout(_)) => {
                    warn!(code = frame.opcode(), "ref response timeout");
                    return Ok(Exchange::Quiet);
                }
                Err(e) => return Err(e),
            };

            let payload = codec::response_payload(&line, frame)?;
            let (value, fallback) = codec::decode_payload(payload);
            if fallback {
                warn!(bytes = %line.escape_ascii(), "failed to decode response");
            }
            debug!(code = frame.opcode(), value = %value, "received ref");
            frame.resolve(value);
        }

        frame.ack = true;
        Ok(Exchange::Done)
    }
}
