//! Session handshake: greeting, session request, auth ack.
//!
//! Refused connects and busy greetings share one attempt budget, each
//! with its own linear backoff. A rejected password is final.

use tokio::time::{Instant, sleep};
use tracing::{debug, warn};

use crate::codec;
use crate::error::{PjError, Result};
use crate::session::Session;
use crate::transport::Transport;
use crate::wire::{PJ_ACK, PJ_NAK, PJ_NG, PJ_OK, TOKEN_LEN};

/// Refusal count at which retrying gets loud.
const REFUSED_WARN_AT: u32 = 5;

impl<T: Transport> Session<T> {
    /// Open the socket and authenticate.
    ///
    /// On failure the transport is closed and the phase is back to
    /// `Disconnected` before the error is returned.
    pub(crate) async fn handshake(&mut self) -> Result<()> {
        if self.transport.is_connected() {
            return Err(PjError::ProtocolViolation("handshake on an open transport"));
        }

        if let Some(last) = self.last_handshake {
            let elapsed = last.elapsed();
            if elapsed < self.timing.handshake_spacing {
                sleep(self.timing.handshake_spacing - elapsed).await;
            }
        }

        match self.negotiate().await {
            Ok(()) => {
                self.last_handshake = Some(Instant::now());
                Ok(())
            }
            Err(e) => {
                self.close().await;
                Err(e)
            }
        }
    }

    async fn negotiate(&mut self) -> Result<()> {
        self.phase.force_disconnect();
        self.phase.begin_connect()?;
        self.greet().await?;

        let request = codec::auth_request(self.secret.as_ref());
        debug!(auth = self.secret.is_some(), "handshake sending PJREQ");
        self.transport
            .write(&request)
            .await
            .map_err(|e| PjError::Connect(format!("handshake request failed: {e}")))?;

        let ack = match self.transport.read(TOKEN_LEN).await {
            Ok(data) => data,
            Err(PjError::ReadTimeout(_)) => {
                return Err(PjError::Connect("handshake ack timeout".into()));
            }
            Err(e) => return Err(PjError::Connect(format!("handshake ack failed: {e}"))),
        };
        debug!(bytes = %ack.escape_ascii(), "handshake received");

        if &ack[..] == PJ_NAK {
            return Err(PjError::Auth);
        }
        if &ack[..] != PJ_ACK {
            return Err(PjError::Command(format!(
                "handshake ack invalid '{}'",
                ack.escape_ascii()
            )));
        }

        self.phase.authenticated()?;
        debug!(device = %self.transport.info(), "session ready");
        Ok(())
    }

    /// Connect and wait for an idle greeting, retrying refusals and
    /// busy devices within the attempt budget.
    async fn greet(&mut self) -> Result<()> {
        let max = self.timing.max_attempts;
        let mut attempts = 0u32;

        while attempts < max {
            debug!(device = %self.transport.info(), attempt = attempts + 1, "connecting");
            match self.transport.connect().await {
                Ok(()) => {}
                Err(PjError::ConnectionRefused) => {
                    attempts += 1;
                    if attempts == REFUSED_WARN_AT {
                        warn!(device = %self.transport.info(), "retrying refused connection");
                    } else {
                        debug!(device = %self.transport.info(), "retrying refused connection");
                    }
                    if attempts < max {
                        sleep(self.timing.refused_backoff * attempts).await;
                    }
                    continue;
                }
                Err(e @ PjError::ProtocolViolation(_)) => return Err(e),
                Err(e) => return Err(PjError::Connect(e.to_string())),
            }
            self.phase.socket_open()?;

            let greeting = match self.transport.read(TOKEN_LEN).await {
                Ok(data) => data,
                Err(PjError::ReadTimeout(_)) => {
                    return Err(PjError::Connect("handshake init timeout".into()));
                }
                Err(e) => return Err(PjError::Connect(format!("handshake init failed: {e}"))),
            };
            debug!(bytes = %greeting.escape_ascii(), "handshake received");

            if &greeting[..] == PJ_NG {
                attempts += 1;
                warn!(device = %self.transport.info(), attempt = attempts, "handshake retrying on busy");
                self.transport.disconnect().await;
                self.phase.retry()?;
                if attempts < max {
                    sleep(self.timing.busy_backoff * attempts).await;
                }
                continue;
            }

            if &greeting[..] != PJ_OK {
                return Err(PjError::Command(format!(
                    "handshake init invalid '{}'",
                    greeting.escape_ascii()
                )));
            }

            self.phase.greeted()?;
            return Ok(());
        }

        Err(PjError::Connect("retries exceeded".into()))
    }
}
