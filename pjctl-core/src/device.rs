//! The protocol engine for one device.
//!
//! [`Device`] serializes batches behind a FIFO lock, runs the handshake
//! when the socket is cold, and keeps the socket open for a short
//! keepalive window after a batch so quick follow-up calls skip the
//! handshake.
//!
//! ```text
//!  send ─► lock ─► cancel keepalive ─► [handshake] ─► frames ─┬─► arm keepalive
//!                                                              └─► disconnect
//! ```

use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::codec::AuthSecret;
use crate::command::CommandFrame;
use crate::config::{DeviceConfig, ProtocolTiming};
use crate::error::Result;
use crate::session::Session;
use crate::transport::{ConnectionInfo, TcpTransport, Transport};

/// Client engine for one projector.
///
/// Methods take `&self`; share one engine between tasks with `Arc`.
/// Dropping the engine cancels any pending keepalive disconnect, which
/// releases the socket.
pub struct Device<T: Transport = TcpTransport> {
    session: Arc<Mutex<Session<T>>>,
    info: ConnectionInfo,
    shutdown: CancellationToken,
}

impl Device<TcpTransport> {
    /// Build an engine talking TCP to the configured device.
    pub fn new(config: DeviceConfig) -> Result<Self> {
        config.validate()?;
        let info = ConnectionInfo::new(config.host.clone(), config.port);
        let transport = TcpTransport::new(info, config.timeout);
        Ok(Self::with_transport(
            transport,
            config.password.as_deref(),
            config.timing,
        ))
    }
}

impl<T: Transport> Device<T> {
    /// Build an engine over an arbitrary transport.
    pub fn with_transport(transport: T, password: Option<&str>, timing: ProtocolTiming) -> Self {
        let secret = password.filter(|p| !p.is_empty()).map(AuthSecret::new);
        let info = transport.info().clone();
        Self {
            session: Arc::new(Mutex::new(Session::new(transport, secret, timing))),
            info,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn info(&self) -> &ConnectionInfo {
        &self.info
    }

    /// Whether the socket is currently open (e.g. inside a keepalive window).
    pub async fn is_connected(&self) -> bool {
        self.session.lock().await.transport.is_connected()
    }

    /// Whether a deferred disconnect is pending.
    pub async fn keepalive_pending(&self) -> bool {
        self.session.lock().await.has_keepalive()
    }

    /// Open a session now and hold it for one keepalive window.
    ///
    /// Useful to check reachability and credentials before the first
    /// real batch.
    pub async fn connect(&self) -> Result<()> {
        let mut session = self.session.lock().await;
        let guard = InterruptGuard::new(&self.session);
        session.enter().await;
        session.cancel_keepalive();

        let result = session.ensure_connected().await;
        match &result {
            Ok(()) => self.arm_keepalive(&mut session),
            Err(_) => session.close().await,
        }
        session.leave();
        guard.disarm();
        result
    }

    /// Exchange `batch` with the device, in order.
    ///
    /// Each frame's `ack` and `response` are filled in as the device
    /// answers. If the device stops answering mid-batch the call still
    /// returns `Ok`, leaving the remaining frames unacknowledged.
    ///
    /// A batch of more than one frame led by a power reference is a
    /// status refresh: it stops after the first frame unless power is
    /// on, and it does not open a keepalive window by itself.
    pub async fn send(&self, batch: &mut [CommandFrame]) -> Result<()> {
        for frame in batch.iter() {
            frame.validate()?;
        }
        if batch.is_empty() {
            return Ok(());
        }

        let mut session = self.session.lock().await;
        let guard = InterruptGuard::new(&self.session);
        session.enter().await;

        for frame in batch.iter_mut() {
            frame.reset();
        }

        let refresh = batch.len() > 1 && batch[0].is_reference() && batch[0].is_power();
        let warm = session.cancel_keepalive();
        let mut keepalive = warm || !refresh;

        let result = session.run_batch(batch, refresh).await;
        let last_acked = match &result {
            Ok(last) => last.is_some_and(|i| batch[i].ack),
            Err(_) => {
                keepalive = false;
                false
            }
        };

        if keepalive && last_acked {
            self.arm_keepalive(&mut session);
        } else {
            session.close().await;
        }
        session.leave();
        guard.disarm();

        result.map(|_| ())
    }

    /// Close the socket now, cancelling any pending keepalive.
    pub async fn disconnect(&self) {
        let mut session = self.session.lock().await;
        session.cancel_keepalive();
        session.close().await;
    }

    /// Schedule the deferred disconnect for the current session.
    fn arm_keepalive(&self, session: &mut Session<T>) {
        let token = self.shutdown.child_token();
        let ttl = session.timing.keepalive_ttl;
        session.arm_keepalive(token.clone());

        let shared = Arc::clone(&self.session);
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = sleep(ttl) => {}
            }
            let mut session = tokio::select! {
                _ = token.cancelled() => return,
                guard = shared.lock() => guard,
            };
            // A caller that took the lock first has cancelled us.
            session.expire_keepalive(&token).await;
        });
        debug!(device = %self.info, ?ttl, "keepalive armed");
    }
}

// ── InterruptGuard ───────────────────────────────────────────────

/// Closes the session when a locked call is dropped before it finishes.
///
/// Declared after the lock guard so it drops first; the cleanup task
/// then takes the lock once the cancelled call has released it.
struct InterruptGuard<T: Transport> {
    session: Option<Arc<Mutex<Session<T>>>>,
}

impl<T: Transport> InterruptGuard<T> {
    fn new(session: &Arc<Mutex<Session<T>>>) -> Self {
        Self {
            session: Some(Arc::clone(session)),
        }
    }

    fn disarm(mut self) {
        self.session = None;
    }
}

impl<T: Transport> Drop for InterruptGuard<T> {
    fn drop(&mut self) {
        let Some(shared) = self.session.take() else {
            return;
        };
        // Without a runtime the next caller's `enter()` does the cleanup.
        let Ok(handle) = Handle::try_current() else {
            return;
        };
        handle.spawn(async move {
            shared.lock().await.recover().await;
        });
    }
}

impl<T: Transport> Drop for Device<T> {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl<T: Transport> std::fmt::Debug for Device<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device").field("info", &self.info).finish()
    }
}

// ── Tests ────────────────────────────────────────────────────────
