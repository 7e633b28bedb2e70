//! # pjctl-core
//!
//! Client engine for the binary TCP control protocol spoken by networked
//! projectors.
//!
//! This crate contains:
//! - **Transport**: `Transport` trait and `TcpTransport`, timeout-bounded byte I/O
//! - **Handshake**: `HandshakePhase` state machine with busy/refused retry policies
//! - **Codec**: `RequestCodec` plus ack/response validation
//! - **Engine**: `Device`, which serializes command batches, and keeps a short
//!   keepalive window open between them
//! - **Error**: `PjError`, a typed `thiserror`-based error hierarchy
//!
//! ```no_run
//! use pjctl_core::{CommandFrame, Device, DeviceConfig};
//!
//! # async fn run() -> pjctl_core::Result<()> {
//! let device = Device::new(DeviceConfig::new("192.168.1.20").with_password("secret"))?;
//! let mut batch = [CommandFrame::reference("PW").power()];
//! device.send(&mut batch).await?;
//! println!("power: {:?}", batch[0].response);
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod command;
pub mod config;
pub mod device;
pub mod error;
pub mod phase;
pub mod transport;
pub mod wire;

mod handshake;
mod session;

#[cfg(any(test, feature = "test-util"))]
pub mod fake;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use codec::{AuthSecret, RequestCodec};
pub use command::{CommandFrame, POWER_ON, ValueTable};
pub use config::{DeviceConfig, ProtocolTiming};
pub use device::Device;
pub use error::{PjError, Result};
pub use phase::HandshakePhase;
pub use transport::{ConnectionInfo, TcpTransport, Transport};
pub use wire::DEFAULT_PORT;
