//! Wire constants for the projector control protocol.
//!
//! ```text
//!  device ──► PJ_OK | PJ_NG                      greeting
//!  client ──► PJREQ [ '_' password[10] ]         auth request
//!  device ──► PJACK | PJNAK                      auth ack
//!  client ──► HEAD_OP|HEAD_REF  opcode  END      command
//!  device ──► HEAD_ACK  opcode[..2] ... END      command ack
//!  device ──► HEAD_RES  opcode[..2] payload END  reference response
//! ```

/// Default TCP control port.
pub const DEFAULT_PORT: u16 = 20554;

// ── Handshake tokens ─────────────────────────────────────────────

/// Greeting sent by an idle device.
pub const PJ_OK: &[u8; 5] = b"PJ_OK";
/// Greeting sent by a device that is serving another client.
pub const PJ_NG: &[u8; 5] = b"PJ_NG";
/// Client session request.
pub const PJ_REQ: &[u8; 5] = b"PJREQ";
/// Session accepted.
pub const PJ_ACK: &[u8; 5] = b"PJACK";
/// Session rejected (bad password).
pub const PJ_NAK: &[u8; 5] = b"PJNAK";

/// Length of every handshake token.
pub const TOKEN_LEN: usize = 5;

/// Separator between the request token and the password field.
pub const AUTH_SEPARATOR: u8 = b'_';

/// Width of the password field, NUL padded.
pub const PASSWORD_LEN: usize = 10;

// ── Command headers ──────────────────────────────────────────────

/// Operation (set) command header: mode byte + unit id.
pub const HEAD_OP: &[u8; 3] = b"!\x89\x01";
/// Reference (get) command header.
pub const HEAD_REF: &[u8; 3] = b"?\x89\x01";
/// Reference response header.
pub const HEAD_RES: &[u8; 3] = b"@\x89\x01";
/// Command ack header.
pub const HEAD_ACK: &[u8; 3] = b"\x06\x89\x01";

/// Length of every command header.
pub const HEAD_LEN: usize = 3;

/// Command terminator.
pub const END: u8 = b'\n';

/// Number of opcode bytes echoed back in acks and responses.
pub const ECHO_LEN: usize = 2;
