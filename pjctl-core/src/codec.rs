//! Encoding of client requests and validation of device replies.
//!
//! Requests go through [`RequestCodec`], a `tokio_util` [`Encoder`] that
//! writes into a `BytesMut`. Replies are plain lines read from the
//! transport; the helpers here check their headers and pull out payloads.

use bytes::{BufMut, Bytes, BytesMut};
use tokio_util::codec::Encoder;

use crate::command::CommandFrame;
use crate::error::{PjError, Result};
use crate::wire::{
    AUTH_SEPARATOR, ECHO_LEN, END, HEAD_ACK, HEAD_LEN, HEAD_OP, HEAD_REF, HEAD_RES,
    PASSWORD_LEN, PJ_REQ,
};

// ── AuthSecret ───────────────────────────────────────────────────

/// Fixed-width password field sent after the session request.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthSecret([u8; PASSWORD_LEN]);

impl AuthSecret {
    /// Pad with NUL bytes or truncate to the field width.
    pub fn new(password: &str) -> Self {
        let mut field = [0u8; PASSWORD_LEN];
        let raw = password.as_bytes();
        let n = raw.len().min(PASSWORD_LEN);
        field[..n].copy_from_slice(&raw[..n]);
        Self(field)
    }

    pub fn as_bytes(&self) -> &[u8; PASSWORD_LEN] {
        &self.0
    }
}

impl std::fmt::Debug for AuthSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AuthSecret(..)")
    }
}

/// Build the session request, with the password suffix when configured.
pub fn auth_request(secret: Option<&AuthSecret>) -> Bytes {
    let mut buf = BytesMut::with_capacity(PJ_REQ.len() + 1 + PASSWORD_LEN);
    buf.put_slice(PJ_REQ);
    if let Some(secret) = secret {
        buf.put_u8(AUTH_SEPARATOR);
        buf.put_slice(secret.as_bytes());
    }
    buf.freeze()
}

// ── RequestCodec ─────────────────────────────────────────────────

/// Encodes command frames as `header + opcode + END`.
#[derive(Debug, Default)]
pub struct RequestCodec;

impl Encoder<&CommandFrame> for RequestCodec {
    type Error = PjError;

    fn encode(&mut self, item: &CommandFrame, dst: &mut BytesMut) -> Result<()> {
        item.validate()?;
        let head = if item.is_reference() { HEAD_REF } else { HEAD_OP };
        dst.reserve(HEAD_LEN + item.opcode().len() + 1);
        dst.put_slice(head);
        dst.put_slice(item.opcode().as_bytes());
        dst.put_u8(END);
        Ok(())
    }
}

// ── Reply validation ─────────────────────────────────────────────

fn expect_header(line: &[u8], head: &[u8; HEAD_LEN], frame: &CommandFrame) -> bool {
    line.len() >= HEAD_LEN + ECHO_LEN
        && &line[..HEAD_LEN] == head
        && &line[HEAD_LEN..HEAD_LEN + ECHO_LEN] == frame.echo()
}

/// Check that `line` acknowledges `frame`.
pub fn check_ack(line: &[u8], frame: &CommandFrame) -> Result<()> {
    if !expect_header(line, HEAD_ACK, frame) {
        return Err(PjError::Command(format!(
            "response ack invalid '{}' for '{}'",
            line.escape_ascii(),
            frame.opcode()
        )));
    }
    Ok(())
}

/// Check that `line` answers `frame` and return the payload bytes.
///
/// The payload sits between the echoed opcode and the terminator.
pub fn response_payload<'a>(line: &'a [u8], frame: &CommandFrame) -> Result<&'a [u8]> {
    if !expect_header(line, HEAD_RES, frame) {
        return Err(PjError::Command(format!(
            "ref ack invalid '{}' for '{}'",
            line.escape_ascii(),
            frame.opcode()
        )));
    }
    let body = &line[HEAD_LEN + ECHO_LEN..];
    Ok(body.strip_suffix(&[END]).unwrap_or(body))
}

/// Decode a payload as text, falling back to lowercase hex.
///
/// Returns the value and whether the fallback was used.
pub fn decode_payload(payload: &[u8]) -> (String, bool) {
    match std::str::from_utf8(payload) {
        Ok(text) => (text.to_string(), false),
        Err(_) => (hex::encode(payload), true),
    }
}

// ── Tests ────────────────────────────────────────────────────────
