//! Caller-supplied command frames.
//!
//! A [`CommandFrame`] is built per logical request, handed to
//! [`Device::send`](crate::Device::send) inside a batch, and inspected
//! afterwards: `ack` tells whether the device confirmed it, `response`
//! holds the decoded value of a reference query.

use crate::error::{PjError, Result};
use crate::wire::{ECHO_LEN, END};

/// Static table mapping raw device payloads to readable names.
pub type ValueTable = &'static [(&'static str, &'static str)];

/// Readable power state that lets a status refresh continue.
pub const POWER_ON: &str = "on";

/// One command exchange unit (request + ack [+ response]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFrame {
    opcode: String,
    is_reference: bool,
    is_power: bool,
    values: Option<ValueTable>,

    /// Set by the engine once the device acknowledged the frame.
    pub ack: bool,
    /// Set by the engine for reference queries.
    pub response: Option<String>,
}

impl CommandFrame {
    /// An operation command that changes a setting, e.g. `PW1`.
    pub fn operation(opcode: impl Into<String>) -> Self {
        Self::new(opcode.into(), false)
    }

    /// A reference query that reads a setting, e.g. `PW`.
    pub fn reference(opcode: impl Into<String>) -> Self {
        Self::new(opcode.into(), true)
    }

    fn new(opcode: String, is_reference: bool) -> Self {
        Self {
            opcode,
            is_reference,
            is_power: false,
            values: None,
            ack: false,
            response: None,
        }
    }

    /// Mark this frame as addressing the power state.
    pub fn power(mut self) -> Self {
        self.is_power = true;
        self
    }

    /// Translate raw response payloads through `values`.
    ///
    /// Payloads missing from the table are stored unchanged.
    pub fn with_values(mut self, values: ValueTable) -> Self {
        self.values = Some(values);
        self
    }

    pub fn opcode(&self) -> &str {
        &self.opcode
    }

    pub fn is_reference(&self) -> bool {
        self.is_reference
    }

    pub fn is_power(&self) -> bool {
        self.is_power
    }

    /// The first two opcode bytes the device echoes back.
    pub fn echo(&self) -> &[u8] {
        &self.opcode.as_bytes()[..ECHO_LEN]
    }

    /// Check the opcode can be put on the wire.
    pub fn validate(&self) -> Result<()> {
        if self.opcode.len() < ECHO_LEN {
            return Err(PjError::InvalidCommand(format!(
                "opcode '{}' shorter than {ECHO_LEN} characters",
                self.opcode
            )));
        }
        if !self.opcode.is_ascii() || self.opcode.bytes().any(|b| b == END) {
            return Err(PjError::InvalidCommand(format!(
                "opcode {:?} is not plain ascii",
                self.opcode
            )));
        }
        Ok(())
    }

    /// Store a decoded payload, mapped through the value table.
    pub(crate) fn resolve(&mut self, raw: String) {
        let mapped = self
            .values
            .and_then(|table| table.iter().find(|(k, _)| *k == raw))
            .map(|(_, v)| (*v).to_string());
        self.response = Some(mapped.unwrap_or(raw));
    }

    /// Clear results left over from a previous send.
    pub(crate) fn reset(&mut self) {
        self.ack = false;
        self.response = None;
    }

    /// `true` for a power reference whose response reads "on".
    pub fn is_power_on(&self) -> bool {
        self.response.as_deref() == Some(POWER_ON)
    }
}

// ── Tests ────────────────────────────────────────────────────────
