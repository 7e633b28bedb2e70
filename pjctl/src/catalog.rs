//! Static table of known device commands.
//!
//! Each [`CommandDescriptor`] maps a readable name to an opcode, the
//! ways it may be used, and the payload values it understands. The set
//! is closed and fixed at compile time.

use bitflags::bitflags;
use pjctl_core::{CommandFrame, PjError, ValueTable};

bitflags! {
    /// What a command can be used for.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Capability: u8 {
        /// Can be read with a reference query.
        const REFERENCE = 0b0000_0001;
        /// Can be changed with an operation.
        const OPERATION = 0b0000_0010;
        /// Addresses the power state.
        const POWER     = 0b0000_0100;
    }
}

/// One entry of the command table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandDescriptor {
    pub name: &'static str,
    pub code: &'static str,
    pub caps: Capability,
    /// Raw payload ↔ readable name.
    pub values: ValueTable,
}

const RW: Capability = Capability::REFERENCE.union(Capability::OPERATION);
const RO: Capability = Capability::REFERENCE;

pub const POWER: CommandDescriptor = CommandDescriptor {
    name: "power",
    code: "PW",
    caps: RW.union(Capability::POWER),
    values: &[
        ("0", "standby"),
        ("1", "on"),
        ("2", "cooling"),
        ("3", "warming"),
        ("4", "error"),
    ],
};

pub const INPUT: CommandDescriptor = CommandDescriptor {
    name: "input",
    code: "IP",
    caps: RW,
    values: &[("6", "hdmi1"), ("7", "hdmi2")],
};

pub const SIGNAL: CommandDescriptor = CommandDescriptor {
    name: "signal",
    code: "SC",
    caps: RO,
    values: &[("0", "none"), ("1", "signal")],
};

pub const MODEL: CommandDescriptor = CommandDescriptor {
    name: "model",
    code: "MD",
    caps: RO,
    values: &[],
};

pub const MAC_ADDRESS: CommandDescriptor = CommandDescriptor {
    name: "mac",
    code: "LSMA",
    caps: RO,
    values: &[],
};

pub const HDR: CommandDescriptor = CommandDescriptor {
    name: "hdr",
    code: "IFHR",
    caps: RO,
    values: &[
        ("0", "sdr"),
        ("1", "hdr10"),
        ("2", "hdr10_plus"),
        ("3", "hlg"),
        ("F", "none"),
    ],
};

pub const HDR_PROCESSING: CommandDescriptor = CommandDescriptor {
    name: "hdr_processing",
    code: "PMHP",
    caps: RW,
    values: &[
        ("0", "hdr10_plus"),
        ("1", "static"),
        ("2", "frame_by_frame"),
        ("3", "scene_by_scene"),
    ],
};

pub const PICTURE_MODE: CommandDescriptor = CommandDescriptor {
    name: "picture_mode",
    code: "PMPM",
    caps: RW,
    values: &[
        ("00", "film"),
        ("01", "cinema"),
        ("02", "natural"),
        ("03", "hdr10"),
        ("04", "thx"),
        ("06", "user1"),
        ("07", "user2"),
    ],
};

pub const LOW_LATENCY: CommandDescriptor = CommandDescriptor {
    name: "low_latency",
    code: "PMLL",
    caps: RW,
    values: &[("0", "off"), ("1", "on")],
};

pub const LASER_POWER: CommandDescriptor = CommandDescriptor {
    name: "laser_power",
    code: "PMLP",
    caps: RW,
    values: &[("0", "low"), ("1", "high"), ("2", "medium")],
};

pub const LIGHT_TIME: CommandDescriptor = CommandDescriptor {
    name: "light_time",
    code: "IFLT",
    caps: RO,
    values: &[],
};

pub const REMOTE: CommandDescriptor = CommandDescriptor {
    name: "remote",
    code: "RC",
    caps: Capability::OPERATION,
    values: &[
        ("7305", "menu"),
        ("7301", "up"),
        ("7302", "down"),
        ("7336", "left"),
        ("7334", "right"),
        ("732F", "ok"),
        ("7303", "back"),
    ],
};

/// Every known command.
pub static CATALOG: &[CommandDescriptor] = &[
    POWER,
    INPUT,
    SIGNAL,
    MODEL,
    MAC_ADDRESS,
    HDR,
    HDR_PROCESSING,
    PICTURE_MODE,
    LOW_LATENCY,
    LASER_POWER,
    LIGHT_TIME,
    REMOTE,
];

/// Find a command by name.
pub fn lookup(name: &str) -> Option<&'static CommandDescriptor> {
    CATALOG.iter().find(|d| d.name.eq_ignore_ascii_case(name))
}

impl CommandDescriptor {
    /// Build a reference query for this command.
    pub fn reference(&self) -> Result<CommandFrame, PjError> {
        if !self.caps.contains(Capability::REFERENCE) {
            return Err(PjError::InvalidCommand(format!("{} cannot be read", self.name)));
        }
        let mut frame = CommandFrame::reference(self.code);
        if self.caps.contains(Capability::POWER) {
            frame = frame.power();
        }
        if !self.values.is_empty() {
            frame = frame.with_values(self.values);
        }
        Ok(frame)
    }

    /// Build an operation setting this command to `value`.
    ///
    /// `value` may be a readable name or a raw payload. Commands without
    /// a value table take any raw payload.
    pub fn operation(&self, value: &str) -> Result<CommandFrame, PjError> {
        if !self.caps.contains(Capability::OPERATION) {
            return Err(PjError::InvalidCommand(format!("{} cannot be set", self.name)));
        }
        let raw = self.raw_value(value).ok_or_else(|| {
            PjError::InvalidCommand(format!("unknown {} value '{value}'", self.name))
        })?;
        let mut frame = CommandFrame::operation(format!("{}{raw}", self.code));
        if self.caps.contains(Capability::POWER) {
            frame = frame.power();
        }
        Ok(frame)
    }

    fn raw_value<'a>(&self, value: &'a str) -> Option<&'a str> {
        if self.values.is_empty() {
            return (!value.is_empty()).then_some(value);
        }
        if let Some((raw, _)) = self
            .values
            .iter()
            .find(|(_, name)| name.eq_ignore_ascii_case(value))
        {
            return Some(*raw);
        }
        self.values
            .iter()
            .any(|(raw, _)| *raw == value)
            .then_some(value)
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_and_codes_are_unique() {
        for (i, a) in CATALOG.iter().enumerate() {
            for b in &CATALOG[i + 1..] {
                assert_ne!(a.name, b.name);
                assert_ne!(a.code, b.code);
            }
        }
    }

    #[test]
    fn every_command_is_usable() {
        for d in CATALOG {
            assert!(d.code.len() >= 2, "{} code too short", d.name);
            assert!(
                d.caps.intersects(Capability::REFERENCE | Capability::OPERATION),
                "{} has no use",
                d.name
            );
        }
    }

    #[test]
    fn lookup_is_case_insensitive() {
        assert_eq!(lookup("Power").map(|d| d.code), Some("PW"));
        assert!(lookup("volume").is_none());
    }

    #[test]
    fn power_reference_is_flagged() {
        let frame = POWER.reference().unwrap();
        assert!(frame.is_reference());
        assert!(frame.is_power());
        assert_eq!(frame.opcode(), "PW");
    }

    #[test]
    fn operation_accepts_name_or_raw() {
        assert_eq!(INPUT.operation("hdmi2").unwrap().opcode(), "IP7");
        assert_eq!(INPUT.operation("6").unwrap().opcode(), "IP6");
        assert_eq!(POWER.operation("on").unwrap().opcode(), "PW1");
        assert!(INPUT.operation("vga").is_err());
    }

    #[test]
    fn capabilities_are_enforced() {
        assert!(SIGNAL.operation("1").is_err());
        assert!(REMOTE.reference().is_err());
        assert_eq!(REMOTE.operation("menu").unwrap().opcode(), "RC7305");
    }

    #[test]
    fn free_form_values() {
        let mut frame = MODEL.reference().unwrap();
        assert!(!frame.is_power());
        frame.response = Some("x".into());
        assert!(!frame.is_power_on());
    }
}
