//! # pjctl: projector control from the command line
//!
//! Thin collaborator around `pjctl-core`: a fixed table of named
//! commands, a TOML configuration file, and a state listener that polls
//! the device and reports what changed.

pub mod catalog;
pub mod config;
pub mod poller;
