//! Command-line interface
//!
//! Argument definitions for the `powledger` binary. The commands themselves
//! run in `main.rs`.

pub mod commands;

pub use commands::{Command, Opt};
