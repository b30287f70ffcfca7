//! Carapace CLI library: argument parsing and command execution for the
//! `carapace` binary.

pub mod cli;
pub mod commands;
pub mod error;

pub use error::CliError;
