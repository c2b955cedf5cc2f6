//! Command-line interface definitions and helpers.
//!
//! This module contains CLI argument parsing and the subcommand handlers.

mod args;
mod commands;

pub use args::Args;
pub use commands::run;
