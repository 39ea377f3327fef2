//! Subcommand implementations.

pub mod check;
pub mod remove;
pub mod setup;
