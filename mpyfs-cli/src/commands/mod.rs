//! Command implementations.
//!
//! Each subcommand group is implemented in its own module for clean separation.

pub(crate) mod completions;
pub(crate) mod files;
pub(crate) mod firmware;
pub(crate) mod run;
