//! taskio: command-line front end for the task I/O engine
//!
//! Provides the `taskio attach` and `taskio exec` commands.

pub mod commands;
pub mod output;
