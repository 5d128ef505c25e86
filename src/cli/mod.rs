//! CLI module for the compose-swarm tool.
//!
//! This module provides the command-line interface for deploying compose
//! projects to a swarm-mode cluster.

mod commands;
mod output;

pub use commands::{Cli, Commands, OutputFormat};
pub use output::OutputFormatter;
