//! Cluster interaction.
//!
//! This module contains the external process contract and the state probes
//! that decide between creating and updating cluster resources.

mod prober;
mod runner;

pub use prober::ClusterProber;
pub use runner::{CommandOutput, CommandRunner, ExitPolicy, ShellRunner};

#[cfg(test)]
pub(crate) use runner::ScriptedRunner;
