//! Cluster state queries.
//!
//! Existence probes tolerate a nonzero exit (the resource is simply absent)
//! and only report a resource as present if the query printed its name. In
//! dry-run mode the runner prints nothing, so every probe reports absent.

use std::sync::Arc;
use tracing::debug;

use crate::error::Result;

use super::runner::{CommandRunner, ExitPolicy};

/// Node status reported for nodes that can accept work.
const READY_STATUS: &str = "Ready";

/// Queries the current state of the swarm.
#[derive(Clone)]
pub struct ClusterProber {
    runner: Arc<dyn CommandRunner>,
}

impl std::fmt::Debug for ClusterProber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterProber").finish_non_exhaustive()
    }
}

impl ClusterProber {
    /// Creates a prober running queries through `runner`.
    #[must_use]
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    /// Returns true if a service named `name` exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the query cannot be spawned.
    pub async fn service_exists(&self, name: &str) -> Result<bool> {
        self.exists("service", "{{.Spec.Name}}", name).await
    }

    /// Returns true if a network named `name` exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the query cannot be spawned.
    pub async fn network_exists(&self, name: &str) -> Result<bool> {
        self.exists("network", "{{.Name}}", name).await
    }

    /// Returns true if a volume named `name` exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the query cannot be spawned.
    pub async fn volume_exists(&self, name: &str) -> Result<bool> {
        self.exists("volume", "{{.Name}}", name).await
    }

    /// Lists the hostnames of nodes in the `Ready` state.
    ///
    /// # Errors
    ///
    /// Returns an error if the node listing fails.
    pub async fn ready_nodes(&self) -> Result<Vec<String>> {
        let output = self
            .runner
            .run("docker node ls --format '{{.Hostname}} {{.Status}}'", ExitPolicy::Check)
            .await?;

        let nodes: Vec<String> = output
            .output
            .lines()
            .filter_map(|line| {
                let mut fields = line.split_whitespace();
                let hostname = fields.next()?;
                let status = fields.next()?;
                (status == READY_STATUS).then(|| hostname.to_string())
            })
            .collect();

        debug!("Ready nodes: {:?}", nodes);
        Ok(nodes)
    }

    async fn exists(&self, kind: &str, format: &str, name: &str) -> Result<bool> {
        let quoted = crate::translate::quote(name)?;
        let command = format!("docker {kind} inspect --format '{format}' {quoted}");
        let output = self.runner.run(&command, ExitPolicy::Ignore).await?;

        let exists = output.success() && output.output.lines().any(|line| line.trim() == name);
        debug!("{} '{}' exists: {}", kind, name, exists);
        Ok(exists)
    }
}
