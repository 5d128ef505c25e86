//! Command emitters.
//!
//! Two backends consume translated services:
//! - [`SwarmEmitter`] runs swarm CLI commands against the cluster
//! - [`ManifestEmitter`] renders static `Service`/`Deployment` manifests

mod manifest;
mod swarm;

pub use manifest::{
    DeploymentManifest, ManifestEmitter, ServiceManifest, ServiceManifests, dns_label,
    kubernetes_quantity,
};
pub use swarm::{NODE_DOCKER_PORT, NodePullResult, PullReport, SwarmEmitter, UpSummary};
