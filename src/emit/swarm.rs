//! Swarm CLI emitter.
//!
//! This module implements the cluster-facing operations. Every step runs
//! sequentially in declaration order except `pull`, which fans out one task
//! per ready node.

use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::cluster::{ClusterProber, CommandRunner, ExitPolicy};
use crate::compose::{ComposeProject, ServiceDefinition};
use crate::error::{CommandError, ComposeError, ConfigError, Result};
use crate::translate::{Translator, quote};

/// Separator between flags of a generated `service create` command.
const LINE_CONTINUATION: &str = " \\\n  ";

/// Port of the remote Docker API used to pull on each node.
pub const NODE_DOCKER_PORT: u16 = 2375;

/// Outcome of `up`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UpSummary {
    /// Services created by this run.
    pub created: Vec<String>,
    /// Existing services scaled to their declared replicas.
    pub scaled: Vec<String>,
}

/// Pull outcome for one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodePullResult {
    /// Node hostname.
    pub node: String,
    /// Whether every pull on the node succeeded.
    pub success: bool,
    /// Failure description, if any.
    pub error: Option<String>,
}

/// Outcome of `pull` across all nodes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PullReport {
    /// Per-node results in completion order.
    pub nodes: Vec<NodePullResult>,
}

impl PullReport {
    /// Returns the number of nodes whose pull failed.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.nodes.iter().filter(|n| !n.success).count()
    }

    /// Fails if any node failed.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::PullFailed`] if at least one node failed.
    pub fn ensure_success(&self) -> Result<()> {
        let failed = self.failed();
        if failed > 0 {
            return Err(CommandError::PullFailed {
                failed,
                total: self.nodes.len(),
            }
            .into());
        }
        Ok(())
    }
}

/// Emits swarm CLI commands for a project.
pub struct SwarmEmitter<'a> {
    project: &'a ComposeProject,
    runner: Arc<dyn CommandRunner>,
    prober: ClusterProber,
}

impl std::fmt::Debug for SwarmEmitter<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SwarmEmitter")
            .field("project", &self.project.name())
            .finish_non_exhaustive()
    }
}

impl<'a> SwarmEmitter<'a> {
    /// Creates an emitter running commands through `runner`.
    #[must_use]
    pub fn new(project: &'a ComposeProject, runner: Arc<dyn CommandRunner>) -> Self {
        let prober = ClusterProber::new(Arc::clone(&runner));
        Self {
            project,
            runner,
            prober,
        }
    }

    /// Creates networks, volumes and missing services, then scales services
    /// that already exist.
    ///
    /// # Errors
    ///
    /// Returns an error if translation fails or any command fails.
    pub async fn up(&self) -> Result<UpSummary> {
        for network in self.project.networks() {
            if network.external {
                debug!("Skipping external network '{}'", network.name);
                continue;
            }
            let name = self.project.prefixed(&network.name);
            if self.prober.network_exists(&name).await? {
                debug!("Network '{}' already exists", name);
                continue;
            }
            info!("Creating network {}", name);
            self.run(&format!(
                "docker network create --driver overlay --opt encrypted {}",
                quote(&name)?
            ))
            .await?;
        }

        for volume in self.project.volumes() {
            if volume.external {
                debug!("Skipping external volume '{}'", volume.name);
                continue;
            }
            let name = self.project.prefixed(&volume.name);
            if self.prober.volume_exists(&name).await? {
                debug!("Volume '{}' already exists", name);
                continue;
            }
            info!("Creating volume {}", name);
            self.run(&format!("docker volume create --name {}", quote(&name)?))
                .await?;
        }

        let translator = Translator::new(self.project);
        let mut summary = UpSummary::default();
        let mut existing = Vec::new();

        for service in self.project.selected_services() {
            let name = self.project.prefixed(&service.name);
            if self.prober.service_exists(&name).await? {
                info!("Service {} exists, scheduling scale", name);
                existing.push(service);
                continue;
            }

            let invocation = translator.translate(service)?;
            let mut parts = vec![
                String::from("docker service create --with-registry-auth"),
                format!("--name {}", quote(&name)?),
            ];
            parts.extend(invocation.cli_arguments()?);

            info!("Creating service {}", name);
            self.run(&parts.join(LINE_CONTINUATION)).await?;
            summary.created.push(service.name.clone());
        }

        if !existing.is_empty() {
            self.scale(&existing, None).await?;
            summary.scaled = existing.iter().map(|s| s.name.clone()).collect();
        }

        Ok(summary)
    }

    /// Scales the selected services to their declared replicas.
    ///
    /// # Errors
    ///
    /// Returns an error if the scale command fails.
    pub async fn start(&self) -> Result<()> {
        let services: Vec<&ServiceDefinition> = self.project.selected_services().collect();
        if services.is_empty() {
            return Ok(());
        }
        self.scale(&services, None).await
    }

    /// Scales the selected services that exist to zero.
    ///
    /// # Errors
    ///
    /// Returns an error if a probe or the scale command fails.
    pub async fn stop(&self) -> Result<()> {
        let services = self.existing_services().await?;
        if services.is_empty() {
            info!("No running services to stop");
            return Ok(());
        }
        self.scale(&services, Some("0")).await
    }

    /// Removes the selected services that exist.
    ///
    /// # Errors
    ///
    /// Returns an error if a probe or the remove command fails.
    pub async fn rm(&self) -> Result<()> {
        let services = self.existing_services().await?;
        if services.is_empty() {
            info!("No services to remove");
            return Ok(());
        }

        let names = services
            .iter()
            .map(|s| quote(&self.project.prefixed(&s.name)))
            .collect::<Result<Vec<_>>>()?;
        self.run(&format!("docker service rm {}", names.join(" ")))
            .await
    }

    /// Pulls the images of the selected services on every ready node.
    ///
    /// Each node pulls in its own task; a failing node does not stop the
    /// others, and a failing image does not stop the node's other pulls. The report lists nodes in the order they finished.
    ///
    /// # Errors
    ///
    /// Returns an error if a service has no image or nodes cannot be listed.
    /// Per-node failures are recorded in the report instead.
    pub async fn pull(&self) -> Result<PullReport> {
        let mut pulls = Vec::new();
        for service in self.project.selected_services() {
            let image = service.image().ok_or_else(|| ConfigError::MissingImage {
                service: service.name.clone(),
            })?;
            pulls.push(quote(&image)?);
        }

        let nodes = self.prober.ready_nodes().await?;
        let mut report = PullReport::default();
        if pulls.is_empty() || nodes.is_empty() {
            warn!("Nothing to pull");
            return Ok(report);
        }

        let mut tasks = JoinSet::new();
        for node in nodes {
            let host = quote(&format!("tcp://{node}:{NODE_DOCKER_PORT}"))?;
            let command = run_all(
                pulls
                    .iter()
                    .map(|image| format!("docker -H {host} pull {image}")),
            );
            let runner = Arc::clone(&self.runner);
            info!("Pulling on node {}", node);
            tasks.spawn(async move {
                let result = runner.run(&command, ExitPolicy::Check).await;
                (node, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            let (node, result) =
                joined.map_err(|e| ComposeError::internal(format!("Pull task failed: {e}")))?;
            let entry = match result {
                Ok(_) => {
                    info!("Node {} - DONE", node);
                    NodePullResult {
                        node,
                        success: true,
                        error: None,
                    }
                }
                Err(e) => {
                    warn!("Node {} - FAILED: {}", node, e);
                    NodePullResult {
                        node,
                        success: false,
                        error: Some(e.to_string()),
                    }
                }
            };
            report.nodes.push(entry);
        }

        Ok(report)
    }

    async fn existing_services(&self) -> Result<Vec<&'a ServiceDefinition>> {
        let mut existing = Vec::new();
        for service in self.project.selected_services() {
            if self
                .prober
                .service_exists(&self.project.prefixed(&service.name))
                .await?
            {
                existing.push(service);
            }
        }
        Ok(existing)
    }

    async fn scale(&self, services: &[&ServiceDefinition], replicas: Option<&str>) -> Result<()> {
        let targets = services
            .iter()
            .map(|s| -> Result<String> {
                let count = replicas.map_or_else(|| s.replicas(), String::from);
                Ok(format!(
                    "{}={}",
                    quote(&self.project.prefixed(&s.name))?,
                    quote(&count)?
                ))
            })
            .collect::<Result<Vec<_>>>()?;
        self.run(&format!("docker service scale {}", targets.join(" ")))
            .await
    }

    async fn run(&self, command: &str) -> Result<()> {
        self.runner.run(command, ExitPolicy::Check).await?;
        Ok(())
    }
}

/// Joins shell commands so that every one runs and the line exits nonzero
/// if any of them failed.
fn run_all(commands: impl IntoIterator<Item = String>) -> String {
    let mut line = String::from("status=0;");
    for command in commands {
        line.push_str(&format!(" {command} || status=1;"));
    }
    line.push_str(" exit $status");
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::ScriptedRunner;
    use crate::compose::ComposeLoader;

    const COMPOSE: &str = r"
services:
  web:
    image: nginx
    replicas: 3
    networks: [front]
    volumes: ['./html:/usr/share/nginx/html:ro']
    environment: ['constraint:node.role==manager']
  db:
    image: postgres
    volumes: ['pgdata:/var/lib/postgresql/data']
networks:
  front: {}
  shared: {external: true}
volumes:
  pgdata: {}
";

    fn project(requested: &[String]) -> ComposeProject {
        let document = ComposeLoader::parse_yaml(COMPOSE, None).expect("parse failed");
        ComposeProject::from_document(&document, "app", "/srv/app", requested)
            .expect("project failed")
    }

    #[tokio::test]
    async fn test_up_creates_resources_in_order() {
        let project = project(&[]);
        let runner = Arc::new(ScriptedRunner::new().respond("inspect", 1, ""));
        let emitter = SwarmEmitter::new(&project, runner.clone());

        let summary = emitter.up().await.expect("up failed");
        assert_eq!(summary.created, vec!["web", "db"]);
        assert!(summary.scaled.is_empty());

        let creates: Vec<String> = runner
            .calls()
            .into_iter()
            .filter(|c| c.contains(" create "))
            .collect();
        assert_eq!(creates.len(), 4);
        assert_eq!(
            creates[0],
            "docker network create --driver overlay --opt encrypted app_front"
        );
        assert_eq!(creates[1], "docker volume create --name app_pgdata");
        assert!(creates[2].starts_with("docker service create --with-registry-auth"));
        assert!(creates[2].contains("--name app_web"));
        assert!(creates[2].contains("--network app_front"));
        assert!(creates[2].contains("node.role==manager"));
        assert!(creates[2].contains("/srv/app/html"));
        assert!(creates[2].contains("readonly=1"));
        assert!(creates[2].trim_end().ends_with("nginx"));
        assert!(creates[3].contains("--name app_db"));
        assert!(!runner.calls().iter().any(|c| c.contains("shared")));
    }

    #[tokio::test]
    async fn test_up_scales_existing_services() {
        let project = project(&[]);
        let runner = Arc::new(
            ScriptedRunner::new()
                .respond("service inspect --format '{{.Spec.Name}}' app_web", 0, "app_web\n")
                .respond("inspect", 1, ""),
        );
        let emitter = SwarmEmitter::new(&project, runner.clone());

        let summary = emitter.up().await.expect("up failed");
        assert_eq!(summary.created, vec!["db"]);
        assert_eq!(summary.scaled, vec!["web"]);

        let calls = runner.calls();
        assert!(!calls.iter().any(|c| c.contains("--name app_web")));
        assert_eq!(calls.last().map(String::as_str), Some("docker service scale app_web=3"));
    }

    #[tokio::test]
    async fn test_up_stops_on_first_failure() {
        let project = project(&[]);
        let runner = Arc::new(
            ScriptedRunner::new()
                .respond("inspect", 1, "")
                .respond("network create", 1, "permission denied"),
        );
        let emitter = SwarmEmitter::new(&project, runner.clone());

        assert!(emitter.up().await.is_err());
        assert!(!runner.calls().iter().any(|c| c.contains("volume create")));
    }

    #[tokio::test]
    async fn test_start_scales_selected_services() {
        let requested = vec![String::from("db")];
        let project = project(&requested);
        let runner = Arc::new(ScriptedRunner::new());
        let emitter = SwarmEmitter::new(&project, runner.clone());

        emitter.start().await.expect("start failed");
        assert_eq!(runner.calls(), vec!["docker service scale app_db=1"]);
    }

    #[tokio::test]
    async fn test_stop_and_rm_skip_missing_services() {
        let project = project(&[]);
        let runner = Arc::new(
            ScriptedRunner::new()
                .respond("inspect --format '{{.Spec.Name}}' app_db", 0, "app_db\n")
                .respond("inspect", 1, ""),
        );
        let emitter = SwarmEmitter::new(&project, runner.clone());

        emitter.stop().await.expect("stop failed");
        emitter.rm().await.expect("rm failed");

        let actions: Vec<String> = runner
            .calls()
            .into_iter()
            .filter(|c| !c.contains("inspect"))
            .collect();
        assert_eq!(
            actions,
            vec!["docker service scale app_db=0", "docker service rm app_db"]
        );
    }

    #[tokio::test]
    async fn test_stop_with_nothing_running_is_noop() {
        let project = project(&[]);
        let runner = Arc::new(ScriptedRunner::new().respond("inspect", 1, ""));
        let emitter = SwarmEmitter::new(&project, runner.clone());

        emitter.stop().await.expect("stop failed");
        assert!(runner.calls().iter().all(|c| c.contains("inspect")));
    }

    #[tokio::test]
    async fn test_pull_fails_if_any_node_fails() {
        let project = project(&[]);
        let runner = Arc::new(
            ScriptedRunner::new()
                .respond("node ls", 0, "n1 Ready\nn2 Ready\nn3 Ready\n")
                .respond("tcp://n2:", 1, "pull access denied"),
        );
        let emitter = SwarmEmitter::new(&project, runner.clone());

        let report = emitter.pull().await.expect("pull failed");
        assert_eq!(report.nodes.len(), 3);
        assert_eq!(report.failed(), 1);
        assert!(report.ensure_success().is_err());

        let failed: Vec<&str> = report
            .nodes
            .iter()
            .filter(|n| !n.success)
            .map(|n| n.node.as_str())
            .collect();
        assert_eq!(failed, vec!["n2"]);

        let pulls: Vec<String> = runner
            .calls()
            .into_iter()
            .filter(|c| c.contains(" pull "))
            .collect();
        assert_eq!(pulls.len(), 3);
        assert!(pulls.iter().all(|c| c.contains("pull nginx") && c.contains("pull postgres")));
    }

    #[tokio::test]
    async fn test_run_all_keeps_going_after_failure() {
        let line = run_all(["echo a", "false", "echo b"].map(String::from));
        assert_eq!(line, "status=0; echo a || status=1; false || status=1; echo b || status=1; exit $status");

        let runner = crate::cluster::ShellRunner::new(false);
        let output = runner
            .run(&line, ExitPolicy::Ignore)
            .await
            .expect("run failed");
        assert_eq!(output.exit_code, 1);
        assert_eq!(output.output, "a\nb\n");

        let output = runner
            .run(&run_all(["echo ok".to_string()]), ExitPolicy::Check)
            .await
            .expect("run failed");
        assert!(output.success());
    }

    #[tokio::test]
    async fn test_pull_succeeds_on_all_nodes() {
        let project = project(&[]);
        let runner = Arc::new(ScriptedRunner::new().respond("node ls", 0, "n1 Ready\nn2 Down\n"));
        let emitter = SwarmEmitter::new(&project, runner.clone());

        let report = emitter.pull().await.expect("pull failed");
        assert_eq!(report.nodes.len(), 1);
        assert!(report.ensure_success().is_ok());
    }
}
