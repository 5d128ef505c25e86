//! Static manifest emitter.
//!
//! This module renders each selected service as a `Service` document and a
//! `Deployment` document. The documents are typed structs so that field
//! order, and therefore the output, is deterministic.

use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::compose::{ComposeProject, ServiceDefinition};
use crate::error::{ConfigError, Result};
use crate::translate::{Directive, Invocation, MountKind, Translator};

/// Document separator written before every manifest.
const SEPARATOR: &str = "---\n";

/// Label key tying a deployment's pods to its service.
const SERVICE_LABEL: &str = "service";

/// Object metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Metadata {
    /// Object name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Object labels.
    pub labels: BTreeMap<String, String>,
}

/// `Service` document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceManifest {
    /// Always `v1`.
    pub api_version: &'static str,
    /// Always `Service`.
    pub kind: &'static str,
    /// Service metadata.
    pub metadata: Metadata,
    /// Service spec.
    pub spec: ServiceSpec,
}

/// `Service` spec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceSpec {
    /// Pod selector.
    pub selector: BTreeMap<String, String>,
    /// Exposed ports.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<ServicePort>,
}

/// One exposed service port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServicePort {
    /// Port name.
    pub name: String,
    /// Service port.
    pub port: u16,
    /// Container port.
    pub target_port: u16,
    /// Transport protocol.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
}

/// `Deployment` document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentManifest {
    /// Always `apps/v1`.
    pub api_version: &'static str,
    /// Always `Deployment`.
    pub kind: &'static str,
    /// Deployment metadata.
    pub metadata: Metadata,
    /// Deployment spec.
    pub spec: DeploymentSpec,
}

/// `Deployment` spec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeploymentSpec {
    /// Desired replica count.
    pub replicas: u32,
    /// Pod selector.
    pub selector: LabelSelector,
    /// Pod template.
    pub template: PodTemplate,
}

/// Label selector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelSelector {
    /// Labels pods must carry.
    pub match_labels: BTreeMap<String, String>,
}

/// Pod template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PodTemplate {
    /// Pod metadata.
    pub metadata: Metadata,
    /// Pod spec.
    pub spec: PodSpec,
}

/// Pod spec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PodSpec {
    /// Containers, always exactly one.
    pub containers: Vec<Container>,
    /// Restart policy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restart_policy: Option<String>,
    /// Pod hostname.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    /// Extra `/etc/hosts` entries.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub host_aliases: Vec<HostAlias>,
    /// Node placement.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub node_selector: BTreeMap<String, String>,
    /// Pod volumes.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<PodVolume>,
}

/// Container spec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    /// Container name.
    pub name: String,
    /// Image reference.
    pub image: String,
    /// Command arguments.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    /// Environment variables.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,
    /// Resource limits.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<Resources>,
    /// Volume mounts.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub volume_mounts: Vec<VolumeMount>,
}

/// Environment variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvVar {
    /// Variable name.
    pub name: String,
    /// Variable value.
    pub value: String,
}

/// Container resources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resources {
    /// Resource limits.
    pub limits: BTreeMap<String, String>,
}

/// Container volume mount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeMount {
    /// Pod volume name.
    pub name: String,
    /// Path inside the container.
    pub mount_path: String,
    /// Whether the mount is read-only.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub read_only: bool,
}

/// Pod volume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PodVolume {
    /// Volume name.
    pub name: String,
    /// Host path source for bind mounts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_path: Option<HostPath>,
    /// Claim source for named volumes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persistent_volume_claim: Option<ClaimSource>,
}

/// Host path volume source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostPath {
    /// Path on the node.
    pub path: String,
}

/// Persistent volume claim source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimSource {
    /// Claim name.
    pub claim_name: String,
}

/// `/etc/hosts` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostAlias {
    /// Address.
    pub ip: String,
    /// Names resolving to the address.
    pub hostnames: Vec<String>,
}

/// The two documents produced for one service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceManifests {
    /// `Service` document.
    pub service: ServiceManifest,
    /// `Deployment` document.
    pub deployment: DeploymentManifest,
}

/// Renders services as static manifests.
#[derive(Debug, Clone, Copy)]
pub struct ManifestEmitter<'a> {
    project: &'a ComposeProject,
}

impl<'a> ManifestEmitter<'a> {
    /// Creates a manifest emitter for `project`.
    #[must_use]
    pub const fn new(project: &'a ComposeProject) -> Self {
        Self { project }
    }

    /// Renders every selected service as YAML documents.
    ///
    /// # Errors
    ///
    /// Returns an error if a service cannot be translated or serialized.
    pub fn render(&self) -> Result<String> {
        let mut output = String::new();
        for service in self.project.selected_services() {
            let manifests = self.build(service)?;
            output.push_str(SEPARATOR);
            output.push_str(&serde_yaml::to_string(&manifests.service)?);
            output.push_str(SEPARATOR);
            output.push_str(&serde_yaml::to_string(&manifests.deployment)?);
        }
        Ok(output)
    }

    /// Builds the manifests for one service.
    ///
    /// # Errors
    ///
    /// Returns an error if the service cannot be translated or a value
    /// cannot be represented in the manifest schema.
    pub fn build(&self, service: &ServiceDefinition) -> Result<ServiceManifests> {
        let invocation = Translator::new(self.project).translate(service)?;
        ManifestBuilder::new(&service.name).apply(&invocation)
    }
}

/// Accumulates manifest fields from a service's directives.
#[derive(Debug)]
struct ManifestBuilder {
    service: String,
    name: String,
    labels: BTreeMap<String, String>,
    container_name: Option<String>,
    replicas: u32,
    ports: Vec<ServicePort>,
    env: Vec<EnvVar>,
    limits: BTreeMap<String, String>,
    mounts: Vec<VolumeMount>,
    volumes: Vec<PodVolume>,
    node_selector: BTreeMap<String, String>,
    restart_policy: Option<String>,
    hostname: Option<String>,
    host_aliases: Vec<HostAlias>,
}

impl ManifestBuilder {
    fn new(service: &str) -> Self {
        let name = dns_label(service);
        let mut labels = BTreeMap::new();
        labels.insert(SERVICE_LABEL.to_string(), name.clone());
        Self {
            service: service.to_string(),
            name,
            labels,
            container_name: None,
            replicas: 1,
            ports: Vec::new(),
            env: Vec::new(),
            limits: BTreeMap::new(),
            mounts: Vec::new(),
            volumes: Vec::new(),
            node_selector: BTreeMap::new(),
            restart_policy: None,
            hostname: None,
            host_aliases: Vec::new(),
        }
    }

    fn apply(mut self, invocation: &Invocation) -> Result<ServiceManifests> {
        for directive in &invocation.directives {
            self.directive(directive)?;
        }
        Ok(self.finish(invocation))
    }

    fn directive(&mut self, directive: &Directive) -> Result<()> {
        match directive {
            Directive::RestartCondition(_) => self.restart_policy = Some(String::from("Always")),
            Directive::MemoryLimit(limit) => {
                self.limits
                    .insert(String::from("memory"), kubernetes_quantity(limit));
            }
            Directive::Replicas(replicas) => {
                self.replicas = replicas.trim().parse().map_err(|_| {
                    ConfigError::invalid_value(
                        &self.service,
                        "replicas",
                        format!("'{replicas}' is not a replica count"),
                    )
                })?;
            }
            Directive::Expose(port) => {
                let service_port = self.service_port(port)?;
                self.ports.push(service_port);
            }
            Directive::Env(entry) => {
                let (name, value) = entry.split_once('=').unwrap_or((entry.as_str(), ""));
                self.env.push(EnvVar {
                    name: name.to_string(),
                    value: value.to_string(),
                });
            }
            Directive::Constraint(expression) => match expression.split_once("==") {
                Some((key, value)) => {
                    self.node_selector
                        .insert(key.trim().to_string(), value.trim().to_string());
                }
                None => warn!(
                    "Constraint '{}' of service '{}' has no node selector equivalent, skipping",
                    expression, self.service
                ),
            },
            Directive::Mount(mount) => {
                let name = format!("{}-{}", self.name, self.volumes.len());
                let volume = match mount.kind {
                    MountKind::Bind => PodVolume {
                        name: name.clone(),
                        host_path: Some(HostPath {
                            path: mount.source.clone(),
                        }),
                        persistent_volume_claim: None,
                    },
                    MountKind::Volume => PodVolume {
                        name: name.clone(),
                        host_path: None,
                        persistent_volume_claim: Some(ClaimSource {
                            claim_name: dns_label(&mount.source),
                        }),
                    },
                };
                self.volumes.push(volume);
                self.mounts.push(VolumeMount {
                    name,
                    mount_path: mount.target.clone(),
                    read_only: mount.read_only,
                });
            }
            Directive::Label(label) => {
                let (key, value) = label.split_once('=').unwrap_or((label.as_str(), ""));
                self.labels.insert(key.to_string(), value.to_string());
            }
            Directive::Hostname(hostname) => self.hostname = Some(hostname.clone()),
            Directive::ContainerName(name) => self.container_name = Some(dns_label(name)),
            Directive::ExtraHost(entry) => match entry.split_once(':') {
                Some((host, ip)) => self.host_aliases.push(HostAlias {
                    ip: ip.to_string(),
                    hostnames: vec![host.to_string()],
                }),
                None => warn!("Invalid extra_hosts entry '{}', skipping", entry),
            },
            Directive::Mode(mode) if mode == "replicated" => {}
            Directive::Mode(_)
            | Directive::LogDriver(_)
            | Directive::LogOpt(_)
            | Directive::Publish(_)
            | Directive::Network(_) => {
                warn!(
                    "'{}' of service '{}' is not supported in manifests, skipping",
                    directive.cli_flag().unwrap_or_default().trim_start_matches("--"),
                    self.service
                );
            }
        }
        Ok(())
    }

    fn service_port(&self, entry: &str) -> Result<ServicePort> {
        let (port, protocol) = match entry.split_once('/') {
            Some((port, protocol)) => (port, Some(protocol.to_uppercase())),
            None => (entry, None),
        };
        let port: u16 = port.trim().parse().map_err(|_| {
            ConfigError::invalid_value(&self.service, "expose", format!("'{entry}' is not a port"))
        })?;
        Ok(ServicePort {
            name: format!("port-{port}"),
            port,
            target_port: port,
            protocol,
        })
    }

    fn finish(self, invocation: &Invocation) -> ServiceManifests {
        debug!("Building manifests for service '{}'", self.service);
        let selector: BTreeMap<String, String> =
            [(SERVICE_LABEL.to_string(), self.name.clone())].into();

        let service = ServiceManifest {
            api_version: "v1",
            kind: "Service",
            metadata: Metadata {
                name: Some(self.name.clone()),
                labels: selector.clone(),
            },
            spec: ServiceSpec {
                selector: selector.clone(),
                ports: self.ports,
            },
        };

        let container = Container {
            name: self.container_name.unwrap_or_else(|| self.name.clone()),
            image: invocation.image.clone(),
            args: invocation.command.clone(),
            env: self.env,
            resources: (!self.limits.is_empty()).then_some(Resources {
                limits: self.limits,
            }),
            volume_mounts: self.mounts,
        };

        let deployment = DeploymentManifest {
            api_version: "apps/v1",
            kind: "Deployment",
            metadata: Metadata {
                name: Some(self.name),
                labels: self.labels,
            },
            spec: DeploymentSpec {
                replicas: self.replicas,
                selector: LabelSelector {
                    match_labels: selector.clone(),
                },
                template: PodTemplate {
                    metadata: Metadata {
                        name: None,
                        labels: selector,
                    },
                    spec: PodSpec {
                        containers: vec![container],
                        restart_policy: self.restart_policy,
                        hostname: self.hostname,
                        host_aliases: self.host_aliases,
                        node_selector: self.node_selector,
                        volumes: self.volumes,
                    },
                },
            },
        };

        ServiceManifests {
            service,
            deployment,
        }
    }
}

/// Converts a compose memory size to a manifest quantity.
///
/// `k`, `m` and `g` suffixes (optionally followed by `b`) become `Ki`, `Mi`
/// and `Gi`; plain byte counts pass through.
#[must_use]
pub fn kubernetes_quantity(value: &str) -> String {
    let trimmed = value.trim();
    let lower = trimmed.to_ascii_lowercase();
    let without_b = lower
        .strip_suffix('b')
        .filter(|rest| rest.ends_with(['k', 'm', 'g']))
        .unwrap_or(lower.as_str());

    let suffixes = [('k', "Ki"), ('m', "Mi"), ('g', "Gi")];
    for (suffix, unit) in suffixes {
        if let Some(number) = without_b.strip_suffix(suffix) {
            return format!("{number}{unit}");
        }
    }
    trimmed.to_string()
}

/// Lowercases a name and replaces characters not allowed in DNS labels.
#[must_use]
pub fn dns_label(name: &str) -> String {
    let label: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();
    label.trim_matches('-').to_string()
}
