//! Per-parameter translation rules.
//!
//! Every parameter of a resolved service maps to exactly one [`Parameter`]
//! variant. Names outside the recognised set become
//! [`Parameter::Unsupported`], which is logged and otherwise ignored.

use serde_yaml::{Mapping, Value};
use std::path::Path;
use tracing::{debug, warn};

use crate::compose::{ComposeProject, ServiceDefinition, key_string, scalar_string};
use crate::error::{ConfigError, Result};

use super::builder::{Invocation, InvocationBuilder};
use super::directive::{Directive, Mount, MountKind};

/// Logging driver used when `logging.driver` is absent.
pub const DEFAULT_LOG_DRIVER: &str = "json-file";

/// A recognised service parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Parameter {
    /// `image`
    Image,
    /// `command`
    Command,
    /// `restart`
    Restart,
    /// `logging`
    Logging,
    /// `mem_limit`
    MemLimit,
    /// `replicas`
    Replicas,
    /// `ports`
    Ports,
    /// `networks`
    Networks,
    /// `volumes`
    Volumes,
    /// `environment`
    Environment,
    /// `env_file`
    EnvFile,
    /// `labels`
    Labels,
    /// `mode`
    Mode,
    /// `expose`
    Expose,
    /// `container_name`
    ContainerName,
    /// `hostname`
    Hostname,
    /// `extra_hosts`
    ExtraHosts,
    /// Any other parameter name.
    Unsupported(String),
}

impl Parameter {
    /// Classifies a parameter name.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name {
            "image" => Self::Image,
            "command" => Self::Command,
            "restart" => Self::Restart,
            "logging" => Self::Logging,
            "mem_limit" => Self::MemLimit,
            "replicas" => Self::Replicas,
            "ports" => Self::Ports,
            "networks" => Self::Networks,
            "volumes" => Self::Volumes,
            "environment" => Self::Environment,
            "env_file" => Self::EnvFile,
            "labels" => Self::Labels,
            "mode" => Self::Mode,
            "expose" => Self::Expose,
            "container_name" => Self::ContainerName,
            "hostname" => Self::Hostname,
            "extra_hosts" => Self::ExtraHosts,
            other => Self::Unsupported(other.to_string()),
        }
    }

    /// Returns the compose name of the parameter.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Image => "image",
            Self::Command => "command",
            Self::Restart => "restart",
            Self::Logging => "logging",
            Self::MemLimit => "mem_limit",
            Self::Replicas => "replicas",
            Self::Ports => "ports",
            Self::Networks => "networks",
            Self::Volumes => "volumes",
            Self::Environment => "environment",
            Self::EnvFile => "env_file",
            Self::Labels => "labels",
            Self::Mode => "mode",
            Self::Expose => "expose",
            Self::ContainerName => "container_name",
            Self::Hostname => "hostname",
            Self::ExtraHosts => "extra_hosts",
            Self::Unsupported(name) => name,
        }
    }
}

/// Translates resolved services into invocations.
#[derive(Debug, Clone, Copy)]
pub struct Translator<'a> {
    project: &'a ComposeProject,
}

impl<'a> Translator<'a> {
    /// Creates a translator for services of `project`.
    #[must_use]
    pub const fn new(project: &'a ComposeProject) -> Self {
        Self { project }
    }

    /// Translates one service.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if a parameter value is invalid, a
    /// network is undeclared, or the service has no image.
    pub fn translate(&self, service: &ServiceDefinition) -> Result<Invocation> {
        debug!("Translating service '{}'", service.name);
        let mut builder = InvocationBuilder::new();

        for (key, value) in &service.parameters {
            let parameter = Parameter::from_name(&key_string(key));
            let cx = Context {
                service: &service.name,
                parameter: &parameter,
                value,
            };
            self.apply(&cx, &mut builder)?;
        }

        builder.finalize(&service.name)
    }

    fn apply(&self, cx: &Context<'_>, builder: &mut InvocationBuilder) -> Result<()> {
        match cx.parameter {
            Parameter::Image => builder.set_image(cx.scalar()?),
            Parameter::Command => builder.extend_command(command_args(cx)?),
            Parameter::Restart => builder.push(restart(cx)?),
            Parameter::Logging => logging(cx, builder)?,
            Parameter::MemLimit => builder.push(Directive::MemoryLimit(cx.scalar()?)),
            Parameter::Replicas => builder.push(Directive::Replicas(cx.scalar()?)),
            Parameter::Ports => {
                for port in cx.entries()? {
                    builder.push(Directive::Publish(port_spec(cx, port)?));
                }
            }
            Parameter::Networks => self.networks(cx, builder)?,
            Parameter::Volumes => {
                for entry in cx.entries()? {
                    builder.push(Directive::Mount(self.mount(cx, entry)?));
                }
            }
            Parameter::Environment => environment(cx, builder)?,
            Parameter::EnvFile => self.env_file(cx, builder)?,
            Parameter::Labels => {
                for label in key_value_entries(cx)? {
                    builder.push(Directive::Label(label));
                }
            }
            Parameter::Mode => builder.push(Directive::Mode(cx.scalar()?)),
            Parameter::Expose => {
                for port in cx.entries()? {
                    builder.push(Directive::Expose(cx.scalar_of(port)?));
                }
            }
            Parameter::ContainerName => builder.push(Directive::ContainerName(cx.scalar()?)),
            Parameter::Hostname => builder.push(Directive::Hostname(cx.scalar()?)),
            Parameter::ExtraHosts => {
                for host in key_value_entries_with(cx, ':')? {
                    builder.push(Directive::ExtraHost(host));
                }
            }
            Parameter::Unsupported(name) => {
                warn!("Unsupported parameter '{}' in service '{}'", name, cx.service);
            }
        }
        Ok(())
    }

    fn networks(&self, cx: &Context<'_>, builder: &mut InvocationBuilder) -> Result<()> {
        let names: Vec<String> = match cx.value {
            Value::Mapping(mapping) => mapping.keys().map(key_string).collect(),
            _ => cx
                .entries()?
                .iter()
                .map(|v| cx.scalar_of(v))
                .collect::<Result<_>>()?,
        };

        for name in names {
            let Some(network) = self.project.network(&name) else {
                return Err(ConfigError::UndeclaredNetwork {
                    service: cx.service.to_string(),
                    network: name,
                }
                .into());
            };
            let reference = if network.external {
                name
            } else {
                self.project.prefixed(&name)
            };
            builder.push(Directive::Network(reference));
        }
        Ok(())
    }

    fn mount(&self, cx: &Context<'_>, entry: &Value) -> Result<Mount> {
        let (source, target, read_only) = match entry {
            Value::Mapping(mapping) => {
                let field = |key: &str| mapping.get(key).and_then(scalar_string).filter(|s| !s.is_empty());
                let target = field("target").ok_or_else(|| cx.invalid("volume has no target"))?;
                let source = field("source").unwrap_or_default();
                let read_only = mapping
                    .get("read_only")
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                (source, target, read_only)
            }
            other => {
                let spec = cx.scalar_of(other)?;
                let mut parts = spec.splitn(3, ':');
                let source = parts.next().unwrap_or_default().to_string();
                let target = parts
                    .next()
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| cx.invalid(format!("volume '{spec}' has no container path")))?
                    .to_string();
                let read_only = parts.next().is_some_and(|mode| mode.split(',').any(|m| m == "ro"));
                (source, target, read_only)
            }
        };

        if source.is_empty() {
            return Err(cx.invalid(format!("volume for '{target}' has no source")).into());
        }

        let source = relative_to(self.project.base_dir(), &source);
        if source.starts_with('/') {
            return Ok(Mount {
                kind: MountKind::Bind,
                source,
                target,
                read_only,
            });
        }

        let source = match self.project.volume(&source) {
            Some(volume) if volume.external => source,
            _ => self.project.prefixed(&source),
        };
        Ok(Mount {
            kind: MountKind::Volume,
            source,
            target,
            read_only,
        })
    }

    fn env_file(&self, cx: &Context<'_>, builder: &mut InvocationBuilder) -> Result<()> {
        let files: Vec<String> = match cx.value {
            Value::Sequence(_) => cx
                .entries()?
                .iter()
                .map(|v| cx.scalar_of(v))
                .collect::<Result<_>>()?,
            other => vec![cx.scalar_of(other)?],
        };

        for file in files {
            let path = self.project.base_dir().join(&file);
            debug!("Reading env_file {}", path.display());
            let content = std::fs::read_to_string(&path).map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    ConfigError::FileNotFound { path: path.clone() }
                } else {
                    ConfigError::ParseError {
                        message: format!("Failed to read env_file: {e}"),
                        location: Some(path.display().to_string()),
                    }
                }
            })?;
            for entry in env_file_entries(&content) {
                builder.push(Directive::Env(entry.to_string()));
            }
        }
        Ok(())
    }
}

/// Returns the entries of an env file, one per non-blank, non-comment line.
///
/// Lines are passed through verbatim apart from surrounding whitespace; bare
/// keys and `$` references are left for the container runtime.
fn env_file_entries(content: &str) -> impl Iterator<Item = &str> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
}

/// The parameter being translated.
struct Context<'a> {
    service: &'a str,
    parameter: &'a Parameter,
    value: &'a Value,
}

impl Context<'_> {
    fn invalid(&self, message: impl Into<String>) -> ConfigError {
        ConfigError::invalid_value(self.service, self.parameter.name(), message)
    }

    fn scalar(&self) -> Result<String> {
        self.scalar_of(self.value)
    }

    fn scalar_of(&self, value: &Value) -> Result<String> {
        scalar_string(value).ok_or_else(|| self.invalid("expected a scalar").into())
    }

    fn entries(&self) -> Result<&[Value]> {
        match self.value {
            Value::Sequence(seq) => Ok(seq.as_slice()),
            Value::Null => Ok(&[]),
            _ => Err(self.invalid("expected a list").into()),
        }
    }
}

fn command_args(cx: &Context<'_>) -> Result<Vec<String>> {
    match cx.value {
        Value::Sequence(seq) => seq.iter().map(|v| cx.scalar_of(v)).collect(),
        other => Ok(cx
            .scalar_of(other)?
            .split_whitespace()
            .map(String::from)
            .collect()),
    }
}

fn restart(cx: &Context<'_>) -> Result<Directive> {
    let value = cx.scalar()?;
    match value.as_str() {
        "always" => Ok(Directive::RestartCondition(String::from("any"))),
        _ => Err(ConfigError::UnsupportedValue {
            service: cx.service.to_string(),
            parameter: cx.parameter.name().to_string(),
            value,
        }
        .into()),
    }
}

fn logging(cx: &Context<'_>, builder: &mut InvocationBuilder) -> Result<()> {
    let Value::Mapping(config) = cx.value else {
        return Err(cx.invalid("expected a mapping").into());
    };

    let driver = match config.get("driver") {
        Some(value) => cx.scalar_of(value)?,
        None => String::from(DEFAULT_LOG_DRIVER),
    };
    builder.push(Directive::LogDriver(driver));

    match config.get("options") {
        None | Some(Value::Null) => {}
        Some(Value::Mapping(options)) => {
            for (key, value) in options {
                let value = cx.scalar_of(value)?;
                builder.push(Directive::LogOpt(format!("{}={value}", key_string(key))));
            }
        }
        Some(_) => return Err(cx.invalid("'options' must be a mapping").into()),
    }
    Ok(())
}

fn port_spec(cx: &Context<'_>, port: &Value) -> Result<String> {
    let Value::Mapping(mapping) = port else {
        return cx.scalar_of(port);
    };

    let field = |key: &str| mapping.get(key).and_then(scalar_string).filter(|s| !s.is_empty());
    let target = field("target").ok_or_else(|| cx.invalid("port has no target"))?;
    let mut spec = Vec::new();
    if let Some(published) = field("published") {
        spec.push(format!("published={published}"));
    }
    spec.push(format!("target={target}"));
    if let Some(protocol) = field("protocol") {
        spec.push(format!("protocol={protocol}"));
    }
    if let Some(mode) = field("mode") {
        spec.push(format!("mode={mode}"));
    }
    Ok(spec.join(","))
}

fn environment(cx: &Context<'_>, builder: &mut InvocationBuilder) -> Result<()> {
    if let Value::Mapping(mapping) = cx.value {
        for entry in mapping_entries(cx, mapping, '=')? {
            builder.push(Directive::Env(entry));
        }
        return Ok(());
    }

    for entry in cx.entries()? {
        let entry = cx.scalar_of(entry)?;
        match placement_constraint(&entry) {
            Some(constraint) => builder.push(Directive::Constraint(constraint.to_string())),
            None => builder.push(Directive::Env(entry)),
        }
    }
    Ok(())
}

/// Extracts the expression from a `constraint:` or `affinity:` entry.
#[must_use]
pub fn placement_constraint(entry: &str) -> Option<&str> {
    ["constraint:", "affinity:"]
        .iter()
        .find_map(|prefix| entry.strip_prefix(prefix))
}

fn key_value_entries(cx: &Context<'_>) -> Result<Vec<String>> {
    key_value_entries_with(cx, '=')
}

fn key_value_entries_with(cx: &Context<'_>, separator: char) -> Result<Vec<String>> {
    match cx.value {
        Value::Mapping(mapping) => mapping_entries(cx, mapping, separator),
        _ => cx.entries()?.iter().map(|v| cx.scalar_of(v)).collect(),
    }
}

fn mapping_entries(cx: &Context<'_>, mapping: &Mapping, separator: char) -> Result<Vec<String>> {
    mapping
        .iter()
        .map(|(key, value)| -> Result<String> {
            let key = key_string(key);
            match value {
                Value::Null => Ok(key),
                other => Ok(format!("{key}{separator}{}", cx.scalar_of(other)?)),
            }
        })
        .collect()
}

/// Resolves a `./` or `../` path against `base_dir`.
fn relative_to(base_dir: &Path, source: &str) -> String {
    if source == "." || source.starts_with("./") || source.starts_with("../") || source == ".." {
        let relative = source.strip_prefix("./").unwrap_or(source);
        let joined = if relative == "." {
            base_dir.to_path_buf()
        } else {
            base_dir.join(relative)
        };
        return joined.display().to_string();
    }
    if let Some(home) = source.strip_prefix("~/") {
        if let Some(home_dir) = std::env::var_os("HOME") {
            return Path::new(&home_dir).join(home).display().to_string();
        }
    }
    source.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::ComposeLoader;
    use crate::error::ComposeError;
    use tempfile::TempDir;

    fn project_in(yaml: &str, base_dir: &Path) -> ComposeProject {
        let document = ComposeLoader::parse_yaml(yaml, None).expect("parse failed");
        ComposeProject::from_document(&document, "app", base_dir, &[])
            .expect("project failed")
    }

    fn project(yaml: &str) -> ComposeProject {
        project_in(yaml, Path::new("/srv/app"))
    }

    fn translate(project: &ComposeProject, name: &str) -> Result<Invocation> {
        let service = project.service(name).expect("service missing");
        Translator::new(project).translate(service)
    }

    #[test]
    fn test_parameter_names_round_trip() {
        for name in ["image", "env_file", "mem_limit", "extra_hosts", "container_name"] {
            assert_eq!(Parameter::from_name(name).name(), name);
        }
        assert_eq!(
            Parameter::from_name("healthcheck"),
            Parameter::Unsupported(String::from("healthcheck"))
        );
    }

    #[test]
    fn test_directives_follow_declaration_order() {
        let project = project(
            r"
services:
  web:
    command: nginx -g daemon
    replicas: 2
    image: nginx
    ports: ['80:80', '443:443']
    mem_limit: 512m
",
        );
        let invocation = translate(&project, "web").expect("translate failed");
        assert_eq!(
            invocation.directives,
            vec![
                Directive::Replicas(String::from("2")),
                Directive::Publish(String::from("80:80")),
                Directive::Publish(String::from("443:443")),
                Directive::MemoryLimit(String::from("512m")),
            ]
        );
        assert_eq!(invocation.image, "nginx");
        assert_eq!(invocation.command, vec!["nginx", "-g", "daemon"]);
    }

    #[test]
    fn test_missing_image_is_fatal() {
        let project = project("services: {web: {replicas: 1}}");
        assert!(matches!(
            translate(&project, "web"),
            Err(ComposeError::Config(ConfigError::MissingImage { .. }))
        ));
    }

    #[test]
    fn test_restart_is_closed_set() {
        let project = project(
            "services: {a: {image: x, restart: always}, b: {image: x, restart: on-failure}}",
        );
        let a = translate(&project, "a").expect("translate failed");
        assert_eq!(a.directives, vec![Directive::RestartCondition(String::from("any"))]);

        assert!(matches!(
            translate(&project, "b"),
            Err(ComposeError::Config(ConfigError::UnsupportedValue { ref value, .. })) if value == "on-failure"
        ));
    }

    #[test]
    fn test_logging_driver_and_options() {
        let project = project(
            r"
services:
  a:
    image: x
    logging:
      driver: syslog
      options: {syslog-address: 'udp://1.2.3.4:514', tag: web}
  b:
    image: x
    logging: {}
",
        );
        let a = translate(&project, "a").expect("translate failed");
        assert_eq!(
            a.directives,
            vec![
                Directive::LogDriver(String::from("syslog")),
                Directive::LogOpt(String::from("syslog-address=udp://1.2.3.4:514")),
                Directive::LogOpt(String::from("tag=web")),
            ]
        );

        let b = translate(&project, "b").expect("translate failed");
        assert_eq!(b.directives, vec![Directive::LogDriver(String::from(DEFAULT_LOG_DRIVER))]);
    }

    #[test]
    fn test_networks_prefix_internal_only() {
        let project = project(
            r"
services:
  web:
    image: x
    networks: [front, shared]
networks:
  front: {}
  shared: {external: true}
",
        );
        let invocation = translate(&project, "web").expect("translate failed");
        assert_eq!(
            invocation.directives,
            vec![
                Directive::Network(String::from("app_front")),
                Directive::Network(String::from("shared")),
            ]
        );
    }

    #[test]
    fn test_undeclared_network_is_fatal() {
        let project = project("services: {web: {image: x, networks: {back: {}}}}");
        assert!(matches!(
            translate(&project, "web"),
            Err(ComposeError::Config(ConfigError::UndeclaredNetwork { ref network, .. })) if network == "back"
        ));
    }

    #[test]
    fn test_relative_volume_is_read_only_bind() {
        let project = project("services: {web: {image: x, volumes: ['./data:/var/data:ro']}}");
        let invocation = translate(&project, "web").expect("translate failed");
        assert_eq!(
            invocation.directives,
            vec![Directive::Mount(Mount {
                kind: MountKind::Bind,
                source: String::from("/srv/app/data"),
                target: String::from("/var/data"),
                read_only: true,
            })]
        );
    }

    #[test]
    fn test_named_and_external_volumes() {
        let project = project(
            r"
services:
  db:
    image: postgres
    volumes:
      - pgdata:/var/lib/postgresql
      - shared:/shared
      - {source: /etc/tz, target: /etc/timezone, read_only: true}
volumes:
  pgdata: {}
  shared: {external: true}
",
        );
        let invocation = translate(&project, "db").expect("translate failed");
        let mounts: Vec<String> = invocation.directives.iter().map(Directive::value).collect();
        assert_eq!(
            mounts,
            vec![
                "src=app_pgdata,dst=/var/lib/postgresql,readonly=0",
                "src=shared,dst=/shared,readonly=0",
                "type=bind,src=/etc/tz,dst=/etc/timezone,readonly=1",
            ]
        );
    }

    #[test]
    fn test_volume_without_target_is_invalid() {
        let project = project("services: {web: {image: x, volumes: ['data']}}");
        assert!(matches!(
            translate(&project, "web"),
            Err(ComposeError::Config(ConfigError::InvalidValue { .. }))
        ));
    }

    #[test]
    fn test_environment_forms_and_constraints() {
        let project = project(
            r"
services:
  a:
    image: x
    environment: {MODE: prod, EMPTY: null, PORT: 8080}
  b:
    image: x
    environment:
      - A=1
      - constraint:node.role==manager
      - affinity:container!=db
",
        );
        let a = translate(&project, "a").expect("translate failed");
        assert_eq!(
            a.directives,
            vec![
                Directive::Env(String::from("MODE=prod")),
                Directive::Env(String::from("EMPTY")),
                Directive::Env(String::from("PORT=8080")),
            ]
        );

        let b = translate(&project, "b").expect("translate failed");
        assert_eq!(
            b.directives,
            vec![
                Directive::Env(String::from("A=1")),
                Directive::Constraint(String::from("node.role==manager")),
                Directive::Constraint(String::from("container!=db")),
            ]
        );
    }

    #[test]
    fn test_env_file_skips_comments_and_blanks() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        std::fs::write(dir.path().join("web.env"), "# comment\n\nA=1\n  B=two words  \n")
            .expect("write failed");

        let project = project_in("services: {web: {image: x, env_file: web.env}}", dir.path());
        let invocation = translate(&project, "web").expect("translate failed");
        assert_eq!(
            invocation.directives,
            vec![
                Directive::Env(String::from("A=1")),
                Directive::Env(String::from("B=two words")),
            ]
        );
    }

    #[test]
    fn test_env_file_keeps_bare_keys_and_dollar_literal() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        std::fs::write(dir.path().join("a.env"), "PASS=a$HOME\nBARE\n").expect("write failed");
        std::fs::write(dir.path().join("b.env"), "REF=${USER}x\n").expect("write failed");

        let project = project_in(
            "services: {web: {image: x, env_file: [a.env, b.env]}}",
            dir.path(),
        );
        let invocation = translate(&project, "web").expect("translate failed");
        assert_eq!(
            invocation.directives,
            vec![
                Directive::Env(String::from("PASS=a$HOME")),
                Directive::Env(String::from("BARE")),
                Directive::Env(String::from("REF=${USER}x")),
            ]
        );
    }

    #[test]
    fn test_missing_env_file_is_fatal() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let project = project_in("services: {web: {image: x, env_file: nope.env}}", dir.path());
        assert!(matches!(
            translate(&project, "web"),
            Err(ComposeError::Config(ConfigError::FileNotFound { .. }))
        ));
    }

    #[test]
    fn test_labels_mode_and_ignored_parameters() {
        let project = project(
            r"
services:
  web:
    image: x
    labels: {tier: front}
    mode: global
    hostname: web1
    healthcheck: {test: true}
",
        );
        let invocation = translate(&project, "web").expect("translate failed");
        assert_eq!(
            invocation.directives,
            vec![
                Directive::Label(String::from("tier=front")),
                Directive::Mode(String::from("global")),
                Directive::Hostname(String::from("web1")),
            ]
        );
    }

    #[test]
    fn test_long_form_ports() {
        let project = project(
            "services: {web: {image: x, ports: [{target: 80, published: 8080, protocol: tcp}]}}",
        );
        let invocation = translate(&project, "web").expect("translate failed");
        assert_eq!(
            invocation.directives,
            vec![Directive::Publish(String::from("published=8080,target=80,protocol=tcp"))]
        );
    }

    #[test]
    fn test_placement_constraint() {
        assert_eq!(placement_constraint("constraint:node.role==manager"), Some("node.role==manager"));
        assert_eq!(placement_constraint("affinity:a:b"), Some("a:b"));
        assert_eq!(placement_constraint("A=constraint:x"), None);
    }
}
