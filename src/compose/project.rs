//! Compose project model.
//!
//! A [`ComposeProject`] is the merged, fully resolved view of the compose
//! files for one run, together with the project name used to prefix every
//! network, volume and service created on the cluster.

use serde_yaml::{Mapping, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{ConfigError, Result};

use super::loader::{ComposeLoader, Document, compose_base_dir};
use super::resolver::ServiceResolver;
use super::value::{key_string, scalar_string};

/// A single resolved service.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceDefinition {
    /// Service name as declared.
    pub name: String,
    /// Resolved parameters in declaration order.
    pub parameters: Mapping,
}

impl ServiceDefinition {
    /// Creates a new service definition.
    #[must_use]
    pub fn new(name: impl Into<String>, parameters: Mapping) -> Self {
        Self {
            name: name.into(),
            parameters,
        }
    }

    /// Returns a parameter value.
    #[must_use]
    pub fn get(&self, parameter: &str) -> Option<&Value> {
        self.parameters.get(parameter)
    }

    /// Returns the image, if set.
    #[must_use]
    pub fn image(&self) -> Option<String> {
        self.get("image").and_then(scalar_string).filter(|s| !s.is_empty())
    }

    /// Returns the desired replica count, defaulting to `"1"`.
    #[must_use]
    pub fn replicas(&self) -> String {
        self.get("replicas")
            .and_then(scalar_string)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| String::from("1"))
    }
}

/// A network or volume declared at the top level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDefinition {
    /// Declared name.
    pub name: String,
    /// Whether the resource is managed outside this project.
    pub external: bool,
}

impl ResourceDefinition {
    fn from_entry(key: &Value, value: &Value) -> Self {
        let external = value
            .as_mapping()
            .and_then(|m| m.get("external"))
            .is_some_and(|v| !matches!(v, Value::Bool(false) | Value::Null));
        Self {
            name: key_string(key),
            external,
        }
    }
}

/// The resolved compose project.
#[derive(Debug, Clone)]
pub struct ComposeProject {
    name: String,
    base_dir: PathBuf,
    services: Vec<ServiceDefinition>,
    networks: Vec<ResourceDefinition>,
    volumes: Vec<ResourceDefinition>,
    selected: Vec<String>,
}

impl ComposeProject {
    /// Loads, merges and resolves the given compose files.
    ///
    /// The project name defaults to the base name of the directory holding
    /// the first file. `requested` restricts the selected services; an empty
    /// slice selects all of them.
    ///
    /// # Errors
    ///
    /// Returns an error if a file cannot be loaded, files conflict, an
    /// `extends` reference cannot be resolved, or a requested service does
    /// not exist.
    pub fn load(files: &[PathBuf], project_name: Option<&str>, requested: &[String]) -> Result<Self> {
        let base_dir = compose_base_dir(files)?;
        let document = ComposeLoader::new().load_all(files)?;

        let name = project_name.map_or_else(|| default_project_name(&base_dir), String::from);
        info!("Project '{}' in {}", name, base_dir.display());

        Self::from_document(&document, name, base_dir, requested)
    }

    /// Builds a project from an already merged document.
    ///
    /// # Errors
    ///
    /// Returns an error if services cannot be resolved or a requested
    /// service does not exist.
    pub fn from_document(
        document: &Document,
        name: impl Into<String>,
        base_dir: impl Into<PathBuf>,
        requested: &[String],
    ) -> Result<Self> {
        let base_dir = base_dir.into();

        let declared = section(document, "services", "services")?;
        let resolved = ServiceResolver::new(&base_dir).resolve(&declared)?;

        let services: Vec<ServiceDefinition> = resolved
            .into_iter()
            .map(|(key, value)| {
                let parameters = match value {
                    Value::Mapping(m) => m,
                    _ => Mapping::new(),
                };
                ServiceDefinition::new(key_string(&key), parameters)
            })
            .collect();

        let networks = resources(&section(document, "networks", "networks")?);
        let volumes = resources(&section(document, "volumes", "volumes")?);

        for requested_name in requested {
            if !services.iter().any(|s| &s.name == requested_name) {
                return Err(ConfigError::UnknownService {
                    name: requested_name.clone(),
                }
                .into());
            }
        }

        let selected = if requested.is_empty() {
            services.iter().map(|s| s.name.clone()).collect()
        } else {
            services
                .iter()
                .filter(|s| requested.contains(&s.name))
                .map(|s| s.name.clone())
                .collect()
        };

        debug!(
            "Resolved {} services, {} networks, {} volumes",
            services.len(),
            networks.len(),
            volumes.len()
        );

        Ok(Self {
            name: name.into(),
            base_dir,
            services,
            networks,
            volumes,
            selected,
        })
    }

    /// Returns the project name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the directory relative paths resolve against.
    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Qualifies a resource name with the project name.
    #[must_use]
    pub fn prefixed(&self, value: &str) -> String {
        if self.name.is_empty() {
            value.to_string()
        } else {
            format!("{}_{value}", self.name)
        }
    }

    /// Returns all services in declaration order.
    #[must_use]
    pub fn services(&self) -> &[ServiceDefinition] {
        &self.services
    }

    /// Returns the selected services in declaration order.
    pub fn selected_services(&self) -> impl Iterator<Item = &ServiceDefinition> {
        self.services
            .iter()
            .filter(|s| self.selected.contains(&s.name))
    }

    /// Looks up a service by name.
    #[must_use]
    pub fn service(&self, name: &str) -> Option<&ServiceDefinition> {
        self.services.iter().find(|s| s.name == name)
    }

    /// Returns the declared networks.
    #[must_use]
    pub fn networks(&self) -> &[ResourceDefinition] {
        &self.networks
    }

    /// Returns the declared volumes.
    #[must_use]
    pub fn volumes(&self) -> &[ResourceDefinition] {
        &self.volumes
    }

    /// Looks up a declared network.
    #[must_use]
    pub fn network(&self, name: &str) -> Option<&ResourceDefinition> {
        self.networks.iter().find(|n| n.name == name)
    }

    /// Looks up a declared volume.
    #[must_use]
    pub fn volume(&self, name: &str) -> Option<&ResourceDefinition> {
        self.volumes.iter().find(|v| v.name == name)
    }

    /// Renders the resolved project as a compose document.
    #[must_use]
    pub fn to_document(&self) -> Document {
        let mut services = Mapping::new();
        for service in self.selected_services() {
            services.insert(
                Value::from(service.name.clone()),
                Value::Mapping(service.parameters.clone()),
            );
        }

        let mut document = Mapping::new();
        document.insert(Value::from("services"), Value::Mapping(services));
        if !self.networks.is_empty() {
            document.insert(Value::from("networks"), resources_document(&self.networks));
        }
        if !self.volumes.is_empty() {
            document.insert(Value::from("volumes"), resources_document(&self.volumes));
        }
        document
    }
}

fn default_project_name(base_dir: &Path) -> String {
    base_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn section(document: &Document, key: &str, parameter: &str) -> Result<Mapping> {
    match document.get(key) {
        Some(Value::Mapping(mapping)) => Ok(mapping.clone()),
        Some(Value::Null) | None => Ok(Mapping::new()),
        Some(_) => Err(ConfigError::ParseError {
            message: format!("'{parameter}' must be a mapping"),
            location: None,
        }
        .into()),
    }
}

fn resources(section: &Mapping) -> Vec<ResourceDefinition> {
    section
        .iter()
        .map(|(key, value)| ResourceDefinition::from_entry(key, value))
        .collect()
}

fn resources_document(resources: &[ResourceDefinition]) -> Value {
    let mut mapping = Mapping::new();
    for resource in resources {
        let value = if resource.external {
            let mut inner = Mapping::new();
            inner.insert(Value::from("external"), Value::Bool(true));
            Value::Mapping(inner)
        } else {
            Value::Null
        };
        mapping.insert(Value::from(resource.name.clone()), value);
    }
    Value::Mapping(mapping)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ComposeError;
    use tempfile::TempDir;

    fn project(yaml: &str, requested: &[String]) -> Result<ComposeProject> {
        let document = ComposeLoader::parse_yaml(yaml, None).expect("parse failed");
        ComposeProject::from_document(&document, "app", "/srv/app", requested)
    }

    #[test]
    fn test_prefixed_names() {
        let project = project("services: {}", &[]).expect("project failed");
        assert_eq!(project.prefixed("web"), "app_web");

        let document = Mapping::new();
        let bare = ComposeProject::from_document(&document, "", "/srv", &[])
            .expect("project failed");
        assert_eq!(bare.prefixed("web"), "web");
    }

    #[test]
    fn test_resources_and_external_flag() {
        let project = project(
            r"
services: {}
networks:
  front: {}
  shared: {external: true}
  named: {external: {name: other}}
volumes:
  data:
",
            &[],
        )
        .expect("project failed");

        assert_eq!(project.networks().len(), 3);
        assert!(!project.network("front").expect("front").external);
        assert!(project.network("shared").expect("shared").external);
        assert!(project.network("named").expect("named").external);
        assert!(!project.volume("data").expect("data").external);
    }

    #[test]
    fn test_selection_keeps_declaration_order() {
        let requested = vec![String::from("c"), String::from("a")];
        let project = project(
            "services: {a: {image: x}, b: {image: y}, c: {image: z}}",
            &requested,
        )
        .expect("project failed");

        let names: Vec<&str> = project.selected_services().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["a", "c"]);
        assert_eq!(project.services().len(), 3);
    }

    #[test]
    fn test_unknown_service_is_error() {
        let requested = vec![String::from("nope")];
        let result = project("services: {a: {image: x}}", &requested);
        assert!(matches!(
            result,
            Err(ComposeError::Config(ConfigError::UnknownService { .. }))
        ));
    }

    #[test]
    fn test_replicas_default_and_value() {
        let project = project("services: {a: {image: x}, b: {image: y, replicas: 3}}", &[])
            .expect("project failed");
        assert_eq!(project.service("a").expect("a").replicas(), "1");
        assert_eq!(project.service("b").expect("b").replicas(), "3");
        assert_eq!(project.service("a").expect("a").image(), Some(String::from("x")));
    }

    #[test]
    fn test_load_defaults_name_to_directory() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let app = dir.path().join("myapp");
        std::fs::create_dir(&app).expect("mkdir failed");
        let file = app.join("docker-compose.yml");
        std::fs::write(&file, "services:\n  web:\n    image: nginx\n").expect("write failed");

        let project = ComposeProject::load(&[file], None, &[]).expect("load failed");
        assert_eq!(project.name(), "myapp");
        assert_eq!(project.base_dir(), app.as_path());

        let named = ComposeProject::load(&[app.join("docker-compose.yml")], Some("prod"), &[])
            .expect("load failed");
        assert_eq!(named.prefixed("web"), "prod_web");
    }

    #[test]
    fn test_to_document_round_trips_sections() {
        let project = project(
            "services: {web: {image: nginx}}\nnetworks: {front: {}}\nvolumes: {ext: {external: true}}",
            &[],
        )
        .expect("project failed");
        let document = project.to_document();
        assert!(document.contains_key("services"));
        assert!(document.contains_key("networks"));
        assert_eq!(document["volumes"]["ext"]["external"], Value::Bool(true));
    }
}
