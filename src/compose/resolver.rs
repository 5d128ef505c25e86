//! Service inheritance resolution.
//!
//! This module flattens `extends` references so every service definition is
//! self-contained. A service may extend another service in the same
//! document or a service in another compose file; the parent is fully
//! resolved first and the child's own parameters are merged over it.

use serde_yaml::{Mapping, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{ConfigError, Result};

use super::loader::ComposeLoader;
use super::merge::{ConflictPolicy, DocumentMerger, inherit_environment};
use super::value::key_string;

/// Parsed form of an `extends` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ExtendsRef {
    service: String,
    file: Option<PathBuf>,
}

/// Resolver for `extends` inheritance.
#[derive(Debug)]
pub struct ServiceResolver {
    /// Directory that relative `extends.file` paths resolve against.
    base_dir: PathBuf,
    /// Loader for referenced files.
    loader: ComposeLoader,
    /// Cross-file references currently being resolved, outermost first.
    file_chain: Vec<(PathBuf, String)>,
}

impl ServiceResolver {
    /// Creates a resolver for documents located in `base_dir`.
    #[must_use]
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            loader: ComposeLoader::new(),
            file_chain: Vec::new(),
        }
    }

    /// Resolves every service in `services`, keeping declaration order.
    ///
    /// # Errors
    ///
    /// Returns an error if a reference cannot be resolved, references form a
    /// cycle, or a referenced file cannot be loaded.
    pub fn resolve(&self, services: &Mapping) -> Result<Mapping> {
        let mut resolved: HashMap<String, Mapping> = HashMap::new();
        let mut stack = Vec::new();
        let mut output = Mapping::new();

        for key in services.keys() {
            let name = key_string(key);
            let definition = self.resolve_service(&name, services, &mut resolved, &mut stack)?;
            output.insert(key.clone(), Value::Mapping(definition));
        }

        Ok(output)
    }

    fn resolve_service(
        &self,
        name: &str,
        services: &Mapping,
        resolved: &mut HashMap<String, Mapping>,
        stack: &mut Vec<String>,
    ) -> Result<Mapping> {
        if let Some(done) = resolved.get(name) {
            return Ok(done.clone());
        }

        if stack.iter().any(|s| s == name) {
            let mut cycle = stack.clone();
            cycle.push(name.to_string());
            return Err(ConfigError::CircularExtends {
                cycle: cycle.join(" -> "),
            }
            .into());
        }

        let mut definition = service_definition(name, services.get(name))?;
        let Some(extends) = definition.shift_remove("extends") else {
            resolved.insert(name.to_string(), definition.clone());
            return Ok(definition);
        };
        let reference = parse_extends(name, &extends)?;

        stack.push(name.to_string());
        let parent = match &reference.file {
            None => {
                if !services.contains_key(reference.service.as_str()) {
                    return Err(ConfigError::UnresolvedExtends {
                        service: name.to_string(),
                        target: reference.service,
                        file: None,
                    }
                    .into());
                }
                debug!("Service '{}' extends '{}'", name, reference.service);
                self.resolve_service(&reference.service, services, resolved, stack)?
            }
            Some(file) => self.resolve_external(name, &reference.service, file)?,
        };
        stack.pop();

        let merged = Self::inheritance_merger().merge(parent, definition)?;
        resolved.insert(name.to_string(), merged.clone());
        Ok(merged)
    }

    /// Resolves `target` from another compose file.
    ///
    /// Only the target and the services it inherits from are resolved, not
    /// every service of that file. The result for the target is the same,
    /// and a file may then reference itself through `extends.file` without
    /// being reported as a cycle. Broken `extends` entries of unrelated
    /// services in the referenced file are not reported.
    fn resolve_external(&self, service: &str, target: &str, file: &Path) -> Result<Mapping> {
        let path = self.base_dir.join(file);
        debug!(
            "Service '{}' extends '{}' from {}",
            service,
            target,
            path.display()
        );

        let canonical = std::path::absolute(&path)?;
        let reference = (canonical.clone(), target.to_string());
        if self.file_chain.contains(&reference) {
            let mut chain: Vec<String> = self
                .file_chain
                .iter()
                .map(|(f, s)| format!("{}:{s}", f.display()))
                .collect();
            chain.push(format!("{}:{target}", canonical.display()));
            return Err(ConfigError::CircularExtends {
                cycle: chain.join(" -> "),
            }
            .into());
        }

        let document = self.loader.load_file(&path)?;
        let services = match document.get("services") {
            Some(Value::Mapping(services)) => services.clone(),
            _ => Mapping::new(),
        };

        if !services.contains_key(target) {
            return Err(ConfigError::UnresolvedExtends {
                service: service.to_string(),
                target: target.to_string(),
                file: Some(file.to_path_buf()),
            }
            .into());
        }

        let mut file_chain = self.file_chain.clone();
        file_chain.push(reference);
        let nested = Self {
            base_dir: canonical
                .parent()
                .map_or_else(|| self.base_dir.clone(), Path::to_path_buf),
            loader: ComposeLoader::new(),
            file_chain,
        };

        // The target's own chain resolves against that file's directory.
        let mut resolved = HashMap::new();
        let mut stack = Vec::new();
        nested.resolve_service(target, &services, &mut resolved, &mut stack)
    }

    /// Merger used to overlay a child service on its parent.
    ///
    /// The child wins every conflict, including duplicate `environment`
    /// keys across the mapping and list forms.
    fn inheritance_merger() -> DocumentMerger {
        DocumentMerger::bare()
            .with_policy(ConflictPolicy::PreferOverlay)
            .with_resolver("environment", inherit_environment)
    }
}

fn service_definition(name: &str, value: Option<&Value>) -> Result<Mapping> {
    match value {
        Some(Value::Mapping(mapping)) => Ok(mapping.clone()),
        Some(Value::Null) | None => Ok(Mapping::new()),
        Some(_) => Err(ConfigError::invalid_value(name, "service", "definition must be a mapping").into()),
    }
}

fn parse_extends(service: &str, value: &Value) -> Result<ExtendsRef> {
    match value {
        Value::String(target) => Ok(ExtendsRef {
            service: target.clone(),
            file: None,
        }),
        Value::Mapping(mapping) => {
            let target = mapping
                .get("service")
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    ConfigError::invalid_value(service, "extends", "missing 'service' key")
                })?;
            let file = match mapping.get("file") {
                None | Some(Value::Null) => None,
                Some(Value::String(file)) => Some(PathBuf::from(file)),
                Some(_) => {
                    return Err(ConfigError::invalid_value(
                        service,
                        "extends",
                        "'file' must be a string",
                    )
                    .into());
                }
            };
            Ok(ExtendsRef {
                service: target.to_string(),
                file,
            })
        }
        _ => Err(ConfigError::invalid_value(
            service,
            "extends",
            "expected a service name or a mapping",
        )
        .into()),
    }
}
