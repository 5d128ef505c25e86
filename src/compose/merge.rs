//! Deep merge of compose documents.
//!
//! Merging overlays one document on another:
//! - mappings merge recursively
//! - sequences concatenate, overlay entries after base entries
//! - equal scalars are kept
//! - anything else is a conflict, handed to a per-key resolver if one is
//!   registered and otherwise settled by the [`ConflictPolicy`]

use serde_yaml::{Mapping, Value};
use std::fmt;

use crate::error::{MergeError, Result};

use super::value::{key_string, scalar_string};

/// Resolves a conflict between a base and an overlay value.
///
/// Returns `None` when the resolver does not apply to this pair of values.
pub type ConflictResolver = fn(&Value, &Value) -> Option<Value>;

/// How conflicts without a matching resolver are settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictPolicy {
    /// Fail with a merge conflict error.
    #[default]
    Strict,
    /// Keep the overlay value.
    PreferOverlay,
}

/// Deep merger for compose documents.
#[derive(Clone)]
pub struct DocumentMerger {
    /// Fallback for conflicts no resolver handles.
    policy: ConflictPolicy,
    /// Resolvers keyed by the mapping key they apply to.
    resolvers: Vec<(String, ConflictResolver)>,
}

impl DocumentMerger {
    /// Creates a strict merger with the `environment` resolver registered.
    #[must_use]
    pub fn new() -> Self {
        Self::bare().with_resolver("environment", merge_environment)
    }

    /// Creates a strict merger with no resolvers.
    #[must_use]
    pub const fn bare() -> Self {
        Self {
            policy: ConflictPolicy::Strict,
            resolvers: Vec::new(),
        }
    }

    /// Sets the fallback conflict policy.
    #[must_use]
    pub const fn with_policy(mut self, policy: ConflictPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Registers a resolver for conflicts under `key`.
    #[must_use]
    pub fn with_resolver(mut self, key: impl Into<String>, resolver: ConflictResolver) -> Self {
        self.resolvers.push((key.into(), resolver));
        self
    }

    /// Merges `overlay` into `base` and returns the result.
    ///
    /// # Errors
    ///
    /// Returns a merge conflict if two scalars disagree, no resolver handles
    /// them and the policy is strict.
    pub fn merge(&self, mut base: Mapping, overlay: Mapping) -> Result<Mapping> {
        let mut path = Vec::new();
        self.merge_into(&mut base, overlay, &mut path)?;
        Ok(base)
    }

    /// Merges documents left to right, seeding with the first one.
    ///
    /// # Errors
    ///
    /// Returns the first merge conflict encountered.
    pub fn merge_all(&self, documents: impl IntoIterator<Item = Mapping>) -> Result<Mapping> {
        let mut documents = documents.into_iter();
        let Some(seed) = documents.next() else {
            return Ok(Mapping::new());
        };
        documents.try_fold(seed, |acc, doc| self.merge(acc, doc))
    }

    fn merge_into(&self, base: &mut Mapping, overlay: Mapping, path: &mut Vec<String>) -> Result<()> {
        for (key, value) in overlay {
            if !base.contains_key(&key) {
                base.insert(key, value);
                continue;
            }
            let Some(existing) = base.get_mut(&key) else {
                continue;
            };

            let name = key_string(&key);
            match (existing, value) {
                (Value::Mapping(existing), Value::Mapping(value)) => {
                    path.push(name);
                    self.merge_into(existing, value, path)?;
                    path.pop();
                }
                (Value::Sequence(existing), Value::Sequence(value)) => existing.extend(value),
                (existing, value) => {
                    if *existing == value {
                        continue;
                    }
                    if let Some(resolved) = self.resolve(&name, existing, &value) {
                        *existing = resolved;
                        continue;
                    }
                    match self.policy {
                        ConflictPolicy::PreferOverlay => *existing = value,
                        ConflictPolicy::Strict => {
                            path.push(name);
                            let conflict = path.join(".");
                            return Err(MergeError::Conflict { path: conflict }.into());
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn resolve(&self, key: &str, base: &Value, overlay: &Value) -> Option<Value> {
        self.resolvers
            .iter()
            .filter(|(k, _)| k == key)
            .find_map(|(_, resolver)| resolver(base, overlay))
    }
}

impl Default for DocumentMerger {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DocumentMerger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys: Vec<&str> = self.resolvers.iter().map(|(k, _)| k.as_str()).collect();
        f.debug_struct("DocumentMerger")
            .field("policy", &self.policy)
            .field("resolvers", &keys)
            .finish()
    }
}

/// Resolver for `environment` given as a mapping on one side and a list on
/// the other.
///
/// The mapping side is normalised to `KEY=value` strings and the two lists
/// are concatenated with the overlay's entries first. Duplicate keys are all
/// kept; when the result is passed as repeated `--env` flags the last one
/// wins, which is the base entry.
#[must_use]
pub fn merge_environment(base: &Value, overlay: &Value) -> Option<Value> {
    let (base_entries, overlay_entries) = mixed_environment(base, overlay)?;
    let mut merged = overlay_entries;
    merged.extend(base_entries);
    Some(Value::Sequence(merged))
}

/// Resolver for `environment` when a service inherits from its parent.
///
/// Same normalisation as [`merge_environment`], but the parent (base)
/// entries come first so that the child's entries are the ones `--env`
/// keeps. This matches the mapping/mapping and list/list cases, where the
/// child already wins.
#[must_use]
pub fn inherit_environment(base: &Value, overlay: &Value) -> Option<Value> {
    let (mut merged, overlay_entries) = mixed_environment(base, overlay)?;
    merged.extend(overlay_entries);
    Some(Value::Sequence(merged))
}

fn mixed_environment(base: &Value, overlay: &Value) -> Option<(Vec<Value>, Vec<Value>)> {
    match (base, overlay) {
        (Value::Mapping(base), Value::Sequence(overlay)) => Some((environment_list(base), overlay.clone())),
        (Value::Sequence(base), Value::Mapping(overlay)) => Some((base.clone(), environment_list(overlay))),
        _ => None,
    }
}

fn environment_list(mapping: &Mapping) -> Vec<Value> {
    mapping
        .iter()
        .map(|(key, value)| {
            let key = key_string(key);
            let entry = match value {
                Value::Null => key,
                other => format!("{key}={}", scalar_string(other).unwrap_or_default()),
            };
            Value::String(entry)
        })
        .collect()
}
