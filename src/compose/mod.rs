//! Compose document handling.
//!
//! This module covers everything that happens before translation:
//! - Loading compose documents and the `.env` file
//! - Deep-merging multiple documents into one
//! - Resolving `extends` inheritance between services
//! - Building the project model that the emitters consume

mod loader;
mod merge;
mod project;
mod resolver;
mod value;

pub use loader::{ComposeLoader, DEFAULT_COMPOSE_FILE, Document, compose_base_dir};
pub use merge::{ConflictPolicy, ConflictResolver, DocumentMerger, inherit_environment, merge_environment};
pub use project::{ComposeProject, ResourceDefinition, ServiceDefinition};
pub use resolver::ServiceResolver;
pub use value::{key_string, scalar_string};
