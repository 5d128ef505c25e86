//! Translation engine.
//!
//! This module turns resolved service definitions into typed directives:
//! - [`Parameter`] dispatch, one rule per recognised compose parameter
//! - [`Directive`] values with shell quoting for CLI rendering
//! - [`InvocationBuilder`] keeping the image and command after every flag

mod builder;
mod directive;
mod parameter;

pub use builder::{Invocation, InvocationBuilder};
pub use directive::{Directive, Mount, MountKind, quote};
pub use parameter::{DEFAULT_LOG_DRIVER, Parameter, Translator, placement_constraint};
