// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![forbid(unsafe_code)]               // Unsafe code is forbidden
#![warn(missing_docs)]                // All public items must be documented
#![warn(dead_code)]                   // Unused code
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![warn(unused_imports)]              // Unused imports
#![warn(unused_variables)]            // Unused variables
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::missing_const_for_fn)] // Force const when possible
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::module_inception)]    // Module with same name as crate warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::shadow_unrelated)]    // Shadowing unrelated variables warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity
#![cfg_attr(not(test), warn(clippy::expect_used))] // expect() warning outside tests

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # Compose Swarm Mode
//!
//! Deploys compose files to a swarm-mode cluster, or converts them to static
//! `Service`/`Deployment` manifests.
//!
//! ## Overview
//!
//! A run goes through a fixed pipeline:
//!
//! 1. **Load**: read the compose files and `.env`
//! 2. **Merge**: deep-merge the files left to right
//! 3. **Resolve**: flatten `extends` inheritance between services
//! 4. **Translate**: turn each service parameter into typed directives
//! 5. **Emit**: run swarm CLI commands, or render manifests
//!
//! Cluster commands probe current state first, so `up` creates only what is
//! missing and scales services that already exist.
//!
//! ## Modules
//!
//! - [`compose`]: Loading, merging, `extends` resolution and the project model
//! - [`translate`]: Per-parameter translation into directives
//! - [`cluster`]: External command execution and state probes
//! - [`emit`]: Swarm CLI and manifest emitters
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```yaml
//! services:
//!   web:
//!     extends: {file: common.yml, service: base}
//!     image: nginx:1.27
//!     replicas: 3
//!     networks: [front]
//!     volumes: ["./html:/usr/share/nginx/html:ro"]
//!     environment:
//!       - constraint:node.role==worker
//! networks:
//!   front: {}
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod cli;
pub mod cluster;
pub mod compose;
pub mod emit;
pub mod error;
pub mod translate;

// ============================================================================
// Re-exports
// ============================================================================

pub use cli::{Cli, Commands, OutputFormatter};
pub use cluster::{ClusterProber, CommandOutput, CommandRunner, ExitPolicy, ShellRunner};
pub use compose::{ComposeLoader, ComposeProject, DocumentMerger, ServiceResolver};
pub use emit::{ManifestEmitter, PullReport, SwarmEmitter, UpSummary};
pub use error::{ComposeError, Result};
pub use translate::{Directive, Invocation, Parameter, Translator};
