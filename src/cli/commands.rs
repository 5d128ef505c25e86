//! CLI command definitions.
//!
//! This module defines all CLI commands and their arguments using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::compose::DEFAULT_COMPOSE_FILE;

/// Compose-swarm - Deploy compose files to a swarm-mode cluster.
#[derive(Parser, Debug)]
#[command(name = "compose-swarm")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Compose file(s), merged left to right.
    #[arg(
        short = 'f',
        long = "file",
        env = "COMPOSE_FILE",
        value_delimiter = ':',
        default_value = DEFAULT_COMPOSE_FILE
    )]
    pub files: Vec<PathBuf>,

    /// Project name (defaults to the compose directory name).
    #[arg(short = 'p', long, env = "COMPOSE_PROJECT_NAME")]
    pub project_name: Option<String>,

    /// Print commands instead of running them.
    #[arg(long)]
    pub dry_run: bool,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create networks, volumes and services; scale existing services.
    Up {
        /// Accepted for docker-compose compatibility; services always run detached.
        #[arg(short = 'd', long)]
        detach: bool,

        /// Services to act on (defaults to all).
        services: Vec<String>,
    },

    /// Scale services to their declared replicas.
    Start {
        /// Services to act on (defaults to all).
        services: Vec<String>,
    },

    /// Scale existing services to zero.
    Stop {
        /// Services to act on (defaults to all).
        services: Vec<String>,
    },

    /// Remove existing services.
    Rm {
        /// Accepted for docker-compose compatibility; removal never prompts.
        #[arg(short = 'f', long)]
        force: bool,

        /// Services to act on (defaults to all).
        services: Vec<String>,
    },

    /// Pull service images on every ready node.
    Pull {
        /// Services to act on (defaults to all).
        services: Vec<String>,
    },

    /// Print Service and Deployment manifests.
    Convert {
        /// Services to act on (defaults to all).
        services: Vec<String>,
    },

    /// Print the merged and resolved compose document.
    Config {
        /// Services to act on (defaults to all).
        services: Vec<String>,
    },
}

impl Commands {
    /// Returns the services the command was invoked for.
    #[must_use]
    pub fn services(&self) -> &[String] {
        match self {
            Self::Up { services, .. }
            | Self::Start { services }
            | Self::Stop { services }
            | Self::Rm { services, .. }
            | Self::Pull { services }
            | Self::Convert { services }
            | Self::Config { services } => services,
        }
    }

    /// Returns the command name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Up { .. } => "up",
            Self::Start { .. } => "start",
            Self::Stop { .. } => "stop",
            Self::Rm { .. } => "rm",
            Self::Pull { .. } => "pull",
            Self::Convert { .. } => "convert",
            Self::Config { .. } => "config",
        }
    }
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_files_and_services() {
        let cli = Cli::try_parse_from([
            "compose-swarm",
            "-f",
            "base.yml",
            "-f",
            "prod.yml",
            "-p",
            "shop",
            "--dry-run",
            "up",
            "-d",
            "web",
            "db",
        ])
        .expect("parse failed");

        assert_eq!(
            cli.files,
            vec![PathBuf::from("base.yml"), PathBuf::from("prod.yml")]
        );
        assert_eq!(cli.project_name.as_deref(), Some("shop"));
        assert!(cli.dry_run);
        assert_eq!(cli.command.name(), "up");
        assert_eq!(cli.command.services(), ["web", "db"]);
    }

    #[test]
    fn test_rm_force_is_accepted() {
        let cli = Cli::try_parse_from(["compose-swarm", "-f", "a.yml", "rm", "-f"])
            .expect("parse failed");
        assert!(matches!(cli.command, Commands::Rm { force: true, .. }));
        assert!(cli.command.services().is_empty());
    }

    #[test]
    fn test_file_list_splits_on_colon() {
        let cli = Cli::try_parse_from(["compose-swarm", "-f", "a.yml:b.yml", "convert"])
            .expect("parse failed");
        assert_eq!(cli.files, vec![PathBuf::from("a.yml"), PathBuf::from("b.yml")]);
    }
}
