//! compose-swarm CLI entrypoint.
//!
//! This is the main entrypoint for the compose-swarm command-line tool.

use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;

use compose_swarm_mode::cli::{Cli, Commands, OutputFormatter};
use compose_swarm_mode::cluster::ShellRunner;
use compose_swarm_mode::compose::{ComposeLoader, ComposeProject};
use compose_swarm_mode::emit::{ManifestEmitter, SwarmEmitter};
use compose_swarm_mode::error::Result;

use clap::Parser;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    // `.env` may supply COMPOSE_FILE and COMPOSE_PROJECT_NAME, so it is read
    // before the arguments.
    let dotenv = ComposeLoader::load_dotenv(".");

    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.verbose);

    if let Err(e) = dotenv {
        warn!("{e}");
    }

    // Run async runtime
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(e.exit_code())
        }
    }
}

/// Initializes the logging system.
fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<()> {
    let formatter = OutputFormatter::new(cli.output);
    let project = ComposeProject::load(
        &cli.files,
        cli.project_name.as_deref(),
        cli.command.services(),
    )?;
    debug!("Running '{}' for project '{}'", cli.command.name(), project.name());

    match &cli.command {
        Commands::Convert { .. } => {
            let manifests = ManifestEmitter::new(&project).render()?;
            write_stdout(&manifests)
        }
        Commands::Config { .. } => {
            let document = serde_yaml::to_string(&project.to_document())?;
            write_stdout(&document)
        }
        command => {
            let runner = Arc::new(ShellRunner::new(cli.dry_run));
            let emitter = SwarmEmitter::new(&project, runner);
            cmd_swarm(&emitter, command, &formatter).await
        }
    }
}

/// Runs a cluster-facing command.
async fn cmd_swarm(
    emitter: &SwarmEmitter<'_>,
    command: &Commands,
    formatter: &OutputFormatter,
) -> Result<()> {
    match command {
        Commands::Up { .. } => {
            let summary = emitter.up().await?;
            eprint!("{}", formatter.format_up(&summary));
        }
        Commands::Start { .. } => {
            emitter.start().await?;
            eprint!("{}", formatter.format_done(command.name()));
        }
        Commands::Stop { .. } => {
            emitter.stop().await?;
            eprint!("{}", formatter.format_done(command.name()));
        }
        Commands::Rm { .. } => {
            emitter.rm().await?;
            eprint!("{}", formatter.format_done(command.name()));
        }
        Commands::Pull { .. } => {
            let report = emitter.pull().await?;
            eprint!("{}", formatter.format_pull(&report));
            report.ensure_success()?;
        }
        Commands::Convert { .. } | Commands::Config { .. } => {}
    }
    Ok(())
}

/// Writes command output to stdout.
fn write_stdout(content: &str) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(content.as_bytes())?;
    stdout.flush()?;
    Ok(())
}
