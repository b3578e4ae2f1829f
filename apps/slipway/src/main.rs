//! slipway command-line entry point.

mod app;
mod config;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use slipway_protocol::ProjectId;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "slipway", version, about = "Build a project, publish its output, replay its logs")]
struct Cli {
    /// Configuration file (defaults to ~/.config/slipway/slipway.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Build the project in DIR and publish its output.
    Deploy {
        dir: PathBuf,

        #[arg(long, value_parser = parse_project)]
        project: ProjectId,

        /// Simulate uploads even when credentials are configured.
        #[arg(long)]
        dry_run: bool,

        /// Maximum uploads in flight.
        #[arg(long)]
        concurrency: Option<usize>,
    },

    /// Print archived events of a project.
    Logs {
        #[arg(value_parser = parse_project)]
        project: ProjectId,

        /// Print every archived run, not only the latest.
        #[arg(long)]
        all: bool,
    },

    /// Print the status of a project's latest run.
    Status {
        #[arg(value_parser = parse_project)]
        project: ProjectId,
    },
}

fn parse_project(s: &str) -> Result<ProjectId, String> {
    ProjectId::new(s).map_err(|e| e.to_string())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Events go to stdout; diagnostics go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = config::Config::load(cli.config.as_deref())?;
    tracing::debug!(archive_dir = %config.archive_dir.display(), "configuration loaded");

    let rt = tokio::runtime::Runtime::new()?;
    match cli.command {
        Command::Deploy {
            dir,
            project,
            dry_run,
            concurrency,
        } => {
            if dry_run {
                config.storage.dry_run = Some(true);
            }
            if let Some(concurrency) = concurrency {
                config.storage.upload_concurrency = concurrency;
            }
            rt.block_on(app::deploy(&config, &dir, &project))
        }
        Command::Logs { project, all } => app::logs(&config, &project, all),
        Command::Status { project } => app::status(&config, &project),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_is_well_formed() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_deploy() {
        let cli = Cli::try_parse_from([
            "slipway", "deploy", "./site", "--project", "demo1", "--dry-run",
        ])
        .unwrap();
        match cli.command {
            Command::Deploy {
                dir,
                project,
                dry_run,
                concurrency,
            } => {
                assert_eq!(dir, PathBuf::from("./site"));
                assert_eq!(project.as_str(), "demo1");
                assert!(dry_run);
                assert_eq!(concurrency, None);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn rejects_invalid_project() {
        assert!(Cli::try_parse_from(["slipway", "status", "../etc"]).is_err());
    }

    #[test]
    fn parses_logs_all() {
        let cli = Cli::try_parse_from(["slipway", "logs", "demo", "--all"]).unwrap();
        assert!(matches!(cli.command, Command::Logs { all: true, .. }));
    }
}
