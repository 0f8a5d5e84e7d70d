//! # svp-cli
//!
//! Command-line interface for the SVP pre-execution gate.
//!
//! - `svp audit` — audit one intent, exit 0 when VERIFIED and 2 when BLOCKED
//! - `svp batch` — audit JSON-lines requests from a file or stdin
//! - `svp catalog check/show` — validate and inspect the invariant catalog
//! - `svp log verify/tail` — inspect the hash-chained verdict log

mod commands;
mod config;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::config::SvpConfig;

/// SVP — audit agent intents against domain invariants before execution.
#[derive(Parser)]
#[command(name = "svp", version, about)]
struct Cli {
    /// Project root directory (defaults to current directory).
    #[arg(long, default_value = ".")]
    project_root: PathBuf,

    /// Config file (defaults to <project-root>/.svp/svp.toml).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Audit a single intent.
    Audit(commands::audit::AuditArgs),
    /// Audit JSON-lines requests, one verdict per line.
    Batch {
        /// Input file; stdin when absent or "-".
        #[arg(long)]
        input: Option<PathBuf>,
    },
    /// Validate and inspect the invariant catalog.
    Catalog {
        #[command(subcommand)]
        command: commands::catalog::CatalogCommands,
    },
    /// Inspect the verdict log.
    Log {
        #[command(subcommand)]
        command: commands::log::LogCommands,
    },
}

/// Shared state handed to every subcommand.
pub struct Context {
    pub project_root: PathBuf,
    pub config: SvpConfig,
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.log_json)?;

    let config = SvpConfig::load_for_project(&cli.project_root, cli.config.as_deref())?;
    let ctx = Context {
        project_root: cli.project_root,
        config,
    };

    match &cli.command {
        Commands::Audit(args) => commands::audit::execute(args, &ctx),
        Commands::Batch { input } => commands::batch::execute(input.as_deref(), &ctx),
        Commands::Catalog { command } => commands::catalog::execute(command, &ctx),
        Commands::Log { command } => commands::log::execute(command, &ctx),
    }
}

// Logs go to stderr so stdout stays machine-readable.
fn init_tracing(json: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::from_default_env()
        .add_directive("svp_policy=info".parse()?)
        .add_directive("svp_audit=info".parse()?)
        .add_directive("svp=info".parse()?);

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}
