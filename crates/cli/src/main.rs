use std::path::Path;

use clap::Parser;
use rollcall_core::config::RollcallConfig;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(
    name = "rollcall",
    about = "Mirror SIS class rosters into Microsoft Teams classes and groups",
    version
)]
struct Cli {
    /// Path to configuration file
    #[arg(long, default_value = "rollcall.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init {
        /// Where to write the configuration (defaults to --config)
        #[arg(long)]
        path: Option<String>,
    },
    /// Reconcile classes, teachers, students and groups once
    Sync {
        /// Compute and log changes without sending them
        #[arg(long)]
        dry_run: bool,
        /// Log request payloads and per-member decisions
        #[arg(long)]
        debug: bool,
        /// Query the roster database for sections
        #[arg(long, conflicts_with = "use_snapshot")]
        refresh_sections: bool,
        /// Read sections from the snapshot written by the last query
        #[arg(long)]
        use_snapshot: bool,
        /// Ignore the identity cache and look everyone up again
        #[arg(long)]
        clear_identity_cache: bool,
    },
    /// Show identity cache, snapshot and anomaly statistics
    Status,
}

impl Cli {
    fn debug_logging(&self) -> bool {
        match &self.command {
            Commands::Sync { debug: true, .. } => true,
            Commands::Sync { .. } => RollcallConfig::load(Path::new(&self.config))
                .map(|c| c.sync.debug)
                .unwrap_or(false),
            _ => false,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.debug_logging() { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    match cli.command {
        Commands::Init { path } => {
            commands::init::run(path.as_deref().unwrap_or(&cli.config))?;
        }
        Commands::Sync {
            dry_run,
            debug,
            refresh_sections,
            use_snapshot,
            clear_identity_cache,
        } => {
            let overrides = commands::sync::Overrides {
                dry_run,
                debug,
                refresh_sections: match (refresh_sections, use_snapshot) {
                    (true, _) => Some(true),
                    (_, true) => Some(false),
                    _ => None,
                },
                clear_identity_cache,
            };
            commands::sync::run(&cli.config, overrides).await?;
        }
        Commands::Status => {
            commands::status::run(&cli.config)?;
        }
    }

    Ok(())
}
