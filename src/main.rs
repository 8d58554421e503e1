use cf_log_compactor::cli::Overrides;
use cf_log_compactor::config::resolve_config_path;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "cf-log-compactor")]
#[command(about = "Compacts CloudFront access log fragments into hourly archives", long_about = None)]
struct Cli {
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(flatten)]
    overrides: Overrides,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Compact every eligible hour (the default)
    Run,
    /// Show the next eligible day per distribution without changing anything
    Probe,
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    Init {
        #[arg(long)]
        stdout: bool,
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },
    Validate,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing subscriber
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cf_log_compactor=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let config_path = resolve_config_path(cli.config.as_deref());

    match cli.command {
        Some(Commands::Run) | None => {
            cf_log_compactor::cli::run::run(config_path, &cli.overrides).await?;
        }
        Some(Commands::Probe) => {
            cf_log_compactor::cli::run::probe(config_path, &cli.overrides).await?;
        }
        Some(Commands::Config { action }) => match action {
            ConfigAction::Init { stdout, force } => {
                cf_log_compactor::cli::config::init(stdout, force)?;
            }
            ConfigAction::Validate => {
                cf_log_compactor::cli::config::validate(config_path)?;
            }
        },
    }

    Ok(())
}
