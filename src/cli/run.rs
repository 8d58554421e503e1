use super::args::Overrides;
use crate::config::parse::{read_config, validate_config, ConfigError};
use crate::config::types::Config;
use crate::pipeline::{process_logs, RunSummary, Runner};
use crate::probe::ProbeOutcome;
use crate::store::{ObjectStore, S3Store};
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Load the config file (if any), layer the command-line overrides on top
/// and validate the result.
pub fn build_config(config_path: Option<&Path>, overrides: &Overrides) -> Result<Config, ConfigError> {
    let mut config = match config_path {
        Some(path) => {
            info!(config_path = %path.display(), "Loading configuration");
            read_config(path)?
        }
        None => Config::for_bucket(""),
    };

    overrides.apply(&mut config);
    validate_config(&config)?;
    Ok(config)
}

async fn connect(config: &Config) -> Arc<dyn ObjectStore> {
    info!(bucket = %config.bucket, "Connecting to S3");
    Arc::new(S3Store::connect(&config.bucket, &config.s3).await)
}

pub async fn run(
    config_path: Option<PathBuf>,
    overrides: &Overrides,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = build_config(config_path.as_deref(), overrides)?;
    let store = connect(&config).await;

    let summary = process_logs(&config, store).await?;
    print_summary(&summary);
    Ok(())
}

/// Report the next eligible day per distribution without changing anything.
pub async fn probe(
    config_path: Option<PathBuf>,
    overrides: &Overrides,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = build_config(config_path.as_deref(), overrides)?;
    let store = connect(&config).await;

    let runner = Runner::from_config(&config, store, Utc::now());
    for (distribution, outcome) in runner.probe_all().await? {
        match outcome {
            ProbeOutcome::Found(batch) => println!(
                "{}: next eligible day {} starting at hour {:02}",
                distribution, batch, batch.start_hour
            ),
            ProbeOutcome::Exhausted => println!("{}: nothing eligible", distribution),
        }
    }
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!("Distributions: {}", summary.distributions);
    println!("Days processed: {}", summary.days);
    println!(
        "Hours archived: {} ({} empty)",
        summary.hours_archived, summary.hours_empty
    );
    println!("Fragments removed: {}", summary.fragments_deleted);
    println!("Archive bytes written: {}", summary.archive_bytes);
}
