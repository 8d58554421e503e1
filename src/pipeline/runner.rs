use crate::compactor::{CompactorSettings, HourCompactor, HourProcessor};
use crate::config::parse::{validate_config, ConfigError};
use crate::config::types::Config;
use crate::day::{DayError, DayOrchestrator, DayReport};
use crate::fragment::{EligibilityWindow, LogDate};
use crate::probe::{probe, ProbeError, ProbeOutcome};
use crate::store::ObjectStore;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

/// Label used in logs and summaries when no distribution ids are configured.
pub const ALL_DISTRIBUTIONS: &str = "*";

#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("distribution {distribution}: {source}")]
    Probe {
        distribution: String,
        #[source]
        source: ProbeError,
    },

    #[error("distribution {distribution}: {source}")]
    Day {
        distribution: String,
        #[source]
        source: DayError,
    },

    #[error("{day} from hour {hour:02} came back from the probe after being processed; fragments are not being removed")]
    NoProgress { day: String, hour: u32 },
}

/// Totals for a whole run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub distributions: usize,
    pub days: usize,
    pub hours_archived: usize,
    pub hours_empty: usize,
    pub fragments_deleted: usize,
    pub archive_bytes: u64,
    pub failed_distributions: Vec<String>,
}

impl RunSummary {
    fn record_day(&mut self, day: &DayReport) {
        self.days += 1;
        self.hours_archived += day.hours_archived;
        self.hours_empty += day.hours_empty;
        self.fragments_deleted += day.fragments_deleted;
        self.archive_bytes += day.archive_bytes;
    }
}

/// Settings the distribution loop needs, resolved from config.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub prefix: String,
    pub distribution_ids: Vec<String>,
    pub window: EligibilityWindow,
    pub max_workers: usize,
    pub continue_on_error: bool,
}

impl RunSettings {
    pub fn from_config(config: &Config, now: DateTime<Utc>) -> Self {
        Self {
            prefix: config.normalized_prefix(),
            distribution_ids: config.distribution_ids.clone(),
            window: config.eligibility_window(now),
            max_workers: config.effective_max_workers(),
            continue_on_error: config.continue_on_error,
        }
    }
}

/// Drives probe and day orchestration across distributions, one at a time.
pub struct Runner {
    store: Arc<dyn ObjectStore>,
    orchestrator: DayOrchestrator,
    settings: RunSettings,
}

impl Runner {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        processor: Arc<dyn HourProcessor>,
        settings: RunSettings,
    ) -> Self {
        Self {
            store,
            orchestrator: DayOrchestrator::new(processor, settings.max_workers),
            settings,
        }
    }

    /// Runner wired to a real [`HourCompactor`] over `store`.
    pub fn from_config(config: &Config, store: Arc<dyn ObjectStore>, now: DateTime<Utc>) -> Self {
        let compactor = HourCompactor::new(
            store.clone(),
            CompactorSettings {
                download_concurrency: config.download_concurrency,
                scratch_root: config.scratch_dir.clone(),
            },
        );
        Self::new(store, Arc::new(compactor), RunSettings::from_config(config, now))
    }

    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    fn targets(&self) -> Vec<Option<&str>> {
        if self.settings.distribution_ids.is_empty() {
            vec![None]
        } else {
            self.settings
                .distribution_ids
                .iter()
                .map(|id| Some(id.as_str()))
                .collect()
        }
    }

    /// Listing prefix for one distribution, or the whole prefix for `None`.
    pub fn search_prefix(&self, distribution_id: Option<&str>) -> String {
        match distribution_id {
            // The trailing dot stops `E1` from also matching `E12`
            Some(id) => format!("{}{}.", self.settings.prefix, id),
            None => self.settings.prefix.clone(),
        }
    }

    /// Process every configured distribution in series.
    ///
    /// Without `continue_on_error` the first failure ends the run. With it,
    /// remaining distributions still run and the first failure is returned
    /// at the end.
    pub async fn run(&self) -> Result<RunSummary, RunError> {
        let mut summary = RunSummary::default();
        let mut first_error: Option<RunError> = None;

        for target in self.targets() {
            let label = target.unwrap_or(ALL_DISTRIBUTIONS).to_string();
            summary.distributions += 1;

            if let Err(e) = self.run_distribution(target, &mut summary).await {
                error!(distribution = %label, error = %e, "Distribution failed");
                summary.failed_distributions.push(label);

                if !self.settings.continue_on_error {
                    return Err(e);
                }
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }

        if let Some(e) = first_error {
            warn!(
                failed = summary.failed_distributions.len(),
                "Completed with errors"
            );
            return Err(e);
        }

        info!(
            distributions = summary.distributions,
            days = summary.days,
            hours = summary.hours_archived,
            fragments = summary.fragments_deleted,
            bytes = summary.archive_bytes,
            "Completed without error"
        );
        Ok(summary)
    }

    /// Probe and process days for one distribution until nothing eligible is left.
    pub async fn run_distribution(
        &self,
        distribution_id: Option<&str>,
        summary: &mut RunSummary,
    ) -> Result<(), RunError> {
        let label = distribution_id.unwrap_or(ALL_DISTRIBUTIONS);
        let prefix = self.search_prefix(distribution_id);
        let mut last_position: Option<(String, LogDate, u32)> = None;

        info!(distribution = %label, prefix = %prefix, "Searching for records");

        loop {
            let outcome = probe(self.store.as_ref(), &prefix, &self.settings.window)
                .await
                .map_err(|source| RunError::Probe {
                    distribution: label.to_string(),
                    source,
                })?;

            let mut batch = match outcome {
                ProbeOutcome::Found(batch) => batch,
                ProbeOutcome::Exhausted => {
                    info!(distribution = %label, "No eligible records remain");
                    return Ok(());
                }
            };

            let position = batch.position();
            if last_position.as_ref() == Some(&position) {
                return Err(RunError::NoProgress {
                    day: batch.to_string(),
                    hour: batch.start_hour,
                });
            }

            let report = self
                .orchestrator
                .run(&mut batch)
                .await
                .map_err(|source| RunError::Day {
                    distribution: label.to_string(),
                    source,
                })?;

            summary.record_day(&report);
            last_position = Some(position);
        }
    }

    /// Find the next eligible day for every configured distribution without
    /// changing anything in the store.
    pub async fn probe_all(&self) -> Result<Vec<(String, ProbeOutcome)>, RunError> {
        let mut results = Vec::new();

        for target in self.targets() {
            let label = target.unwrap_or(ALL_DISTRIBUTIONS).to_string();
            let prefix = self.search_prefix(target);
            let outcome = probe(self.store.as_ref(), &prefix, &self.settings.window)
                .await
                .map_err(|source| RunError::Probe {
                    distribution: label.clone(),
                    source,
                })?;
            results.push((label, outcome));
        }

        Ok(results)
    }
}

/// Validate `config` and run the whole pipeline against `store`.
pub async fn process_logs(
    config: &Config,
    store: Arc<dyn ObjectStore>,
) -> Result<RunSummary, RunError> {
    validate_config(config)?;
    Runner::from_config(config, store, Utc::now()).run().await
}
