//! Compaction of one distribution-hour: list its fragments, pull them into a
//! scratch area, rebuild a single cleaned archive, store it, then delete the
//! fragments it replaces.

pub mod scratch;
pub mod stages;

pub use scratch::ScratchArea;
pub use stages::{FilterStats, Stage, StageError, ARCHIVE_HEADER};

use crate::day::HourJob;
use crate::store::ObjectStore;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info};

#[derive(Debug, Error)]
#[error("hour {job} failed at {stage}: {source}")]
pub struct CompactError {
    pub job: HourJob,
    pub stage: Stage,
    #[source]
    pub source: StageError,
}

impl CompactError {
    fn new(job: &HourJob, stage: Stage, source: impl Into<StageError>) -> Self {
        Self {
            job: job.clone(),
            stage,
            source: source.into(),
        }
    }
}

/// What happened to one hour.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HourReport {
    pub job: HourJob,
    pub fragments: usize,
    pub bytes_downloaded: u64,
    pub lines_kept: u64,
    pub archive_bytes: u64,
    /// Key written, or `None` when the hour had no fragments.
    pub archive_key: Option<String>,
}

impl HourReport {
    fn empty(job: HourJob) -> Self {
        Self {
            job,
            fragments: 0,
            bytes_downloaded: 0,
            lines_kept: 0,
            archive_bytes: 0,
            archive_key: None,
        }
    }

    pub fn archived(&self) -> bool {
        self.archive_key.is_some()
    }
}

/// Something that can turn an hour job into an archive.
#[async_trait]
pub trait HourProcessor: Send + Sync {
    async fn process(&self, job: HourJob) -> Result<HourReport, CompactError>;
}

#[derive(Debug, Clone)]
pub struct CompactorSettings {
    pub download_concurrency: usize,
    pub scratch_root: Option<PathBuf>,
}

impl Default for CompactorSettings {
    fn default() -> Self {
        Self {
            download_concurrency: 6,
            scratch_root: None,
        }
    }
}

pub struct HourCompactor {
    store: Arc<dyn ObjectStore>,
    settings: CompactorSettings,
}

impl HourCompactor {
    pub fn new(store: Arc<dyn ObjectStore>, settings: CompactorSettings) -> Self {
        Self { store, settings }
    }

    async fn run_stages(
        &self,
        job: &HourJob,
        keys: &[String],
        scratch: &ScratchArea,
    ) -> Result<HourReport, CompactError> {
        let store = self.store.as_ref();

        debug!(job = %job, count = keys.len(), "Downloading fragments");
        let (parts, bytes_downloaded) = stages::download_fragments(
            store,
            keys,
            &scratch.file("fragments"),
            self.settings.download_concurrency,
        )
        .await
        .map_err(|e| CompactError::new(job, Stage::Download, e))?;

        debug!(job = %job, count = parts.len(), "Joining fragments");
        let joined = scratch.file("joined.gz");
        stages::concatenate(&parts, &joined)
            .await
            .map_err(|e| CompactError::new(job, Stage::Concatenate, e))?;

        debug!(job = %job, "Decompressing");
        let plain = scratch.file("joined.log");
        stages::decompress(&joined, &plain)
            .await
            .map_err(|e| CompactError::new(job, Stage::Decompress, e))?;

        debug!(job = %job, "Filtering comment lines");
        let cleaned = scratch.file("cleaned.log");
        let stats = stages::filter_lines(&plain, &cleaned)
            .await
            .map_err(|e| CompactError::new(job, Stage::Filter, e))?;

        debug!(job = %job, kept = stats.kept, dropped = stats.dropped, "Recompressing");
        let archive = scratch.file("archive.gz");
        let archive_bytes = stages::recompress(&cleaned, &archive)
            .await
            .map_err(|e| CompactError::new(job, Stage::Recompress, e))?;

        let archive_key = job.archive_key();
        debug!(job = %job, key = %archive_key, bytes = archive_bytes, "Uploading archive");
        store
            .upload(&archive_key, &archive)
            .await
            .map_err(|e| CompactError::new(job, Stage::Upload, e))?;

        // Sources only go once the archive is safely written
        debug!(job = %job, count = keys.len(), "Deleting source fragments");
        store
            .delete_many(keys)
            .await
            .map_err(|e| CompactError::new(job, Stage::DeleteSource, e))?;

        Ok(HourReport {
            job: job.clone(),
            fragments: keys.len(),
            bytes_downloaded,
            lines_kept: stats.kept,
            archive_bytes,
            archive_key: Some(archive_key),
        })
    }
}

#[async_trait]
impl HourProcessor for HourCompactor {
    async fn process(&self, job: HourJob) -> Result<HourReport, CompactError> {
        let prefix = job.fragment_prefix();
        let keys = stages::list_fragments(self.store.as_ref(), &prefix)
            .await
            .map_err(|e| CompactError::new(&job, Stage::List, e))?;

        if keys.is_empty() {
            debug!(job = %job, "No fragments for hour, nothing to do");
            return Ok(HourReport::empty(job));
        }

        let scratch = ScratchArea::create(self.settings.scratch_root.as_deref(), &job)
            .await
            .map_err(|e| CompactError::new(&job, Stage::Download, e))?;

        let result = self.run_stages(&job, &keys, &scratch).await;
        scratch.close().await;

        match &result {
            Ok(report) => info!(
                job = %job,
                fragments = report.fragments,
                lines = report.lines_kept,
                bytes = report.archive_bytes,
                "Archived hour"
            ),
            Err(e) => error!(job = %job, stage = %e.stage, error = %e.source, "Hour failed"),
        }

        result
    }
}
