use crate::day::HourJob;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};

/// Private working directory for one hour job.
///
/// Removed by [`ScratchArea::close`]; if that is never reached (panic,
/// cancellation) the directory goes away when the value is dropped.
#[derive(Debug)]
pub struct ScratchArea {
    dir: TempDir,
}

impl ScratchArea {
    pub async fn create(root: Option<&Path>, job: &HourJob) -> io::Result<Self> {
        let prefix = format!(
            "cflc-{}-{}-{:02}-",
            job.distribution_id, job.date, job.hour
        );
        let root = root.map(Path::to_path_buf);

        let dir = tokio::task::spawn_blocking(move || {
            let mut builder = tempfile::Builder::new();
            builder.prefix(&prefix);
            match root {
                Some(root) => builder.tempdir_in(root),
                None => builder.tempdir(),
            }
        })
        .await
        .map_err(io::Error::other)??;

        debug!(path = %dir.path().display(), "Created scratch area");
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Remove the directory. Failures are logged and otherwise ignored.
    pub async fn close(self) {
        let path = self.dir.path().to_path_buf();
        let result = tokio::task::spawn_blocking(move || self.dir.close()).await;

        match result {
            Ok(Ok(())) => debug!(path = %path.display(), "Removed scratch area"),
            Ok(Err(e)) => warn!(path = %path.display(), error = %e, "Failed to remove scratch area"),
            Err(e) => warn!(path = %path.display(), error = %e, "Scratch cleanup task failed"),
        }
    }
}
