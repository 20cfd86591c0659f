//! Local scratch directories.
//!
//! Each job owns two files: the downloaded source under the intake directory
//! and the rendition under the output directory. [`ScratchFiles`] removes
//! both when the job ends, whichever way it ends.

use std::io;
use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, warn};
use vproc_models::IngestJob;

/// The intake and output directories shared by all jobs.
#[derive(Debug, Clone)]
pub struct ScratchDirs {
    intake: PathBuf,
    output: PathBuf,
}

impl ScratchDirs {
    pub fn new(intake: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            intake: intake.into(),
            output: output.into(),
        }
    }

    /// Create both directories if they do not exist yet.
    pub async fn ensure(&self) -> io::Result<()> {
        fs::create_dir_all(&self.intake).await?;
        fs::create_dir_all(&self.output).await?;
        debug!(
            "Scratch directories ready: {}, {}",
            self.intake.display(),
            self.output.display()
        );
        Ok(())
    }

    pub fn intake_dir(&self) -> &Path {
        &self.intake
    }

    pub fn output_dir(&self) -> &Path {
        &self.output
    }

    pub fn intake_path(&self, name: &str) -> PathBuf {
        self.intake.join(name)
    }

    pub fn output_path(&self, name: &str) -> PathBuf {
        self.output.join(name)
    }

    /// Scratch files for one job, removed when the returned guard is released.
    pub fn files_for(&self, job: &IngestJob) -> ScratchFiles {
        ScratchFiles {
            intake: self.intake_path(&job.source_name),
            output: self.output_path(&job.output_name),
            released: false,
        }
    }
}

/// Delete a file. A file that is already gone is `Ok(false)`.
pub async fn remove_if_exists(path: &Path) -> io::Result<bool> {
    match fs::remove_file(path).await {
        Ok(()) => {
            debug!("Deleted {}", path.display());
            Ok(true)
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!("{} already absent", path.display());
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

/// Both scratch files of one job.
///
/// Call [`ScratchFiles::release`] on the way out. If the guard is dropped
/// without being released (the job future was cancelled, or panicked) the
/// files are removed synchronously from `Drop`.
#[derive(Debug)]
#[must_use = "scratch files are only removed by release() or drop"]
pub struct ScratchFiles {
    intake: PathBuf,
    output: PathBuf,
    released: bool,
}

impl ScratchFiles {
    /// Where the source is downloaded to.
    pub fn intake(&self) -> &Path {
        &self.intake
    }

    /// Where the rendition is written to.
    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Delete both files.
    ///
    /// Both deletions are attempted even if the first fails; the first
    /// failure is returned.
    pub async fn release(mut self) -> io::Result<()> {
        self.released = true;
        let intake = remove_if_exists(&self.intake).await;
        let output = remove_if_exists(&self.output).await;
        intake.and(output).map(|_| ())
    }
}

impl Drop for ScratchFiles {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        for path in [&self.intake, &self.output] {
            match std::fs::remove_file(path) {
                Ok(()) => debug!("Deleted abandoned scratch file {}", path.display()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to delete abandoned scratch file {}: {}", path.display(), e),
            }
        }
    }
}
