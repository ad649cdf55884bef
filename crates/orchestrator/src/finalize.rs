//! Exactly-once reporting at the end of a run.
//!
//! Both the main flow and the teardown watcher may try to finalise. The
//! first caller writes while holding the lock; a second caller waits for
//! that write and then returns without writing. A write that is cancelled
//! part way leaves the run unfinalised for the next caller.
//! [`FinalizeGuard`] covers exits that skip the explicit call, such as a
//! panic unwinding through the phase sequence.

use chrono::{DateTime, Utc};
use deployer::CommandRunner;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::metadata::{find_version, read_version_file, RunMetadata, UNKNOWN_VERSION};
use crate::report::ResultRecorder;
use crate::workspace::Workspace;

pub struct RunFinalizer {
    dump: Option<PathBuf>,
    recorder: ResultRecorder,
    runner: Arc<dyn CommandRunner>,
    workspace: Workspace,
    metadata_env: Vec<(String, String)>,
    started_at: DateTime<Utc>,
    started: Instant,
    done: Mutex<bool>,
}

impl RunFinalizer {
    pub fn new(
        dump: Option<PathBuf>,
        recorder: ResultRecorder,
        runner: Arc<dyn CommandRunner>,
        workspace: Workspace,
        metadata_env: Vec<(String, String)>,
    ) -> Self {
        Self {
            dump,
            recorder,
            runner,
            workspace,
            metadata_env,
            started_at: Utc::now(),
            started: Instant::now(),
            done: Mutex::new(false),
        }
    }

    /// `false` while a write is still in progress.
    pub fn is_finalized(&self) -> bool {
        self.done.try_lock().map(|done| *done).unwrap_or(false)
    }

    /// Write metadata and the report. Returns `false` when an earlier call
    /// already did.
    pub async fn finalize(&self) -> Result<bool> {
        let mut done = self.done.lock().await;
        if *done {
            debug!("Run already finalized");
            return Ok(false);
        }
        let Some(dump) = &self.dump else {
            debug!("No dump directory, skipping report");
            *done = true;
            return Ok(true);
        };

        let version = find_version(self.runner.as_ref(), &self.workspace.dir()).await;
        let written = self.write(dump, &version);
        *done = true;
        written.map(|()| true)
    }

    /// Synchronous variant for contexts that cannot await. The version is
    /// only taken from the `version` file. Gives up when another caller is
    /// mid-write, since it cannot wait for it.
    pub fn finalize_blocking(&self) -> Result<bool> {
        let Ok(mut done) = self.done.try_lock() else {
            warn!("Report is being written elsewhere, not waiting for it");
            return Ok(false);
        };
        if *done {
            return Ok(false);
        }
        let Some(dump) = &self.dump else {
            *done = true;
            return Ok(true);
        };

        let version = read_version_file(&self.workspace.dir())
            .unwrap_or_else(|| UNKNOWN_VERSION.to_string());
        let written = self.write(dump, &version);
        *done = true;
        written.map(|()| true)
    }

    fn write(&self, dump: &Path, version: &str) -> Result<()> {
        // Metadata first so a report failure still leaves it behind.
        let metadata = RunMetadata::new(version, &self.metadata_env).write(dump);
        let report = self
            .recorder
            .suite(self.started_at, self.started.elapsed())
            .write(dump);
        info!(
            dump = %dump.display(),
            tests = self.recorder.len(),
            failures = self.recorder.failures(),
            "Run finalized"
        );
        metadata?;
        report?;
        Ok(())
    }
}

/// Finalises on drop unless the run was already finalised.
pub struct FinalizeGuard {
    finalizer: Arc<RunFinalizer>,
}

impl FinalizeGuard {
    pub fn new(finalizer: Arc<RunFinalizer>) -> Self {
        Self { finalizer }
    }
}

impl Drop for FinalizeGuard {
    fn drop(&mut self) {
        if self.finalizer.is_finalized() {
            return;
        }
        warn!("Run ended without finalizing, writing report from guard");
        if let Err(e) = self.finalizer.finalize_blocking() {
            error!(error = %e, "Failed to finalize run");
        }
    }
}
