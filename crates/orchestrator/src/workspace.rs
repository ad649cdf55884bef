//! The run's working directory, held as state instead of a process-wide cwd.

use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::info;

use crate::error::{OrchestratorError, Result};

/// Shared handle to the current source tree. Clones observe moves made
/// through any other clone.
#[derive(Debug, Clone)]
pub struct Workspace {
    dir: Arc<RwLock<PathBuf>>,
}

impl Workspace {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Arc::new(RwLock::new(dir.into())),
        }
    }

    pub fn dir(&self) -> PathBuf {
        self.dir
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn join(&self, path: impl AsRef<Path>) -> PathBuf {
        self.dir().join(path)
    }

    /// Move into `dir`; relative paths resolve against the current directory.
    pub fn enter(&self, dir: impl AsRef<Path>) {
        let mut current = self.dir.write().unwrap_or_else(PoisonError::into_inner);
        let next = current.join(dir);
        info!(from = %current.display(), to = %next.display(), "Changing working directory");
        *current = next;
    }

    /// Reject trees that are not a kubernetes checkout. `kubernetes_skew`
    /// passes as well.
    pub fn validate(&self) -> Result<()> {
        let dir = self.dir();
        let absolute = if dir.is_absolute() {
            dir
        } else {
            std::env::current_dir()?.join(dir)
        };

        let looks_right = absolute
            .file_name()
            .map(|name| name.to_string_lossy().contains("kubernetes"))
            .unwrap_or(false);
        if !looks_right {
            return Err(OrchestratorError::InvalidWorkingDirectory(format!(
                "must run from kubernetes directory root: {}",
                absolute.display()
            )));
        }
        Ok(())
    }
}
