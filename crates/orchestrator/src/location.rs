//! Destinations for saved state and published versions: a `gs://` object
//! prefix or a local directory.

use deployer::{CommandRunner, CommandSpec};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::Result;

const GCS_SCHEME: &str = "gs://";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    Gcs(String),
    Local(PathBuf),
}

impl Location {
    pub fn parse(location: &str) -> Self {
        if location.starts_with(GCS_SCHEME) {
            Self::Gcs(location.trim_end_matches('/').to_string())
        } else {
            Self::Local(PathBuf::from(location))
        }
    }

    pub fn join(&self, name: &str) -> Self {
        match self {
            Self::Gcs(prefix) => Self::Gcs(format!("{prefix}/{name}")),
            Self::Local(dir) => Self::Local(dir.join(name)),
        }
    }

    /// Copy the local file `src` to this location.
    pub async fn upload(&self, runner: &dyn CommandRunner, src: &Path) -> Result<()> {
        debug!(src = %src.display(), dest = %self, "Uploading");
        match self {
            Self::Gcs(object) => {
                let spec = CommandSpec::new("gsutil")
                    .arg("cp")
                    .arg(src.display().to_string())
                    .arg(object.as_str());
                runner.run(&spec).await?;
            }
            Self::Local(dest) => {
                if let Some(parent) = dest.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                tokio::fs::copy(src, dest).await?;
            }
        }
        Ok(())
    }

    /// Copy this location to the local file `dest`.
    pub async fn download(&self, runner: &dyn CommandRunner, dest: &Path) -> Result<()> {
        debug!(src = %self, dest = %dest.display(), "Downloading");
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        match self {
            Self::Gcs(object) => {
                let spec = CommandSpec::new("gsutil")
                    .arg("cp")
                    .arg(object.as_str())
                    .arg(dest.display().to_string());
                runner.run(&spec).await?;
            }
            Self::Local(src) => {
                tokio::fs::copy(src, dest).await?;
            }
        }
        Ok(())
    }

    pub async fn read_to_string(&self, runner: &dyn CommandRunner) -> Result<String> {
        match self {
            Self::Gcs(object) => {
                let spec = CommandSpec::new("gsutil").arg("cat").arg(object.as_str());
                Ok(runner.output(&spec).await?)
            }
            Self::Local(path) => Ok(tokio::fs::read_to_string(path).await?),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gcs(object) => f.write_str(object),
            Self::Local(path) => write!(f, "{}", path.display()),
        }
    }
}
