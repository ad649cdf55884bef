//! Process environment captured once at startup.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::Result;

pub const METADATA_ENV_PREFIX: &str = "BUILD_METADATA_";
const ARTIFACTS_DIR: &str = "_artifacts";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunEnvironment {
    /// `KUBERNETES_PROVIDER`
    pub provider: Option<String>,
    /// `PROJECT`
    pub project: Option<String>,
    /// `GOOGLE_APPLICATION_CREDENTIALS`
    pub credentials: Option<PathBuf>,
    /// `PRIORITY_PATH`, prepended to the PATH of every later command
    pub priority_path: Option<PathBuf>,
    pub kubeconfig: PathBuf,
    pub home: Option<PathBuf>,
    /// Directory the run was started from
    pub start_dir: PathBuf,
    /// Every `BUILD_METADATA_*` variable, sorted by name
    pub metadata: Vec<(String, String)>,
}

impl RunEnvironment {
    /// Snapshot the current process environment.
    pub fn capture() -> Result<Self> {
        let start_dir = std::env::current_dir()?;
        Ok(Self::from_vars(std::env::vars(), start_dir))
    }

    /// Build a snapshot from explicit variables. Empty values count as unset.
    pub fn from_vars<I, K, V>(vars: I, start_dir: impl Into<PathBuf>) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars: HashMap<String, String> = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .filter(|(_, v)| !v.is_empty())
            .collect();
        let start_dir = start_dir.into();

        let home = vars.get("HOME").map(PathBuf::from);
        let kubeconfig = match (vars.get("KUBECONFIG"), &home) {
            (Some(path), _) => PathBuf::from(path),
            (None, Some(home)) => home.join(".kube").join("config"),
            (None, None) => start_dir.join(".kube").join("config"),
        };

        let mut metadata: Vec<(String, String)> = vars
            .iter()
            .filter(|(k, _)| k.starts_with(METADATA_ENV_PREFIX))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        metadata.sort();

        Self {
            provider: vars.get("KUBERNETES_PROVIDER").cloned(),
            project: vars.get("PROJECT").cloned(),
            credentials: vars.get("GOOGLE_APPLICATION_CREDENTIALS").map(PathBuf::from),
            priority_path: vars.get("PRIORITY_PATH").map(PathBuf::from),
            kubeconfig,
            home,
            start_dir,
            metadata,
        }
    }

    pub fn artifacts_dir(&self) -> PathBuf {
        self.start_dir.join(ARTIFACTS_DIR)
    }

    /// Resolve `parts` under the home directory, or under the start
    /// directory when `HOME` is unset.
    pub fn home_path(&self, parts: &[&str]) -> PathBuf {
        let base: &Path = self.home.as_deref().unwrap_or(&self.start_dir);
        parts.iter().fold(base.to_path_buf(), |path, part| path.join(part))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_vars() {
        let env = RunEnvironment::from_vars(
            [
                ("KUBERNETES_PROVIDER", "gce"),
                ("PROJECT", "e2e-project"),
                ("HOME", "/home/runner"),
                ("PRIORITY_PATH", ""),
                ("BUILD_METADATA_REPO", "k8s.io/kubernetes"),
                ("BUILD_METADATA_COMMIT", "abc123"),
                ("PATH", "/usr/bin"),
            ],
            "/src/kubernetes",
        );

        assert_eq!(env.provider.as_deref(), Some("gce"));
        assert_eq!(env.project.as_deref(), Some("e2e-project"));
        assert_eq!(env.priority_path, None);
        assert_eq!(env.kubeconfig, PathBuf::from("/home/runner/.kube/config"));
        assert_eq!(
            env.metadata,
            vec![
                ("BUILD_METADATA_COMMIT".to_string(), "abc123".to_string()),
                ("BUILD_METADATA_REPO".to_string(), "k8s.io/kubernetes".to_string()),
            ]
        );
        assert_eq!(env.artifacts_dir(), PathBuf::from("/src/kubernetes/_artifacts"));
    }

    #[test]
    fn test_kubeconfig_override() {
        let env = RunEnvironment::from_vars([("KUBECONFIG", "/tmp/kc")], "/src");
        assert_eq!(env.kubeconfig, PathBuf::from("/tmp/kc"));
        assert_eq!(
            env.home_path(&[".ssh", "google_compute_engine"]),
            PathBuf::from("/src/.ssh/google_compute_engine")
        );
    }
}
