//! `metadata.json`: the detected version plus caller-supplied entries.

use deployer::{CommandRunner, CommandSpec};
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{info, warn};

use crate::error::Result;

pub const METADATA_FILE: &str = "metadata.json";
pub const VERSION_FILE: &str = "version";
pub const UNKNOWN_VERSION: &str = "unknown";

const VERSION_SCRIPT: &str = "hack/lib/version.sh";
const VERSION_FROM_GIT: &str = ". hack/lib/version.sh && KUBE_ROOT=. kube::version::get_version_vars && echo \"${KUBE_GIT_VERSION-}\"";

static METADATA_KEY: OnceLock<Regex> = OnceLock::new();

fn metadata_key() -> &'static Regex {
    METADATA_KEY.get_or_init(|| {
        Regex::new(r"^BUILD_METADATA_(.+)$").expect("Invalid metadata key pattern")
    })
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RunMetadata(BTreeMap<String, String>);

impl RunMetadata {
    /// Seed with `version` and `job-version`, then add every variable
    /// named `BUILD_METADATA_<KEY>` as lower-cased `<key>`.
    pub fn new<'a>(version: &str, vars: impl IntoIterator<Item = &'a (String, String)>) -> Self {
        let mut entries = BTreeMap::new();
        entries.insert("version".to_string(), version.to_string());
        entries.insert("job-version".to_string(), version.to_string());

        for (name, value) in vars {
            if let Some(captures) = metadata_key().captures(name) {
                entries.insert(captures[1].to_lowercase(), value.clone());
            }
        }
        Self(entries)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn write(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(METADATA_FILE);
        std::fs::write(&path, serde_json::to_string(self)?)?;
        info!(path = %path.display(), "Saved run metadata");
        Ok(path)
    }
}

/// Trimmed contents of `<workdir>/version`, if readable.
pub fn read_version_file(workdir: &Path) -> Option<String> {
    let path = workdir.join(VERSION_FILE);
    if !path.exists() {
        return None;
    }
    match std::fs::read_to_string(&path) {
        Ok(contents) => Some(contents.trim().to_string()),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read version");
            None
        }
    }
}

/// The version under test: the `version` file, else the git version of the
/// source tree, else `unknown`.
pub async fn find_version(runner: &dyn CommandRunner, workdir: &Path) -> String {
    if let Some(version) = read_version_file(workdir) {
        return version;
    }

    if workdir.join(VERSION_SCRIPT).exists() {
        let spec = CommandSpec::new("bash")
            .args(["-c", VERSION_FROM_GIT])
            .current_dir(workdir);
        match runner.output(&spec).await {
            Ok(stdout) => return stdout.trim().to_string(),
            Err(e) => warn!(error = %e, "Failed to get_version_vars"),
        }
    }

    UNKNOWN_VERSION.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use deployer::testing::ScriptedRunner;
    use tempfile::TempDir;

    #[test]
    fn test_seeded_with_version_and_prefixed_vars() {
        let vars = vec![
            ("BUILD_METADATA_REPO_COMMIT".to_string(), "abc".to_string()),
            ("BUILD_METADATA_".to_string(), "ignored".to_string()),
            ("JOB_NAME".to_string(), "ci-e2e".to_string()),
        ];
        let metadata = RunMetadata::new("v1.7.0", &vars);

        assert_eq!(metadata.get("version"), Some("v1.7.0"));
        assert_eq!(metadata.get("job-version"), Some("v1.7.0"));
        assert_eq!(metadata.get("repo_commit"), Some("abc"));
        assert_eq!(metadata.len(), 3);
    }

    #[test]
    fn test_prefixed_vars_override_seed() {
        let vars = vec![("BUILD_METADATA_VERSION".to_string(), "custom".to_string())];
        let metadata = RunMetadata::new("v1.7.0", &vars);
        assert_eq!(metadata.get("version"), Some("custom"));
        assert_eq!(metadata.get("job-version"), Some("v1.7.0"));
    }

    #[test]
    fn test_write_json() {
        let temp = TempDir::new().unwrap();
        let path = RunMetadata::new("v1.6.4", std::iter::empty())
            .write(temp.path())
            .unwrap();

        let parsed: BTreeMap<String, String> =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(parsed["job-version"], "v1.6.4");
    }

    #[tokio::test]
    async fn test_find_version_sources() {
        let temp = TempDir::new().unwrap();
        let runner = ScriptedRunner::new().respond_to("bash -c", "v1.8.0-alpha.1\n");

        assert_eq!(find_version(&runner, temp.path()).await, UNKNOWN_VERSION);
        assert_eq!(runner.count("bash"), 0);

        std::fs::create_dir_all(temp.path().join("hack/lib")).unwrap();
        std::fs::write(temp.path().join(VERSION_SCRIPT), "").unwrap();
        assert_eq!(find_version(&runner, temp.path()).await, "v1.8.0-alpha.1");

        std::fs::write(temp.path().join(VERSION_FILE), "v1.7.3\n").unwrap();
        assert_eq!(find_version(&runner, temp.path()).await, "v1.7.3");
        assert_eq!(runner.count("bash"), 1);
    }
}
