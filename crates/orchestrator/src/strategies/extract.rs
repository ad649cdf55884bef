//! Release extraction.
//!
//! Every entry unpacks into the base directory. A second entry first moves
//! the previous tree aside to `kubernetes_skew`, which is where skewed test
//! runs execute from. Once done the run continues inside `kubernetes/`.

use async_trait::async_trait;
use deployer::{CommandRunner, CommandSpec};
use kubetest_core::{CoreError, ExtractMode, ExtractSpec};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tracing::{info, warn};

use super::Strategy;
use crate::error::{OrchestratorError, Result};
use crate::state::{load_kubeconfig, load_version};
use crate::workspace::Workspace;

pub const SOURCE_DIR: &str = "kubernetes";
pub const SKEW_DIR: &str = "kubernetes_skew";

const ARCHIVE: &str = "kubernetes.tar.gz";
const GET_KUBE_BINARIES: &str = "./cluster/get-kube-binaries.sh";
const STORAGE_URL: &str = "https://storage.googleapis.com";
const RELEASE_BUCKET: &str = "kubernetes-release";
const CI_BUCKET: &str = "kubernetes-release-dev";

static MARKER: OnceLock<Regex> = OnceLock::new();
static VERSION: OnceLock<Regex> = OnceLock::new();

fn marker() -> &'static Regex {
    MARKER.get_or_init(|| {
        Regex::new(r"^(ci|release)/(latest|stable)(-\d+\.\d+)?$").expect("Invalid marker pattern")
    })
}

fn version() -> &'static Regex {
    VERSION.get_or_init(|| Regex::new(r"^v\d+\.\d+\.\d+.*$").expect("Invalid version pattern"))
}

/// Where an archive lives and which version it holds.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Release {
    url: String,
    version: String,
}

impl Release {
    fn archive(&self) -> String {
        format!("{}/{}/{ARCHIVE}", self.url, self.version)
    }

    fn for_version(version: &str) -> Self {
        // Builds carry `+<commit>` and only exist in the ci bucket.
        let (bucket, kind) = if version.contains('+') {
            (CI_BUCKET, "ci")
        } else {
            (RELEASE_BUCKET, "release")
        };
        Self {
            url: format!("{STORAGE_URL}/{bucket}/{kind}"),
            version: version.to_string(),
        }
    }
}

pub struct Extract {
    spec: ExtractSpec,
    runner: Arc<dyn CommandRunner>,
    workspace: Workspace,
    kubeconfig: PathBuf,
}

impl Extract {
    pub fn new(
        spec: ExtractSpec,
        runner: Arc<dyn CommandRunner>,
        workspace: Workspace,
        kubeconfig: PathBuf,
    ) -> Self {
        Self {
            spec,
            runner,
            workspace,
            kubeconfig,
        }
    }

    pub fn spec(&self) -> &ExtractSpec {
        &self.spec
    }

    async fn resolve(&self, locator: &str) -> Result<Release> {
        if let Some(captures) = marker().captures(locator) {
            let bucket = match &captures[1] {
                "ci" => CI_BUCKET,
                _ => RELEASE_BUCKET,
            };
            let spec = CommandSpec::new("gsutil")
                .arg("cat")
                .arg(format!("gs://{bucket}/{locator}.txt"));
            let version = self.runner.output(&spec).await?.trim().to_string();
            info!(marker = locator, version = %version, "Resolved version marker");
            return Ok(Release {
                url: format!("{STORAGE_URL}/{bucket}/{}", &captures[1]),
                version,
            });
        }

        if version().is_match(locator) {
            return Ok(Release::for_version(locator));
        }

        let remote = ["gs://", "https://", "http://"]
            .iter()
            .any(|scheme| locator.starts_with(scheme));
        if remote {
            if let Some((url, version)) = locator.trim_end_matches('/').rsplit_once('/') {
                return Ok(Release {
                    url: url.to_string(),
                    version: version.to_string(),
                });
            }
        }

        Err(CoreError::InvalidExtract(format!("unrecognized release locator {locator:?}")).into())
    }

    async fn download(&self, source: &str, dest: &Path) -> Result<()> {
        let spec = if source.starts_with("gs://") {
            CommandSpec::new("gsutil")
                .arg("cp")
                .arg(source)
                .arg(dest.display().to_string())
        } else {
            CommandSpec::new("curl")
                .args(["-fsSL", "-o"])
                .arg(dest.display().to_string())
                .arg(source)
        };
        self.runner.run(&spec).await?;
        Ok(())
    }

    /// Unpack `archive` into `base` and fetch the matching binaries.
    async fn unpack(&self, base: &Path, archive: &Path, release_url: Option<&str>) -> Result<()> {
        let tar = CommandSpec::new("tar")
            .arg("-xzf")
            .arg(archive.display().to_string())
            .current_dir(base);
        self.runner.run(&tar).await?;

        let mut binaries = CommandSpec::new(GET_KUBE_BINARIES)
            .current_dir(base.join(SOURCE_DIR))
            .env("KUBERNETES_SKIP_CONFIRM", "y")
            .env("KUBERNETES_DOWNLOAD_TESTS", "y");
        if let Some(url) = release_url {
            binaries = binaries.env("KUBERNETES_RELEASE_URL", url);
        }
        self.runner.run(&binaries).await?;
        Ok(())
    }

    async fn extract_release(&self, base: &Path, locator: &str) -> Result<()> {
        let release = self.resolve(locator).await?;
        info!(url = %release.url, version = %release.version, "Extracting release");

        let archive = base.join(ARCHIVE);
        self.download(&release.archive(), &archive).await?;
        self.unpack(base, &archive, Some(&release.url)).await?;
        remove_file_if_exists(&archive).await
    }

    async fn extract_local(&self, base: &Path, locator: &str) -> Result<()> {
        let path = base.join(locator);
        let archive = if locator.ends_with(".tar.gz") {
            path
        } else {
            path.join(ARCHIVE)
        };
        info!(archive = %archive.display(), "Extracting local release");
        self.unpack(base, &archive, None).await
    }

    async fn restore(&self, base: &Path, save: &str) -> Result<()> {
        load_kubeconfig(self.runner.as_ref(), save, &self.kubeconfig).await?;
        let version = load_version(self.runner.as_ref(), save).await?;
        self.extract_release(base, &version).await
    }
}

#[async_trait]
impl Strategy for Extract {
    fn name(&self) -> &'static str {
        "Extract"
    }

    fn enabled(&self) -> bool {
        self.spec.enabled()
    }

    async fn execute(&self) -> Result<()> {
        let base = self.workspace.dir();
        for dir in [SOURCE_DIR, SKEW_DIR] {
            remove_dir_if_exists(&base.join(dir)).await?;
        }

        let entries = self.spec.entries();
        for (index, entry) in entries.iter().enumerate() {
            if index > 0 {
                tokio::fs::rename(base.join(SOURCE_DIR), base.join(SKEW_DIR)).await?;
            }
            match entry.mode {
                ExtractMode::Release => self.extract_release(&base, &entry.locator).await?,
                ExtractMode::LocalPath => self.extract_local(&base, &entry.locator).await?,
                ExtractMode::StoredState => {
                    self.restore(&base, &entry.locator).await?;
                    if index + 1 < entries.len() {
                        warn!(
                            skipped = entries.len() - index - 1,
                            "Restored saved state, ignoring remaining extract entries"
                        );
                    }
                    break;
                }
            }
        }

        self.workspace.enter(SOURCE_DIR);
        Ok(())
    }
}

async fn remove_dir_if_exists(dir: &Path) -> Result<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(OrchestratorError::Io(e)),
    }
}

async fn remove_file_if_exists(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(OrchestratorError::Io(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deployer::testing::ScriptedRunner;
    use kubetest_core::ExtractStrategy;
    use tempfile::TempDir;

    /// A runner whose `tar` creates the unpacked tree.
    fn unpacking_runner() -> ScriptedRunner {
        ScriptedRunner::new()
            .respond_to(
                "gsutil cat gs://kubernetes-release-dev/ci/latest.txt",
                "v1.8.0-alpha.1+abc\n",
            )
            .respond_to("gsutil cat", "v1.7.0\n")
            .on_run("tar -xzf", |spec| {
                if let Some(cwd) = &spec.cwd {
                    std::fs::create_dir_all(cwd.join(SOURCE_DIR)).unwrap();
                }
            })
    }

    fn extract(
        spec: ExtractSpec,
        runner: Arc<ScriptedRunner>,
        base: &Path,
    ) -> (Extract, Workspace) {
        let workspace = Workspace::new(base);
        let extract = Extract::new(spec, runner, workspace.clone(), base.join("kubeconfig"));
        (extract, workspace)
    }

    #[tokio::test]
    async fn test_release_marker() {
        let temp = TempDir::new().unwrap();
        let runner = Arc::new(unpacking_runner());
        let (extract, workspace) = extract(
            ExtractSpec::parse_all(["ci/latest"]).unwrap(),
            runner.clone(),
            temp.path(),
        );

        extract.execute().await.unwrap();

        let lines = runner.command_lines();
        assert_eq!(lines[0], "gsutil cat gs://kubernetes-release-dev/ci/latest.txt");
        assert_eq!(
            lines[1],
            format!(
                "curl -fsSL -o {} {STORAGE_URL}/{CI_BUCKET}/ci/v1.8.0-alpha.1+abc/{ARCHIVE}",
                temp.path().join(ARCHIVE).display()
            )
        );
        assert!(lines[2].starts_with("tar -xzf"));
        assert_eq!(lines[3], GET_KUBE_BINARIES);
        assert_eq!(workspace.dir(), temp.path().join(SOURCE_DIR));

        let binaries = &runner.calls()[3];
        assert!(binaries
            .envs
            .contains(&("KUBERNETES_SKIP_CONFIRM".to_string(), "y".to_string())));
    }

    #[tokio::test]
    async fn test_version_and_gcs_locators() {
        let temp = TempDir::new().unwrap();
        let runner = Arc::new(unpacking_runner());
        let (extract, _) = extract(ExtractSpec::default(), runner.clone(), temp.path());

        assert_eq!(
            extract.resolve("v1.7.0").await.unwrap(),
            Release {
                url: "https://storage.googleapis.com/kubernetes-release/release".into(),
                version: "v1.7.0".into(),
            }
        );
        assert_eq!(
            extract.resolve("gs://bucket/devel/v1.8.0").await.unwrap(),
            Release {
                url: "gs://bucket/devel".into(),
                version: "v1.8.0".into(),
            }
        );
        assert!(extract.resolve("latest-please").await.is_err());
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_second_entry_moves_first_to_skew() {
        let temp = TempDir::new().unwrap();
        let runner = Arc::new(unpacking_runner());
        let (extract, workspace) = extract(
            ExtractSpec::parse_all(["v1.6.4", "v1.7.0"]).unwrap(),
            runner.clone(),
            temp.path(),
        );

        extract.execute().await.unwrap();

        assert!(temp.path().join(SKEW_DIR).is_dir());
        assert!(temp.path().join(SOURCE_DIR).is_dir());
        assert_eq!(workspace.dir(), temp.path().join(SOURCE_DIR));
        assert_eq!(runner.count("tar -xzf"), 2);
    }

    #[tokio::test]
    async fn test_local_archive() {
        let temp = TempDir::new().unwrap();
        let runner = Arc::new(unpacking_runner());
        let (extract, _) = extract(
            ExtractSpec::parse_all(["./_output/release-tars"]).unwrap(),
            runner.clone(),
            temp.path(),
        );

        extract.execute().await.unwrap();

        let archive = temp.path().join("./_output/release-tars").join(ARCHIVE);
        assert_eq!(runner.command_lines()[0], format!("tar -xzf {}", archive.display()));
        assert_eq!(runner.count("curl"), 0);
    }

    #[tokio::test]
    async fn test_stored_state_short_circuits() {
        let temp = TempDir::new().unwrap();
        let saved = temp.path().join("saved");
        std::fs::create_dir_all(&saved).unwrap();
        std::fs::write(saved.join("kube-config"), "current-context: e2e").unwrap();
        std::fs::write(saved.join("version"), "v1.6.4\n").unwrap();

        let mut entries = ExtractSpec::restore(saved.display().to_string()).entries().to_vec();
        entries.push(ExtractStrategy::new(ExtractMode::Release, "v1.7.0"));
        let runner = Arc::new(unpacking_runner());
        let (extract, _) = extract(ExtractSpec::new(entries), runner.clone(), temp.path());

        extract.execute().await.unwrap();

        assert_eq!(
            std::fs::read_to_string(temp.path().join("kubeconfig")).unwrap(),
            "current-context: e2e"
        );
        assert_eq!(runner.count("curl"), 1);
        assert!(runner.command_lines()[0].contains("/v1.6.4/"));
    }

    #[tokio::test]
    async fn test_download_failure() {
        let temp = TempDir::new().unwrap();
        let runner = Arc::new(unpacking_runner().fail_on("curl"));
        let (extract, workspace) = extract(
            ExtractSpec::parse_all(["v1.7.0"]).unwrap(),
            runner,
            temp.path(),
        );

        assert!(extract.execute().await.is_err());
        assert_eq!(workspace.dir(), temp.path());
    }
}
