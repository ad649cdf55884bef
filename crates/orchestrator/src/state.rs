//! Run state persisted by an `--up` run and restored by later runs.

use deployer::CommandRunner;
use std::path::Path;
use tracing::info;

use crate::error::{OrchestratorError, Result};
use crate::location::Location;
use crate::metadata::VERSION_FILE;

pub const KUBECONFIG_FILE: &str = "kube-config";

/// Save the kubeconfig and the tested version under `save`.
pub async fn save_state(
    runner: &dyn CommandRunner,
    save: &str,
    kubeconfig: &Path,
    workdir: &Path,
) -> Result<()> {
    let location = Location::parse(save);
    info!(location = %location, "Saving kubeconfig and version");

    location
        .join(KUBECONFIG_FILE)
        .upload(runner, kubeconfig)
        .await
        .map_err(|e| OrchestratorError::persist(save, e))?;
    location
        .join(VERSION_FILE)
        .upload(runner, &workdir.join(VERSION_FILE))
        .await
        .map_err(|e| OrchestratorError::persist(save, e))?;
    Ok(())
}

pub async fn load_kubeconfig(
    runner: &dyn CommandRunner,
    save: &str,
    kubeconfig: &Path,
) -> Result<()> {
    let location = Location::parse(save).join(KUBECONFIG_FILE);
    info!(location = %location, kubeconfig = %kubeconfig.display(), "Restoring kubeconfig");
    location.download(runner, kubeconfig).await
}

pub async fn load_version(runner: &dyn CommandRunner, save: &str) -> Result<String> {
    let location = Location::parse(save).join(VERSION_FILE);
    let version = location.read_to_string(runner).await?.trim().to_string();
    info!(location = %location, version = %version, "Restored version");
    Ok(version)
}

/// Copy the working directory's `version` file to `destination`.
pub async fn publish_version(
    runner: &dyn CommandRunner,
    destination: &str,
    workdir: &Path,
) -> Result<()> {
    let source = workdir.join(VERSION_FILE);
    let version = tokio::fs::read_to_string(&source)
        .await
        .map_err(|e| OrchestratorError::publish(destination, e))?;
    info!(destination, version = %version.trim(), "Publishing version");

    Location::parse(destination)
        .upload(runner, &source)
        .await
        .map_err(|e| OrchestratorError::publish(destination, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use deployer::testing::ScriptedRunner;
    use tempfile::TempDir;

    fn fixture() -> TempDir {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("kubernetes")).unwrap();
        std::fs::write(temp.path().join("kubernetes/version"), "v1.7.0\n").unwrap();
        std::fs::write(temp.path().join("config"), "clusters: []").unwrap();
        temp
    }

    #[tokio::test]
    async fn test_save_then_load_local() {
        let temp = fixture();
        let runner = ScriptedRunner::new();
        let save = temp.path().join("saved").display().to_string();

        let kubeconfig = temp.path().join("config");
        save_state(&runner, &save, &kubeconfig, &temp.path().join("kubernetes"))
            .await
            .unwrap();

        let restored = temp.path().join("home/.kube/config");
        load_kubeconfig(&runner, &save, &restored).await.unwrap();
        assert_eq!(std::fs::read_to_string(restored).unwrap(), "clusters: []");
        assert_eq!(load_version(&runner, &save).await.unwrap(), "v1.7.0");
    }

    #[tokio::test]
    async fn test_save_failure_is_a_persist_error() {
        let temp = fixture();
        let runner = ScriptedRunner::new().fail_on("gsutil cp");

        let err = save_state(
            &runner,
            "gs://bucket/state",
            &temp.path().join("config"),
            &temp.path().join("kubernetes"),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, OrchestratorError::Persist { .. }));
    }

    #[tokio::test]
    async fn test_publish_version() {
        let temp = fixture();
        let runner = ScriptedRunner::new();
        let workdir = temp.path().join("kubernetes");

        publish_version(&runner, "gs://bucket/ci/latest-green.txt", &workdir)
            .await
            .unwrap();
        assert_eq!(
            runner.command_lines(),
            vec![format!(
                "gsutil cp {} gs://bucket/ci/latest-green.txt",
                workdir.join("version").display()
            )]
        );

        let missing = publish_version(&runner, "gs://bucket/x", temp.path()).await;
        assert!(matches!(missing, Err(OrchestratorError::Publish { .. })));
    }
}
