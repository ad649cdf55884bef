use deployer::CommandRunner;
use kubetest_core::RunOptions;
use std::path::Path;
use tracing::debug;

use crate::error::Result;
use crate::state::{publish_version, save_state};

/// Save when a cluster stays up for a later run, or when only a federation
/// control plane changed on top of an existing cluster.
pub fn should_persist(options: &RunOptions) -> bool {
    options.save.is_some()
        && ((options.up && !options.down)
            || (options.federation && options.up && !options.manages_primary_cluster()))
}

pub async fn persist(
    options: &RunOptions,
    runner: &dyn CommandRunner,
    kubeconfig: &Path,
    workdir: &Path,
) -> Result<()> {
    match &options.save {
        Some(save) if should_persist(options) => {
            save_state(runner, save, kubeconfig, workdir).await
        }
        _ => {
            debug!("Nothing to persist");
            Ok(())
        }
    }
}

pub async fn publish(
    options: &RunOptions,
    runner: &dyn CommandRunner,
    workdir: &Path,
) -> Result<()> {
    match &options.publish {
        Some(destination) => publish_version(runner, destination, workdir).await,
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deployer::testing::ScriptedRunner;
    use tempfile::TempDir;

    #[test]
    fn test_should_persist() {
        let base = || RunOptions::new("bash").with_save("gs://bucket/state");

        assert!(should_persist(&base().with_lifecycle(true, true, false)));
        assert!(!should_persist(&base().with_lifecycle(true, true, true)));
        assert!(!should_persist(&base().with_lifecycle(false, true, false)));
        assert!(!should_persist(
            &RunOptions::new("bash").with_lifecycle(true, false, false)
        ));

        let federation_only = RunOptions::new("none")
            .with_save("gs://bucket/state")
            .with_federation(true)
            .with_lifecycle(true, false, true);
        assert!(should_persist(&federation_only));

        let federated_clusters = RunOptions::new("bash")
            .with_save("gs://bucket/state")
            .with_federation(true)
            .with_lifecycle(true, false, true);
        assert!(!should_persist(&federated_clusters));
    }

    #[tokio::test]
    async fn test_persist_uploads_kubeconfig_and_version() {
        let temp = TempDir::new().unwrap();
        let runner = ScriptedRunner::new();
        let options = RunOptions::new("bash")
            .with_save("gs://bucket/state")
            .with_lifecycle(true, false, false);

        persist(&options, &runner, Path::new("/root/.kube/config"), temp.path())
            .await
            .unwrap();

        assert_eq!(
            runner.command_lines(),
            vec![
                "gsutil cp /root/.kube/config gs://bucket/state/kube-config".to_string(),
                format!(
                    "gsutil cp {} gs://bucket/state/version",
                    temp.path().join("version").display()
                ),
            ]
        );
    }

    #[tokio::test]
    async fn test_publish_is_optional() {
        let runner = ScriptedRunner::new();
        publish(&RunOptions::default(), &runner, Path::new("/nowhere"))
            .await
            .unwrap();
        assert!(runner.calls().is_empty());
    }
}
