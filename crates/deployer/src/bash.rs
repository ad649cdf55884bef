use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::error::Result;
use crate::process::{CommandRunner, CommandSpec};
use crate::traits::Deployer;

const UP_SCRIPT: &str = "./hack/e2e-internal/e2e-up.sh";
const STATUS_SCRIPT: &str = "./hack/e2e-internal/e2e-status.sh";
const DOWN_SCRIPT: &str = "./hack/e2e-internal/e2e-down.sh";

/// Drives the cluster scripts shipped in the source tree.
pub struct BashDeployer {
    runner: Arc<dyn CommandRunner>,
    workdir: PathBuf,
}

impl BashDeployer {
    pub fn new(runner: Arc<dyn CommandRunner>, workdir: PathBuf) -> Self {
        Self { runner, workdir }
    }

    async fn script(&self, script: &str) -> Result<()> {
        self.runner
            .run(&CommandSpec::new(script).current_dir(&self.workdir))
            .await
    }
}

#[async_trait]
impl Deployer for BashDeployer {
    fn name(&self) -> &'static str {
        "bash"
    }

    async fn bring_up(&self) -> Result<()> {
        info!(workdir = %self.workdir.display(), "Bringing up cluster with e2e-up.sh");
        self.script(UP_SCRIPT).await
    }

    async fn is_up(&self) -> Result<()> {
        self.script(STATUS_SCRIPT).await
    }

    async fn install_access_credentials(&self) -> Result<()> {
        // e2e-up.sh already writes the kubeconfig.
        Ok(())
    }

    async fn tear_down(&self) -> Result<()> {
        info!(workdir = %self.workdir.display(), "Tearing down cluster with e2e-down.sh");
        self.script(DOWN_SCRIPT).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedRunner;

    #[tokio::test]
    async fn test_scripts_run_in_workdir() {
        let runner = Arc::new(ScriptedRunner::new());
        let deployer = BashDeployer::new(runner.clone(), PathBuf::from("/src/kubernetes"));

        deployer.bring_up().await.unwrap();
        deployer.is_up().await.unwrap();
        deployer.install_access_credentials().await.unwrap();
        deployer.tear_down().await.unwrap();

        let calls = runner.command_lines();
        assert_eq!(calls, vec![UP_SCRIPT, STATUS_SCRIPT, DOWN_SCRIPT]);
        assert!(runner
            .calls()
            .iter()
            .all(|c| c.cwd.as_deref() == Some(std::path::Path::new("/src/kubernetes"))));
    }

    #[tokio::test]
    async fn test_failed_script_is_reported() {
        let runner = Arc::new(ScriptedRunner::new().fail_on(UP_SCRIPT));
        let deployer = BashDeployer::new(runner, PathBuf::from("."));
        assert!(deployer.bring_up().await.is_err());
    }
}
