use async_trait::async_trait;
use deployer::{CommandRunner, CommandSpec};
use kubetest_core::StageStrategy;
use std::sync::Arc;
use tracing::info;

use super::Strategy;
use crate::error::Result;
use crate::workspace::Workspace;

const PUSH_BUILD: &str = "./build/push-build.sh";

pub struct Stage {
    strategy: StageStrategy,
    runner: Arc<dyn CommandRunner>,
    workspace: Workspace,
}

impl Stage {
    pub fn new(
        strategy: StageStrategy,
        runner: Arc<dyn CommandRunner>,
        workspace: Workspace,
    ) -> Self {
        Self {
            strategy,
            runner,
            workspace,
        }
    }
}

#[async_trait]
impl Strategy for Stage {
    fn name(&self) -> &'static str {
        "Stage"
    }

    fn enabled(&self) -> bool {
        self.strategy.enabled()
    }

    async fn execute(&self) -> Result<()> {
        let Some(target) = self.strategy.target() else {
            return Ok(());
        };
        info!(location = %target.location(), "Staging release");

        let spec = CommandSpec::new(PUSH_BUILD)
            .args(["--nomock", "--verbose", "--ci"])
            .arg(format!("--bucket={}", target.bucket))
            .arg(format!("--gcs-suffix={}", target.suffix))
            .current_dir(self.workspace.dir());
        self.runner.run(&spec).await?;
        Ok(())
    }
}
