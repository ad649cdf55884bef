use async_trait::async_trait;
use deployer::{CommandRunner, CommandSpec};
use kubetest_core::{BuildMode, BuildStrategy};
use std::sync::Arc;
use tracing::info;

use super::Strategy;
use crate::error::Result;
use crate::workspace::Workspace;

pub struct Build {
    strategy: BuildStrategy,
    runner: Arc<dyn CommandRunner>,
    workspace: Workspace,
}

impl Build {
    pub fn new(
        strategy: BuildStrategy,
        runner: Arc<dyn CommandRunner>,
        workspace: Workspace,
    ) -> Self {
        Self {
            strategy,
            runner,
            workspace,
        }
    }

    fn command(mode: BuildMode) -> CommandSpec {
        match mode {
            BuildMode::Quick => CommandSpec::new("make").arg("quick-release"),
            BuildMode::Release => CommandSpec::new("make").arg("release"),
            BuildMode::Bazel => CommandSpec::new("bazel").args(["build", "//build/release-tars"]),
        }
    }
}

#[async_trait]
impl Strategy for Build {
    fn name(&self) -> &'static str {
        "Build"
    }

    fn enabled(&self) -> bool {
        self.strategy.enabled()
    }

    async fn execute(&self) -> Result<()> {
        let Some(mode) = self.strategy.mode() else {
            return Ok(());
        };
        info!(mode = mode.as_str(), "Building kubernetes");
        let spec = Self::command(mode).current_dir(self.workspace.dir());
        self.runner.run(&spec).await?;
        Ok(())
    }
}
