use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::error::Result;
use crate::process::{CommandRunner, CommandSpec};

const UP_SCRIPT: &str = "./federation/cluster/federation-up.sh";
const DOWN_SCRIPT: &str = "./federation/cluster/federation-down.sh";

/// The federation control plane that can sit on top of the primary cluster.
pub struct Federation {
    runner: Arc<dyn CommandRunner>,
    workdir: PathBuf,
}

impl Federation {
    pub fn new(runner: Arc<dyn CommandRunner>, workdir: PathBuf) -> Self {
        Self { runner, workdir }
    }

    pub async fn bring_up(&self) -> Result<()> {
        info!("Bringing up federation control plane");
        self.runner
            .run(&CommandSpec::new(UP_SCRIPT).current_dir(&self.workdir))
            .await
    }

    pub async fn tear_down(&self) -> Result<()> {
        info!("Tearing down federation control plane");
        self.runner
            .run(&CommandSpec::new(DOWN_SCRIPT).current_dir(&self.workdir))
            .await
    }
}
