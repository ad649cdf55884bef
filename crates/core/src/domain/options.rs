use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::deployment::DeploymentKind;
use super::extract::ExtractSpec;
use super::strategy::{BuildStrategy, StageStrategy};

pub const DEFAULT_TEST_COMMAND: &str = "./hack/ginkgo-e2e.sh";

/// Everything the operator asked for, fixed at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOptions {
    pub build: BuildStrategy,
    pub stage: StageStrategy,
    pub extract: ExtractSpec,
    /// Deployer name, resolved into a variant only once the run needs it.
    pub deployment: String,
    pub up: bool,
    pub down: bool,
    pub test: bool,
    pub federation: bool,
    /// Where credentials and the tested version are saved to, or restored from.
    pub save: Option<String>,
    pub publish: Option<String>,
    /// Output directory for the report, metadata and cluster log dumps.
    pub dump: Option<PathBuf>,
    pub test_command: String,
    pub test_args: String,
    pub upgrade_args: String,
    pub skew: bool,
    pub check_version_skew: bool,
    /// Zero disables the interrupt deadline.
    pub timeout: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            build: BuildStrategy::disabled(),
            stage: StageStrategy::disabled(),
            extract: ExtractSpec::default(),
            deployment: DeploymentKind::Bash.as_str().to_string(),
            up: false,
            down: false,
            test: false,
            federation: false,
            save: None,
            publish: None,
            dump: None,
            test_command: DEFAULT_TEST_COMMAND.to_string(),
            test_args: String::new(),
            upgrade_args: String::new(),
            skew: false,
            check_version_skew: true,
            timeout: Duration::ZERO,
        }
    }
}

impl RunOptions {
    pub fn new(deployment: impl Into<String>) -> Self {
        Self {
            deployment: deployment.into(),
            ..Default::default()
        }
    }

    pub fn with_lifecycle(mut self, up: bool, test: bool, down: bool) -> Self {
        self.up = up;
        self.test = test;
        self.down = down;
        self
    }

    pub fn with_build(mut self, build: BuildStrategy) -> Self {
        self.build = build;
        self
    }

    pub fn with_stage(mut self, stage: StageStrategy) -> Self {
        self.stage = stage;
        self
    }

    pub fn with_extract(mut self, extract: ExtractSpec) -> Self {
        self.extract = extract;
        self
    }

    pub fn with_federation(mut self, federation: bool) -> Self {
        self.federation = federation;
        self
    }

    pub fn with_save(mut self, save: impl Into<String>) -> Self {
        self.save = Some(save.into());
        self
    }

    pub fn with_publish(mut self, publish: impl Into<String>) -> Self {
        self.publish = Some(publish.into());
        self
    }

    pub fn with_dump(mut self, dump: impl Into<PathBuf>) -> Self {
        self.dump = Some(dump.into());
        self
    }

    pub fn with_test_command(mut self, command: impl Into<String>) -> Self {
        self.test_command = command.into();
        self
    }

    pub fn with_test_args(mut self, args: impl Into<String>) -> Self {
        self.test_args = args.into();
        self
    }

    pub fn with_upgrade_args(mut self, args: impl Into<String>) -> Self {
        self.upgrade_args = args.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Whether a primary cluster (as opposed to only a federation control
    /// plane) is managed by this run.
    pub fn manages_primary_cluster(&self) -> bool {
        self.deployment != DeploymentKind::None.as_str()
    }

    pub fn split_test_args(&self) -> Vec<String> {
        split_args(&self.test_args)
    }

    pub fn split_upgrade_args(&self) -> Vec<String> {
        split_args(&self.upgrade_args)
    }
}

fn split_args(args: &str) -> Vec<String> {
    args.split_whitespace().map(str::to_string).collect()
}
