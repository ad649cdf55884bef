//! Cluster lifecycle and the test command.
//!
//! Work steps run in order until the first failure. Between steps the run
//! checks for interruption and skips whatever work remains. Cleanup steps
//! run whenever `--down` was requested, whatever happened before.

use deployer::{CommandRunner, CommandSpec, Deployer, Federation};
use kubetest_core::RunOptions;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use crate::clock::Interruption;
use crate::error::{OrchestratorError, Result};
use crate::report::ResultRecorder;
use crate::strategies::SKEW_DIR;
use crate::workspace::Workspace;

const LOG_DUMP: &str = "./cluster/log-dump.sh";
const KUBECTL: &str = "./cluster/kubectl.sh";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    BringUp,
    FederationUp,
    IsUp,
    InstallAccessCredentials,
    UpgradeTests,
    RunTests,
    DumpClusterLogs,
    FederationDown,
    TearDown,
}

impl Step {
    pub fn name(&self) -> &'static str {
        match self {
            Self::BringUp => "bringUp",
            Self::FederationUp => "federationUp",
            Self::IsUp => "isUp",
            Self::InstallAccessCredentials => "installAccessCredentials",
            Self::UpgradeTests => "upgradeTests",
            Self::RunTests => "runTests",
            Self::DumpClusterLogs => "dumpClusterLogs",
            Self::FederationDown => "federationDown",
            Self::TearDown => "tearDown",
        }
    }

    /// Work steps the options ask for, in execution order.
    pub fn planned(options: &RunOptions) -> Vec<Step> {
        let mut steps = Vec::new();
        if options.up {
            steps.push(Self::BringUp);
            if options.federation {
                steps.push(Self::FederationUp);
            }
        }
        if options.up || options.test {
            steps.push(Self::IsUp);
            steps.push(Self::InstallAccessCredentials);
        }
        if !options.upgrade_args.trim().is_empty() {
            steps.push(Self::UpgradeTests);
        }
        if options.test {
            steps.push(Self::RunTests);
        }
        steps
    }

    /// Cleanup steps, attempted even after a failure or an interruption.
    pub fn cleanup(options: &RunOptions) -> Vec<Step> {
        let mut steps = Vec::new();
        if options.down {
            if options.federation {
                steps.push(Self::FederationDown);
            }
            steps.push(Self::TearDown);
        }
        steps
    }
}

pub struct RunBody<'a> {
    pub options: &'a RunOptions,
    pub deployer: &'a dyn Deployer,
    pub federation: Option<&'a Federation>,
    pub runner: &'a dyn CommandRunner,
    pub workspace: &'a Workspace,
    pub kubeconfig: &'a Path,
    pub recorder: &'a ResultRecorder,
}

impl RunBody<'_> {
    pub async fn execute(&self, interruption: &mut Interruption) -> Result<()> {
        let planned = Step::planned(self.options);
        let mut failure: Option<OrchestratorError> = None;
        let mut skipped: Vec<&'static str> = Vec::new();

        for (index, step) in planned.iter().enumerate() {
            if interruption.check() {
                skipped = planned[index..].iter().map(Step::name).collect();
                warn!(skipped = %skipped.join(", "), "Interrupted, skipping remaining steps");
                break;
            }
            if let Err(e) = self.recorder.wrap(step.name(), self.run(*step)).await {
                failure = Some(OrchestratorError::step_failed(step.name(), e));
                break;
            }
        }

        if failure.is_some() && self.options.dump.is_some() {
            if let Err(e) = self
                .recorder
                .wrap(Step::DumpClusterLogs.name(), self.run(Step::DumpClusterLogs))
                .await
            {
                warn!(error = %e, "Failed to dump cluster logs");
            }
        }

        for step in Step::cleanup(self.options) {
            if let Err(e) = self.recorder.wrap(step.name(), self.run(step)).await {
                if failure.is_none() {
                    failure = Some(OrchestratorError::step_failed(step.name(), e));
                } else {
                    error!(step = step.name(), error = %e, "Cleanup failed after earlier failure");
                }
            }
        }

        match failure {
            Some(e) => Err(e),
            None if !skipped.is_empty() => Err(OrchestratorError::Interrupted {
                skipped: skipped.join(", "),
            }),
            None => Ok(()),
        }
    }

    async fn run(&self, step: Step) -> Result<()> {
        match step {
            Step::BringUp => self.deployer.bring_up().await?,
            Step::IsUp => self.deployer.is_up().await?,
            Step::InstallAccessCredentials => self.deployer.install_access_credentials().await?,
            Step::TearDown => self.deployer.tear_down().await?,
            Step::FederationUp => {
                if let Some(federation) = self.federation {
                    federation.bring_up().await?;
                }
            }
            Step::FederationDown => {
                if let Some(federation) = self.federation {
                    federation.tear_down().await?;
                }
            }
            Step::UpgradeTests => {
                let spec = self
                    .test_command(self.options.split_upgrade_args())
                    .env("E2E_REPORT_PREFIX", "upgrade");
                self.runner.run(&spec).await?;
            }
            Step::RunTests => {
                let spec = self.test_command(self.options.split_test_args());
                self.runner.run(&spec).await?;
            }
            Step::DumpClusterLogs => {
                if let Some(dump) = &self.options.dump {
                    let spec = CommandSpec::new(LOG_DUMP)
                        .arg(dump.display().to_string())
                        .current_dir(self.workspace.dir());
                    self.runner.run(&spec).await?;
                }
            }
        }
        Ok(())
    }

    /// Skewed runs use the tests of the other release.
    fn test_dir(&self) -> PathBuf {
        let dir = self.workspace.dir();
        if self.options.skew {
            dir.with_file_name(SKEW_DIR)
        } else {
            dir
        }
    }

    fn test_command(&self, args: Vec<String>) -> CommandSpec {
        let kubectl = if self.options.check_version_skew {
            format!("{KUBECTL} --match-server-version")
        } else {
            KUBECTL.to_string()
        };
        let dir = self.test_dir();
        info!(command = %self.options.test_command, dir = %dir.display(), "Running tests");

        CommandSpec::new(self.options.test_command.as_str())
            .args(args)
            .current_dir(dir)
            .env("KUBECONFIG", self.kubeconfig.display().to_string())
            .env("KUBECTL", kubectl)
    }
}
