use deployer::{
    select_deployer_by_name, CommandRunner, DeployContext, DeployerSettings, Federation,
};
use kubetest_core::RunOptions;
use std::sync::Arc;
use tracing::{error, info};

use crate::clock::Interruption;
use crate::environment::RunEnvironment;
use crate::error::{OrchestratorError, Result};
use crate::finalize::{FinalizeGuard, RunFinalizer};
use crate::phases::{self, RunBody};
use crate::report::ResultRecorder;
use crate::watcher::{
    process_exit, CtrlC, ExitHook, SignalSource, TeardownWatcher, WatcherHandle,
};
use crate::workspace::Workspace;

/// Drives one run through its phases.
///
/// 1. cancellation setup
/// 2. prepare the environment
/// 3. acquire binaries
/// 4. validate the working directory
/// 5. select the deployer
/// 6. register the teardown watcher (`--down` only)
/// 7. run body
/// 8. persist state
/// 9. publish the version
/// 10. finalise the report, on every path
pub struct RunOrchestrator {
    options: RunOptions,
    environment: RunEnvironment,
    runner: Arc<dyn CommandRunner>,
    settings: DeployerSettings,
    workspace: Workspace,
    recorder: ResultRecorder,
    interruption: Interruption,
    finalizer: Arc<RunFinalizer>,
    signals: Option<Box<dyn SignalSource>>,
    exit: ExitHook,
    watcher: Option<WatcherHandle>,
}

impl RunOrchestrator {
    pub fn new(
        options: RunOptions,
        environment: RunEnvironment,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        let workspace = Workspace::new(environment.start_dir.clone());
        let recorder = ResultRecorder::new();
        let finalizer = Arc::new(RunFinalizer::new(
            options.dump.clone(),
            recorder.clone(),
            Arc::clone(&runner),
            workspace.clone(),
            environment.metadata.clone(),
        ));

        Self {
            options,
            environment,
            runner,
            settings: DeployerSettings::default(),
            workspace,
            recorder,
            interruption: Interruption::new(),
            finalizer,
            signals: None,
            exit: process_exit(),
            watcher: None,
        }
    }

    pub fn with_settings(mut self, settings: DeployerSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Replace Ctrl-C as the trigger for graceful teardown.
    pub fn with_signal_source(mut self, signals: Box<dyn SignalSource>) -> Self {
        self.signals = Some(signals);
        self
    }

    pub fn with_exit_hook(mut self, exit: ExitHook) -> Self {
        self.exit = exit;
        self
    }

    pub fn recorder(&self) -> &ResultRecorder {
        &self.recorder
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Run every phase, then finalise whatever happened.
    ///
    /// The teardown watcher stays registered until the report is written, so
    /// ^C keeps triggering cleanup through persist and publish. A finalise
    /// already started by the watcher is waited for, not repeated.
    pub async fn complete(&mut self) -> Result<()> {
        let _guard = FinalizeGuard::new(Arc::clone(&self.finalizer));

        let result = self.run_phases().await;
        if let Err(e) = &result {
            error!(error = %e, "Run failed");
        }

        let finalized = self.finalizer.finalize().await;
        if let Some(watcher) = self.watcher.take() {
            watcher.stop().await;
        }

        match finalized {
            Ok(_) => result,
            Err(e) if result.is_ok() => Err(e),
            Err(e) => {
                error!(error = %e, "Failed to finalize run");
                result
            }
        }
    }

    async fn run_phases(&mut self) -> Result<()> {
        self.interruption.setup(self.options.timeout)?;

        phases::prepare(&self.environment, self.runner.as_ref()).await?;

        if self.interruption.check() {
            return Err(OrchestratorError::Interrupted {
                skipped: "acquire".to_string(),
            });
        }
        phases::acquire(
            &self.options,
            Arc::clone(&self.runner),
            &self.workspace,
            &self.environment.kubeconfig,
            &self.recorder,
        )
        .await?;

        self.workspace.validate()?;

        let workdir = self.workspace.dir();
        let ctx = DeployContext::new(
            Arc::clone(&self.runner),
            workdir.clone(),
            self.environment.kubeconfig.clone(),
        )
        .with_settings(self.settings.clone());
        let deployer = select_deployer_by_name(&self.options.deployment, &ctx)
            .map_err(OrchestratorError::DeployerCreation)?;
        let federation = self
            .options
            .federation
            .then(|| Arc::new(Federation::new(Arc::clone(&self.runner), workdir.clone())));

        if self.options.down {
            let watcher = TeardownWatcher::new(
                Arc::clone(&deployer),
                federation.clone(),
                Arc::clone(&self.finalizer),
                self.interruption.signal_flag(),
                Arc::clone(&self.exit),
            );
            let signals = self.signals.take().unwrap_or_else(|| Box::new(CtrlC));
            self.watcher = Some(watcher.spawn(signals));
            info!("Registered teardown watcher");
        }

        RunBody {
            options: &self.options,
            deployer: deployer.as_ref(),
            federation: federation.as_deref(),
            runner: self.runner.as_ref(),
            workspace: &self.workspace,
            kubeconfig: &self.environment.kubeconfig,
            recorder: &self.recorder,
        }
        .execute(&mut self.interruption)
        .await?;

        phases::persist(
            &self.options,
            self.runner.as_ref(),
            &self.environment.kubeconfig,
            &self.workspace.dir(),
        )
        .await?;

        phases::publish(&self.options, self.runner.as_ref(), &self.workspace.dir()).await?;

        info!(steps = self.recorder.len(), "Run completed successfully");
        Ok(())
    }
}
