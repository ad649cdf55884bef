use kubetest_core::DeploymentKind;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::anywhere::AnywhereDeployer;
use crate::bash::BashDeployer;
use crate::error::Result;
use crate::kops::KopsDeployer;
use crate::none::NoneDeployer;
use crate::process::CommandRunner;
use crate::settings::DeployerSettings;
use crate::traits::Deployer;

/// Everything a deployer variant may need to be constructed.
#[derive(Clone)]
pub struct DeployContext {
    pub runner: Arc<dyn CommandRunner>,
    /// Root of the source tree the cluster scripts live in
    pub workdir: PathBuf,
    pub kubeconfig: PathBuf,
    pub settings: DeployerSettings,
}

impl DeployContext {
    pub fn new(runner: Arc<dyn CommandRunner>, workdir: PathBuf, kubeconfig: PathBuf) -> Self {
        Self {
            runner,
            workdir,
            kubeconfig,
            settings: DeployerSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: DeployerSettings) -> Self {
        self.settings = settings;
        self
    }
}

/// Resolve a variant into a ready-to-use deployer handle.
pub fn select_deployer(kind: DeploymentKind, ctx: &DeployContext) -> Result<Arc<dyn Deployer>> {
    info!(deployment = %kind, "Creating deployer");

    let deployer: Arc<dyn Deployer> = match kind {
        DeploymentKind::None => Arc::new(NoneDeployer),
        DeploymentKind::Bash => Arc::new(BashDeployer::new(
            Arc::clone(&ctx.runner),
            ctx.workdir.clone(),
        )),
        DeploymentKind::Kops => Arc::new(KopsDeployer::new(
            Arc::clone(&ctx.runner),
            ctx.workdir.clone(),
            ctx.kubeconfig.clone(),
            ctx.settings.kops.clone(),
        )?),
        DeploymentKind::KubernetesAnywhere => Arc::new(AnywhereDeployer::new(
            Arc::clone(&ctx.runner),
            ctx.workdir.clone(),
            ctx.kubeconfig.clone(),
            ctx.settings.kubernetes_anywhere.clone(),
        )?),
    };
    Ok(deployer)
}

/// Resolve a `--deployment` name. Unknown names are configuration errors.
pub fn select_deployer_by_name(name: &str, ctx: &DeployContext) -> Result<Arc<dyn Deployer>> {
    let kind: DeploymentKind = name.parse()?;
    select_deployer(kind, ctx)
}
