use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::cluster;
use crate::error::{DeployError, Result};
use crate::process::{CommandRunner, CommandSpec};
use crate::settings::KopsSettings;
use crate::traits::Deployer;

/// Provisions an AWS cluster with kops.
pub struct KopsDeployer {
    runner: Arc<dyn CommandRunner>,
    workdir: PathBuf,
    kubeconfig: PathBuf,
    settings: KopsSettings,
}

impl KopsDeployer {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        workdir: PathBuf,
        kubeconfig: PathBuf,
        settings: KopsSettings,
    ) -> Result<Self> {
        if settings.cluster.trim().is_empty() {
            return Err(DeployError::InvalidSettings(
                "kops cluster name must not be empty".to_string(),
            ));
        }
        if settings.nodes == 0 {
            return Err(DeployError::InvalidSettings(
                "kops node count must be positive".to_string(),
            ));
        }
        if settings.zones.is_empty() {
            return Err(DeployError::InvalidSettings(
                "kops needs at least one zone".to_string(),
            ));
        }

        Ok(Self {
            runner,
            workdir,
            kubeconfig,
            settings,
        })
    }

    fn kops(&self) -> CommandSpec {
        let mut spec = CommandSpec::new(&self.settings.path)
            .current_dir(&self.workdir)
            .env("KUBECONFIG", self.kubeconfig.display().to_string());
        if let Some(ref store) = self.settings.state_store {
            spec = spec.env("KOPS_STATE_STORE", store);
        }
        spec
    }

    fn create_args(&self) -> Vec<String> {
        let mut args = vec![
            "create".to_string(),
            "cluster".to_string(),
            format!("--name={}", self.settings.cluster),
            format!("--node-count={}", self.settings.nodes),
            format!("--zones={}", self.settings.zones.join(",")),
        ];
        if let Some(ref key) = self.settings.ssh_key {
            args.push(format!("--ssh-public-key={}.pub", key.display()));
        }
        if let Some(ref version) = self.settings.kubernetes_version {
            args.push(format!("--kubernetes-version={}", version));
        }
        args.push("--yes".to_string());
        args
    }

    /// Only kops reporting the cluster as missing counts as absent; any
    /// other failure (no binary, credentials, state store) is returned.
    async fn cluster_exists(&self) -> Result<bool> {
        let lookup = self
            .runner
            .run(&self.kops().args(["get", "cluster", self.settings.cluster.as_str()]))
            .await;
        match lookup {
            Ok(()) => Ok(true),
            Err(DeployError::CommandFailed { ref stderr, .. }) if is_not_found(stderr) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl Deployer for KopsDeployer {
    fn name(&self) -> &'static str {
        "kops"
    }

    async fn bring_up(&self) -> Result<()> {
        if self.cluster_exists().await? {
            info!(cluster = %self.settings.cluster, "Cluster already exists, recreating");
            self.tear_down().await?;
        }
        info!(cluster = %self.settings.cluster, "Creating kops cluster");
        self.runner.run(&self.kops().args(self.create_args())).await
    }

    async fn is_up(&self) -> Result<()> {
        let masters = 1;
        cluster::nodes_ready(
            self.runner.as_ref(),
            &self.workdir,
            &self.kubeconfig,
            self.settings.nodes as usize + masters,
        )
        .await
    }

    async fn install_access_credentials(&self) -> Result<()> {
        self.runner
            .run(&self.kops().args(["export", "kubecfg", self.settings.cluster.as_str()]))
            .await
    }

    async fn tear_down(&self) -> Result<()> {
        if !self.cluster_exists().await? {
            warn!(cluster = %self.settings.cluster, "No kops cluster to tear down");
            return Ok(());
        }
        info!(cluster = %self.settings.cluster, "Deleting kops cluster");
        self.runner
            .run(&self.kops().args(["delete", "cluster", self.settings.cluster.as_str(), "--yes"]))
            .await
    }
}

fn is_not_found(stderr: &str) -> bool {
    let stderr = stderr.to_lowercase();
    stderr.contains("not found") || stderr.contains("notfound")
}
