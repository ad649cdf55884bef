use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::cluster;
use crate::error::{DeployError, Result};
use crate::process::{CommandRunner, CommandSpec};
use crate::settings::AnywhereSettings;
use crate::traits::Deployer;

const CONFIG_FILE: &str = ".config";

/// Provisions a GCE cluster through a kubernetes-anywhere checkout.
pub struct AnywhereDeployer {
    runner: Arc<dyn CommandRunner>,
    workdir: PathBuf,
    kubeconfig: PathBuf,
    checkout: PathBuf,
    settings: AnywhereSettings,
}

impl AnywhereDeployer {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        workdir: PathBuf,
        kubeconfig: PathBuf,
        settings: AnywhereSettings,
    ) -> Result<Self> {
        if settings.cluster.trim().is_empty() {
            return Err(DeployError::InvalidSettings(
                "kubernetes-anywhere cluster name must not be empty".to_string(),
            ));
        }
        if settings.path.as_os_str().is_empty() {
            return Err(DeployError::InvalidSettings(
                "kubernetes-anywhere path must not be empty".to_string(),
            ));
        }

        let checkout = if settings.path.is_absolute() {
            settings.path.clone()
        } else {
            workdir.join(&settings.path)
        };

        Ok(Self {
            runner,
            workdir,
            kubeconfig,
            checkout,
            settings,
        })
    }

    fn config_path(&self) -> PathBuf {
        self.checkout.join(CONFIG_FILE)
    }

    fn make(&self) -> CommandSpec {
        CommandSpec::new("make")
            .arg("-C")
            .arg(self.checkout.display().to_string())
            .current_dir(&self.workdir)
    }

    fn render_config(&self, project: &str) -> String {
        let region = region_of(&self.settings.zone);
        format!(
            ".phase1.num_nodes=4\n\
             .phase1.cluster_name=\"{cluster}\"\n\
             .phase1.cloud_provider=\"gce\"\n\
             .phase1.gce.os_image=\"ubuntu-1604-xenial-v20160420c\"\n\
             .phase1.gce.instance_type=\"n1-standard-2\"\n\
             .phase1.gce.project=\"{project}\"\n\
             .phase1.gce.region=\"{region}\"\n\
             .phase1.gce.zone=\"{zone}\"\n\
             .phase1.gce.network=\"default\"\n\
             .phase2.installer_container=\"docker.io/colemickens/k8s-ignition:latest\"\n\
             .phase2.docker_registry=\"gcr.io/google-containers\"\n\
             .phase2.kubernetes_version=\"{version}\"\n\
             .phase2.provider=\"{provider}\"\n\
             .phase3.run_addons=y\n\
             .phase3.kube_proxy=y\n\
             .phase3.dashboard=y\n\
             .phase3.heapster=y\n\
             .phase3.kube_dns=y\n",
            cluster = self.settings.cluster,
            project = project,
            region = region,
            zone = self.settings.zone,
            version = self.settings.kubernetes_version,
            provider = self.settings.phase2_provider,
        )
    }
}

fn region_of(zone: &str) -> &str {
    zone.rsplit_once('-').map(|(region, _)| region).unwrap_or(zone)
}

async fn exists(path: &Path) -> bool {
    tokio::fs::metadata(path).await.is_ok()
}

#[async_trait]
impl Deployer for AnywhereDeployer {
    fn name(&self) -> &'static str {
        "kubernetes-anywhere"
    }

    async fn bring_up(&self) -> Result<()> {
        let project = self.settings.project.as_deref().ok_or_else(|| {
            DeployError::InvalidSettings(
                "kubernetes-anywhere requires a GCP project".to_string(),
            )
        })?;

        if exists(&self.config_path()).await {
            info!(cluster = %self.settings.cluster, "Existing cluster config found, recreating");
            self.tear_down().await?;
        }

        tokio::fs::write(self.config_path(), self.render_config(project)).await?;
        info!(cluster = %self.settings.cluster, "Deploying with kubernetes-anywhere");
        self.runner
            .run(&self.make().args(["WAIT_FOR_KUBECONFIG=y", "deploy"]))
            .await
    }

    async fn is_up(&self) -> Result<()> {
        cluster::nodes_ready(self.runner.as_ref(), &self.workdir, &self.kubeconfig, 1).await
    }

    async fn install_access_credentials(&self) -> Result<()> {
        let out = self
            .runner
            .output(&self.make().args(["--silent", "kubeconfig-path"]))
            .await?;
        let generated = PathBuf::from(out.trim());
        if generated.as_os_str().is_empty() {
            return Err(DeployError::NotReady(
                "kubernetes-anywhere did not report a kubeconfig".to_string(),
            ));
        }
        let generated = if generated.is_absolute() {
            generated
        } else {
            self.checkout.join(generated)
        };

        if let Some(parent) = self.kubeconfig.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(&generated, &self.kubeconfig).await?;
        Ok(())
    }

    async fn tear_down(&self) -> Result<()> {
        let config = self.config_path();
        if !exists(&config).await {
            warn!(cluster = %self.settings.cluster, "No kubernetes-anywhere config, nothing to tear down");
            return Ok(());
        }

        self.runner
            .run(&self.make().args(["FORCE_DESTROY=y", "destroy"]))
            .await?;

        match tokio::fs::remove_file(&config).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
