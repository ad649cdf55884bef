use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Backend specific settings, usually read from the `--deployer-config` file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployerSettings {
    #[serde(default)]
    pub kops: KopsSettings,
    #[serde(default)]
    pub kubernetes_anywhere: AnywhereSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KopsSettings {
    /// kops binary to invoke
    pub path: String,
    pub cluster: String,
    /// Value for KOPS_STATE_STORE, when not inherited from the environment
    pub state_store: Option<String>,
    pub zones: Vec<String>,
    pub nodes: u32,
    pub ssh_key: Option<PathBuf>,
    pub kubernetes_version: Option<String>,
}

impl Default for KopsSettings {
    fn default() -> Self {
        Self {
            path: "kops".to_string(),
            cluster: "e2e-kops.k8s.local".to_string(),
            state_store: None,
            zones: vec!["us-west-2a".to_string()],
            nodes: 2,
            ssh_key: None,
            kubernetes_version: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnywhereSettings {
    /// Checkout of kubernetes-anywhere, relative paths resolve against the run directory
    pub path: PathBuf,
    pub cluster: String,
    pub phase2_provider: String,
    pub project: Option<String>,
    pub zone: String,
    pub kubernetes_version: String,
}

impl Default for AnywhereSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("kubernetes-anywhere"),
            cluster: "e2e-anywhere".to_string(),
            phase2_provider: "ignition".to_string(),
            project: None,
            zone: "us-central1-c".to_string(),
            kubernetes_version: "latest".to_string(),
        }
    }
}
