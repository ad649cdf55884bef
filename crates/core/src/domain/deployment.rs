use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// Closed set of cluster lifecycle backends a run can be driven with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeploymentKind {
    None,
    Bash,
    Kops,
    KubernetesAnywhere,
}

impl DeploymentKind {
    pub const ALL: [DeploymentKind; 4] = [
        DeploymentKind::None,
        DeploymentKind::Bash,
        DeploymentKind::Kops,
        DeploymentKind::KubernetesAnywhere,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Bash => "bash",
            Self::Kops => "kops",
            Self::KubernetesAnywhere => "kubernetes-anywhere",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "none" => Some(Self::None),
            "bash" => Some(Self::Bash),
            "kops" => Some(Self::Kops),
            "kubernetes-anywhere" => Some(Self::KubernetesAnywhere),
            _ => None,
        }
    }
}

impl FromStr for DeploymentKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| CoreError::UnknownDeployment(s.to_string()))
    }
}

impl fmt::Display for DeploymentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_round_trips_every_kind() {
        for kind in DeploymentKind::ALL {
            assert_eq!(kind.as_str().parse::<DeploymentKind>(), Ok(kind));
        }
    }

    #[test]
    fn test_unknown_name_is_rejected() {
        for name in ["", "Bash", "gke", "kubernetes_anywhere", " none"] {
            assert_eq!(
                name.parse::<DeploymentKind>(),
                Err(CoreError::UnknownDeployment(name.to_string()))
            );
        }
    }

    #[test]
    fn test_serialization() {
        let json = serde_json::to_string(&DeploymentKind::KubernetesAnywhere).unwrap();
        assert_eq!(json, "\"kubernetes-anywhere\"");
    }
}
