use kubetest_core::CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeployError {
    #[error("Command `{command}` failed ({status}): {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("Command not found: {0}")]
    CommandNotFound(String),

    #[error("Invalid deployer settings: {0}")]
    InvalidSettings(String),

    #[error("Cluster not ready: {0}")]
    NotReady(String),

    #[error("Configuration error: {0}")]
    Config(#[from] CoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DeployError>;
