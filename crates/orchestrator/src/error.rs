use deployer::DeployError;
use kubetest_core::CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Failed to prepare test environment: {0}")]
    Prepare(String),

    #[error("{strategy} failed: {source}")]
    Strategy {
        strategy: String,
        #[source]
        source: Box<OrchestratorError>,
    },

    #[error("Called from invalid working directory: {0}")]
    InvalidWorkingDirectory(String),

    #[error("Error creating deployer: {0}")]
    DeployerCreation(#[source] DeployError),

    #[error("Step {step} failed: {reason}")]
    StepFailed { step: String, reason: String },

    #[error("Run interrupted, skipped {skipped}")]
    Interrupted { skipped: String },

    #[error("Failed to persist run state to {location}: {reason}")]
    Persist { location: String, reason: String },

    #[error("Failed to publish version to {location}: {reason}")]
    Publish { location: String, reason: String },

    #[error("Failed to write report: {0}")]
    Report(String),

    #[error("Timer {0} must be stopped and drained before it is armed again")]
    TimerNotDrained(&'static str),

    #[error("Deployer error: {0}")]
    Deploy(#[from] DeployError),

    #[error("Configuration error: {0}")]
    Config(#[from] CoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl OrchestratorError {
    /// Attach the name of the strategy that produced this error.
    pub fn in_strategy(strategy: impl Into<String>, source: OrchestratorError) -> Self {
        Self::Strategy {
            strategy: strategy.into(),
            source: Box::new(source),
        }
    }

    pub fn step_failed(step: impl Into<String>, reason: impl ToString) -> Self {
        Self::StepFailed {
            step: step.into(),
            reason: reason.to_string(),
        }
    }

    pub fn persist(location: impl Into<String>, reason: impl ToString) -> Self {
        Self::Persist {
            location: location.into(),
            reason: reason.to_string(),
        }
    }

    pub fn publish(location: impl Into<String>, reason: impl ToString) -> Self {
        Self::Publish {
            location: location.into(),
            reason: reason.to_string(),
        }
    }

    /// Errors raised before any cluster-affecting action was taken.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidWorkingDirectory(_) | Self::DeployerCreation(_) | Self::Config(_)
        )
    }
}

impl From<serde_json::Error> for OrchestratorError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
