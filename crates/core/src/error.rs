use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CoreError {
    #[error("Unknown build mode: {0}")]
    UnknownBuildMode(String),

    #[error("Invalid stage location {location}: {reason}")]
    InvalidStageLocation { location: String, reason: String },

    #[error("Invalid extract locator: {0}")]
    InvalidExtract(String),

    #[error("Unknown deployment strategy {0:?}")]
    UnknownDeployment(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
