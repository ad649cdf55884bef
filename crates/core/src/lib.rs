//! Immutable configuration for a single end-to-end test run.

pub mod domain;
pub mod error;

pub use domain::{
    BuildMode, BuildStrategy, DeploymentKind, ExtractMode, ExtractSpec, ExtractStrategy,
    RunOptions, StageStrategy, StageTarget, DEFAULT_TEST_COMMAND,
};
pub use error::{CoreError, Result};
