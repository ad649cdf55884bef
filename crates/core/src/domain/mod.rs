mod deployment;
mod extract;
mod options;
mod strategy;

pub use deployment::DeploymentKind;
pub use extract::{ExtractMode, ExtractSpec, ExtractStrategy};
pub use options::{RunOptions, DEFAULT_TEST_COMMAND};
pub use strategy::{BuildMode, BuildStrategy, StageStrategy, StageTarget};
