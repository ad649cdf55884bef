//! Cluster lifecycle backends and the subprocess plumbing they share.

pub mod anywhere;
pub mod bash;
pub mod cluster;
pub mod error;
pub mod federation;
pub mod kops;
pub mod none;
pub mod process;
pub mod select;
pub mod settings;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod traits;

pub use anywhere::AnywhereDeployer;
pub use bash::BashDeployer;
pub use error::{DeployError, Result};
pub use federation::Federation;
pub use kops::KopsDeployer;
pub use none::NoneDeployer;
pub use process::{CommandRunner, CommandSpec, SystemRunner};
pub use select::{select_deployer, select_deployer_by_name, DeployContext};
pub use settings::{AnywhereSettings, DeployerSettings, KopsSettings};
pub use traits::Deployer;
