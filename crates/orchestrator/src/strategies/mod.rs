//! Build, stage and extract: the optional steps that produce the binaries
//! under test.
//!
//! - [`Build`] - compiles a release from the source tree
//! - [`Stage`] - uploads the built release to a bucket
//! - [`Extract`] - unpacks a release and moves the run into it

use async_trait::async_trait;

use crate::error::Result;

mod build;
mod extract;
mod stage;

pub use build::Build;
pub use extract::{Extract, SKEW_DIR, SOURCE_DIR};
pub use stage::Stage;

/// An independently enabled, side-effecting step. The run sequence only
/// calls [`Strategy::execute`] when [`Strategy::enabled`] is true.
#[async_trait]
pub trait Strategy: Send + Sync {
    /// Name the step is recorded under.
    fn name(&self) -> &'static str;

    fn enabled(&self) -> bool;

    async fn execute(&self) -> Result<()>;
}
