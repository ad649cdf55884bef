//! The phases a run moves through, in order:
//!
//! - [`prepare`] - credentials, artifacts directory, PATH
//! - [`acquire`] - build, stage and extract the binaries under test
//! - [`RunBody`] - cluster lifecycle and the test command
//! - [`persist`] / [`publish`] - keep what later runs need

mod acquire;
mod body;
mod persist;
mod prepare;

pub use acquire::{acquire, rewrite_extract, ExtractRewrite};
pub use body::{RunBody, Step};
pub use persist::{persist, publish, should_persist};
pub use prepare::prepare;
