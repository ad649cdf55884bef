//! Sequencing of a single end-to-end test run.

pub mod clock;
pub mod environment;
pub mod error;
pub mod executor;
pub mod finalize;
pub mod location;
pub mod metadata;
pub mod phases;
pub mod report;
pub mod state;
pub mod strategies;
pub mod watcher;
pub mod workspace;

pub use clock::{CancellationClock, Interruption, Timer, TimerState};
pub use environment::RunEnvironment;
pub use error::{OrchestratorError, Result};
pub use executor::RunOrchestrator;
pub use finalize::{FinalizeGuard, RunFinalizer};
pub use location::Location;
pub use metadata::{find_version, RunMetadata};
pub use report::{ResultRecorder, TestCase, TestSuite};
pub use watcher::{
    process_exit, ChannelSignals, CtrlC, ExitHook, SignalSource, TeardownWatcher, WatcherHandle,
};
pub use workspace::Workspace;
