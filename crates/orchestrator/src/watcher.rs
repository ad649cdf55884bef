//! Graceful teardown on Ctrl-C.
//!
//! The watcher shares the deployer with the main flow and does not
//! serialise with it: a signal during the main flow's own teardown means two
//! `tear_down` calls may overlap, which every deployer tolerates.
//!
//! Stopping the watcher never cancels a teardown that is already running;
//! [`WatcherHandle::stop`] waits for it to finish.

use async_trait::async_trait;
use deployer::{Deployer, Federation};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::finalize::RunFinalizer;

/// Called with the process exit status when teardown fails.
pub type ExitHook = Arc<dyn Fn(i32) + Send + Sync>;

pub fn process_exit() -> ExitHook {
    Arc::new(|code| std::process::exit(code))
}

#[async_trait]
pub trait SignalSource: Send {
    /// Wait for the next interrupt. `None` once no more can arrive.
    async fn recv(&mut self) -> Option<()>;
}

/// The process interrupt signal.
pub struct CtrlC;

#[async_trait]
impl SignalSource for CtrlC {
    async fn recv(&mut self) -> Option<()> {
        match tokio::signal::ctrl_c().await {
            Ok(()) => Some(()),
            Err(e) => {
                error!(error = %e, "Failed to listen for interrupt signal");
                None
            }
        }
    }
}

/// Signals delivered through a channel, for tests and embedding.
pub struct ChannelSignals(mpsc::UnboundedReceiver<()>);

impl ChannelSignals {
    pub fn new() -> (mpsc::UnboundedSender<()>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self(rx))
    }
}

#[async_trait]
impl SignalSource for ChannelSignals {
    async fn recv(&mut self) -> Option<()> {
        self.0.recv().await
    }
}

pub struct TeardownWatcher {
    deployer: Arc<dyn Deployer>,
    federation: Option<Arc<Federation>>,
    finalizer: Arc<RunFinalizer>,
    interrupted: Arc<AtomicBool>,
    exit: ExitHook,
}

impl TeardownWatcher {
    pub fn new(
        deployer: Arc<dyn Deployer>,
        federation: Option<Arc<Federation>>,
        finalizer: Arc<RunFinalizer>,
        interrupted: Arc<AtomicBool>,
        exit: ExitHook,
    ) -> Self {
        Self {
            deployer,
            federation,
            finalizer,
            interrupted,
            exit,
        }
    }

    /// Handle every signal until the source closes or the watcher is
    /// stopped. Signals already queued are handled before a stop.
    pub fn spawn(self, mut signals: Box<dyn SignalSource>) -> WatcherHandle {
        let (shutdown, mut stopped) = oneshot::channel();
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    signal = signals.recv() => match signal {
                        Some(()) => {
                            self.handle().await;
                        }
                        None => break,
                    },
                    _ = &mut stopped => break,
                }
            }
        });
        WatcherHandle { shutdown, task }
    }

    /// Tear everything down once. Returns `true` when both teardowns
    /// succeeded; otherwise the run is finalised and the exit hook called.
    pub async fn handle(&self) -> bool {
        warn!("Captured ^C, gracefully attempting to cleanup resources");
        let mut failed = false;

        if let Some(federation) = &self.federation {
            if let Err(e) = federation.tear_down().await {
                error!(error = %e, "Tearing down federation failed");
                failed = true;
            }
        }
        if let Err(e) = self.deployer.tear_down().await {
            error!(deployer = self.deployer.name(), error = %e, "Tearing down deployment failed");
            failed = true;
        }

        if failed {
            if let Err(e) = self.finalizer.finalize().await {
                error!(error = %e, "Failed to finalize run");
            }
            (self.exit)(1);
            return false;
        }

        info!("Teardown after interrupt succeeded");
        self.interrupted.store(true, Ordering::SeqCst);
        true
    }
}

/// A running [`TeardownWatcher`].
pub struct WatcherHandle {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl WatcherHandle {
    /// Stop listening, after any teardown in progress has finished.
    pub async fn stop(self) {
        let _ = self.shutdown.send(());
        if let Err(e) = self.task.await {
            error!(error = %e, "Teardown watcher task failed");
        }
        info!("Teardown watcher stopped, ^C no longer triggers cleanup");
    }
}
