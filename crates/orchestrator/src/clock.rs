//! One-shot deadlines that let a run switch from doing work to cleaning up.
//!
//! A [`Timer`] only records that its deadline passed. Nothing is aborted
//! when it fires: the executor polls [`CancellationClock::interrupted`]
//! between steps and decides what to skip.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::{OrchestratorError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    Idle,
    Armed,
    Fired,
    Drained,
}

#[derive(Debug)]
struct Slot {
    state: TimerState,
    /// Bumped on every arm and drain so a sleeper from an older cycle
    /// can never mark the current cycle as fired.
    generation: u64,
}

fn lock(slot: &Mutex<Slot>) -> MutexGuard<'_, Slot> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug)]
pub struct Timer {
    label: &'static str,
    slot: Arc<Mutex<Slot>>,
    pending: Option<JoinHandle<()>>,
}

impl Timer {
    /// A timer whose fire value has not been consumed yet. It has to be
    /// drained before its first use.
    pub fn fired(label: &'static str) -> Self {
        Self {
            label,
            slot: Arc::new(Mutex::new(Slot {
                state: TimerState::Fired,
                generation: 0,
            })),
            pending: None,
        }
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn state(&self) -> TimerState {
        lock(&self.slot).state
    }

    /// Schedule a fire no earlier than `deadline` from now.
    ///
    /// Must be called from within a tokio runtime.
    pub fn arm(&mut self, deadline: Duration) -> Result<()> {
        let generation = {
            let mut slot = lock(&self.slot);
            if matches!(slot.state, TimerState::Armed | TimerState::Fired) {
                return Err(OrchestratorError::TimerNotDrained(self.label));
            }
            slot.generation += 1;
            slot.state = TimerState::Armed;
            slot.generation
        };

        debug!(timer = self.label, ?deadline, "Arming timer");
        let slot = Arc::clone(&self.slot);
        let label = self.label;
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(deadline).await;
            let mut slot = lock(&slot);
            if slot.generation == generation && slot.state == TimerState::Armed {
                slot.state = TimerState::Fired;
                info!(timer = label, "Timer fired");
            }
        }));
        Ok(())
    }

    /// Cancel a pending fire and consume one that already happened.
    ///
    /// Returns `true` when a pending fire was cancelled.
    pub fn stop_and_drain(&mut self) -> bool {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }

        let mut slot = lock(&self.slot);
        slot.generation += 1;
        let previous = slot.state;
        slot.state = match previous {
            TimerState::Fired => TimerState::Drained,
            TimerState::Armed => TimerState::Idle,
            other => other,
        };
        previous == TimerState::Armed
    }

    /// Consume the fire value. Returns `true` at most once per arm cycle.
    pub fn take_fired(&self) -> bool {
        let mut slot = lock(&self.slot);
        if slot.state == TimerState::Fired {
            slot.state = TimerState::Drained;
            true
        } else {
            false
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }
}

/// The interrupt and terminate deadlines of one run.
///
/// Only the interrupt deadline is acted on; the terminate deadline is kept
/// drained for a future hard-kill policy.
#[derive(Debug)]
pub struct CancellationClock {
    interrupt: Timer,
    terminate: Timer,
    interrupted: bool,
}

impl Default for CancellationClock {
    fn default() -> Self {
        Self::new()
    }
}

impl CancellationClock {
    pub fn new() -> Self {
        Self {
            interrupt: Timer::fired("interrupt"),
            terminate: Timer::fired("terminate"),
            interrupted: false,
        }
    }

    /// Drain stale state and arm the interrupt deadline when `timeout` is positive.
    pub fn setup(&mut self, timeout: Duration) -> Result<()> {
        self.terminate.stop_and_drain();
        self.interrupt.stop_and_drain();
        self.interrupted = false;

        if timeout > Duration::ZERO {
            info!(?timeout, "Limiting testing to timeout");
            self.interrupt.arm(timeout)?;
        }
        Ok(())
    }

    /// Whether the interrupt deadline has passed. Sticky once observed.
    pub fn interrupted(&mut self) -> bool {
        if !self.interrupted && self.interrupt.take_fired() {
            self.interrupted = true;
        }
        self.interrupted
    }

    pub fn interrupt(&self) -> &Timer {
        &self.interrupt
    }

    pub fn terminate(&self) -> &Timer {
        &self.terminate
    }
}

/// Either reason to stop doing work: the interrupt deadline passed, or a
/// signal-triggered teardown already took the cluster down.
#[derive(Debug, Default)]
pub struct Interruption {
    clock: CancellationClock,
    signalled: Arc<AtomicBool>,
}

impl Interruption {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn setup(&mut self, timeout: Duration) -> Result<()> {
        self.signalled.store(false, Ordering::SeqCst);
        self.clock.setup(timeout)
    }

    /// Flag set by the teardown watcher.
    pub fn signal_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.signalled)
    }

    pub fn check(&mut self) -> bool {
        self.clock.interrupted() || self.signalled.load(Ordering::SeqCst)
    }

    pub fn clock(&self) -> &CancellationClock {
        &self.clock
    }
}
