//! Process-wide phase barrier shared by the daemon's subsystems.
//!
//! The session worker must not bind its listener before the process as a
//! whole reaches [`GlobalPhase::Started`]; the gate lets it block until then
//! while staying responsive to cancellation.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::debug;

const GATE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::gate");

/// Phases of the daemon process, in the order they are reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GlobalPhase {
    /// Subsystems are still being constructed and configured.
    Initializing,
    /// Startup finished; subsystems may begin serving.
    Started,
    /// A shutdown has been requested.
    ShuttingDown,
}

/// How a requested shutdown should treat in-flight work.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ShutdownGrace {
    /// Finish the current iteration and report success.
    #[default]
    Gracefully,
    /// Stop as soon as possible; the exit is reported as a failure.
    Riskily,
}

/// Errors reported by [`GlobalGate::wait_for`].
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum GateError {
    /// The deadline passed before the target phase was reached.
    #[error("timed out waiting for the global phase (reached {reached:?})")]
    TimedOut {
        /// Phase in effect when the wait gave up.
        reached: GlobalPhase,
    },
    /// The waiter was cancelled.
    #[error("wait for the global phase was cancelled")]
    Cancelled,
}

/// Cooperative cancellation flag shared between a controller and a worker.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    /// Builds a token that has not been cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
struct GateState {
    phase: GlobalPhase,
    grace: ShutdownGrace,
}

/// Condvar-backed barrier tracking the current [`GlobalPhase`].
#[derive(Debug)]
pub struct GlobalGate {
    state: Mutex<GateState>,
    changed: Condvar,
    janitor_calls: AtomicUsize,
}

impl Default for GlobalGate {
    fn default() -> Self {
        Self::new()
    }
}

impl GlobalGate {
    /// Builds a gate in the [`GlobalPhase::Initializing`] phase.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(GateState {
                phase: GlobalPhase::Initializing,
                grace: ShutdownGrace::Gracefully,
            }),
            changed: Condvar::new(),
            janitor_calls: AtomicUsize::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> GlobalPhase {
        self.lock().phase
    }

    /// Advances to `phase` and wakes every waiter. Phases never move
    /// backwards; an older phase is ignored.
    pub fn set_phase(&self, phase: GlobalPhase) {
        let mut state = self.lock();
        if phase > state.phase {
            debug!(target: GATE_TARGET, from = ?state.phase, to = ?phase, "global phase advanced");
            state.phase = phase;
        }
        self.changed.notify_all();
    }

    /// Moves to [`GlobalPhase::ShuttingDown`], recording how the shutdown
    /// should be carried out.
    pub fn request_shutdown(&self, grace: ShutdownGrace) {
        let mut state = self.lock();
        if state.phase < GlobalPhase::ShuttingDown {
            debug!(target: GATE_TARGET, ?grace, "global shutdown requested");
            state.phase = GlobalPhase::ShuttingDown;
            state.grace = grace;
        }
        self.changed.notify_all();
    }

    /// Wakes every waiter so it can re-check its cancellation token.
    pub fn wake_waiters(&self) {
        let _state = self.lock();
        self.changed.notify_all();
    }

    /// Blocks until the phase reaches `target`, `timeout` elapses, or
    /// `cancel` is triggered. `None` waits indefinitely.
    ///
    /// Returns the phase actually reached, which can be later than `target`,
    /// together with the recorded shutdown grace.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::Cancelled`] when `cancel` fires first and
    /// [`GateError::TimedOut`] when the deadline passes.
    pub fn wait_for(
        &self,
        target: GlobalPhase,
        timeout: Option<Duration>,
        cancel: &CancelToken,
    ) -> Result<(GlobalPhase, ShutdownGrace), GateError> {
        let deadline = timeout.map(|limit| Instant::now() + limit);
        let mut state = self.lock();
        loop {
            if state.phase >= target {
                return Ok((state.phase, state.grace));
            }
            if cancel.is_cancelled() {
                return Err(GateError::Cancelled);
            }
            state = match deadline {
                None => self
                    .changed
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner),
                Some(until) => {
                    let now = Instant::now();
                    if now >= until {
                        return Err(GateError::TimedOut {
                            reached: state.phase,
                        });
                    }
                    self.changed
                        .wait_timeout(state, until - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };
        }
    }

    /// Acknowledges that a waiter was cancelled before the phase it awaited
    /// was reached.
    pub fn cancel_janitor(&self) {
        let calls = self.janitor_calls.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(target: GATE_TARGET, calls, "cancelled waiter acknowledged");
    }

    /// Number of cancellation acknowledgements received.
    #[must_use]
    pub fn janitor_acknowledgements(&self) -> usize {
        self.janitor_calls.load(Ordering::SeqCst)
    }
}
