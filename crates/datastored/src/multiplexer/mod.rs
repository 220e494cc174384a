//! Event loop that serves datastore sessions on the worker thread.
//!
//! The loop waits for the process to reach [`GlobalPhase::Started`], takes a
//! snapshot of the listener settings, binds the listening session into slot 0
//! of a bounded [`SessionPool`] with room for `session_max` clients, and then
//! alternates between a readiness poll and a scan of the ready slots: the
//! listener accepts, connections feed their input to the interpreter, and
//! broken or finished connections are reclaimed.

mod pool;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use datastore_config::{BindAddressError, Config};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::gate::{CancelToken, GateError, GlobalGate, GlobalPhase};
use crate::health::HealthReporter;
use crate::interpreter::{
    EvalOutcome, InterpreterBridge, SESSION_CONFIGURATOR, SharedInterpreter,
};
use crate::settings::DatastoreSettings;
use crate::transport::{ProtocolDescriptor, Session, Transport, TransportError};

pub use self::pool::SessionPool;

const MULTIPLEXER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::multiplexer");
const ERROR_BACKOFF: Duration = Duration::from_millis(150);

/// Errors that end a run of the event loop.
#[derive(Debug, Error)]
pub enum LoopError {
    /// The process began shutting down before it ever started.
    #[error("process reached {phase:?} before starting; listener not bound")]
    NotStarted {
        /// Phase reported by the gate.
        phase: GlobalPhase,
    },
    /// The listening session could not be created.
    #[error("failed to create listening session: {0}")]
    Listen(#[source] TransportError),
    /// The configured bind address could not be resolved.
    #[error("failed to resolve bind address: {0}")]
    Address(#[from] BindAddressError),
    /// The listening session could not be bound.
    #[error("failed to bind listening session to {addr}: {source}")]
    Bind {
        /// Address that could not be bound.
        addr: SocketAddr,
        /// Underlying failure.
        #[source]
        source: TransportError,
    },
    /// Read interest could not be registered on the listener.
    #[error("failed to watch listening session: {0}")]
    Watch(#[source] TransportError),
    /// The configuration admits no client sessions.
    #[error("session_max must be at least 1")]
    NoCapacity,
    /// The loop stopped without a graceful shutdown request.
    #[error("event loop stopped without a graceful shutdown")]
    Ungraceful,
    /// The loop was cancelled.
    #[error("event loop was cancelled")]
    Cancelled,
    /// The worker thread panicked.
    #[error("datastore worker panicked")]
    Panicked,
}

impl LoopError {
    /// Whether the run failed before the listener was serving.
    #[must_use]
    pub const fn is_setup_failure(&self) -> bool {
        matches!(
            self,
            Self::Listen(_) | Self::Address(_) | Self::Bind { .. } | Self::Watch(_) | Self::NoCapacity
        )
    }
}

/// Flags shared between the lifecycle controller and one worker run.
#[derive(Debug)]
pub struct LoopControl {
    running: AtomicBool,
    graceful: AtomicBool,
    cancel: CancelToken,
}

impl Default for LoopControl {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopControl {
    /// Flags for a run that should keep going until told otherwise.
    #[must_use]
    pub fn new() -> Self {
        Self {
            running: AtomicBool::new(true),
            graceful: AtomicBool::new(false),
            cancel: CancelToken::new(),
        }
    }

    /// Whether the loop should keep iterating.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Asks the loop to stop after the current iteration.
    pub fn stop_running(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Records that the coming stop is graceful.
    pub fn mark_graceful(&self) {
        self.graceful.store(true, Ordering::SeqCst);
    }

    /// Whether a graceful stop was requested.
    #[must_use]
    pub fn is_graceful(&self) -> bool {
        self.graceful.load(Ordering::SeqCst)
    }

    /// Requests cancellation of the run.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Token observed by the gate wait.
    #[must_use]
    pub const fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }
}

/// Everything one run of the event loop needs.
pub struct SessionMultiplexer<T: Transport> {
    transport: Arc<T>,
    settings: Arc<DatastoreSettings>,
    gate: Arc<GlobalGate>,
    interpreter: SharedInterpreter,
    health: Arc<dyn HealthReporter>,
    control: Arc<LoopControl>,
}

impl<T: Transport> SessionMultiplexer<T> {
    /// Assembles a loop over shared datastore state.
    #[must_use]
    pub fn new(
        transport: Arc<T>,
        settings: Arc<DatastoreSettings>,
        gate: Arc<GlobalGate>,
        interpreter: SharedInterpreter,
        health: Arc<dyn HealthReporter>,
        control: Arc<LoopControl>,
    ) -> Self {
        Self {
            transport,
            settings,
            gate,
            interpreter,
            health,
            control,
        }
    }

    /// Runs the loop to completion on the calling thread.
    ///
    /// # Errors
    ///
    /// Returns [`LoopError::Ungraceful`] when the run flag was cleared
    /// without a graceful request, [`LoopError::Cancelled`] after a
    /// cancellation, [`LoopError::NotStarted`] when the process shut down
    /// before starting, and the setup failure when the listener could not
    /// be prepared.
    pub fn run(self) -> Result<(), LoopError> {
        match self
            .gate
            .wait_for(GlobalPhase::Started, None, self.control.cancel_token())
        {
            Ok((GlobalPhase::Started, _)) => {}
            Ok((phase, _)) | Err(GateError::TimedOut { reached: phase }) => {
                info!(target: MULTIPLEXER_TARGET, ?phase, "process did not start; worker exiting");
                return Err(LoopError::NotStarted { phase });
            }
            Err(GateError::Cancelled) => {
                debug!(target: MULTIPLEXER_TARGET, "cancelled while waiting for startup");
                self.gate.cancel_janitor();
                self.lock_interpreter().cancel_janitor();
                return Err(LoopError::Cancelled);
            }
        }

        let config = self.settings.snapshot();
        let mut pool = self.setup(&config)?;
        let result = self.serve(&mut pool, &config);
        pool.clear();
        result
    }

    fn lock_interpreter(&self) -> MutexGuard<'_, dyn InterpreterBridge + 'static> {
        self.interpreter
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn setup(&self, config: &Config) -> Result<SessionPool<T::Session>, LoopError> {
        if config.session_max() == 0 {
            return Err(LoopError::NoCapacity);
        }
        if config.tls() {
            self.transport
                .prepare_tls(config.tls_certificate(), config.tls_private_key())
                .map_err(LoopError::Listen)?;
        }
        let descriptor = ProtocolDescriptor::listener(config.protocol(), config.tls());
        let mut listener = self.transport.listen(descriptor).map_err(LoopError::Listen)?;
        let addr = config.bind_socket_address()?;
        listener
            .bind(addr)
            .map_err(|source| LoopError::Bind { addr, source })?;
        listener.set_read_interest().map_err(LoopError::Watch)?;

        // Slot 0 belongs to the listener on top of the client bound.
        let mut pool = SessionPool::with_capacity(config.session_max().saturating_add(1));
        pool.push(listener).map_err(|_| LoopError::NoCapacity)?;
        self.health.listener_ready(addr);
        Ok(pool)
    }

    fn serve(&self, pool: &mut SessionPool<T::Session>, config: &Config) -> Result<(), LoopError> {
        let timeout = Duration::from_millis(config.poll_interval_ms());
        let mut diagnostics = String::new();
        while self.control.is_running() && !self.control.is_cancelled() {
            let ready = match self.transport.poll(pool.as_mut_slice(), timeout) {
                Ok(ready) => ready,
                Err(error) if error.is_transient() => continue,
                Err(error) => {
                    self.health.poll_failed(&error);
                    thread::sleep(ERROR_BACKOFF);
                    continue;
                }
            };
            if ready > 0 {
                self.dispatch(pool, ready, config, &mut diagnostics);
            }
        }

        if self.control.is_cancelled() {
            self.lock_interpreter().cancel_janitor();
        }
        // A shutdown request decides the result even if a cancel followed it.
        if self.control.is_running() {
            return Err(LoopError::Cancelled);
        }
        if self.control.is_graceful() {
            Ok(())
        } else {
            Err(LoopError::Ungraceful)
        }
    }

    fn dispatch(
        &self,
        pool: &mut SessionPool<T::Session>,
        ready: usize,
        config: &Config,
        diagnostics: &mut String,
    ) {
        let mut remaining = ready;
        let mut index = 0;
        while remaining > 0 {
            let Some(session) = pool.get_mut(index) else {
                break;
            };
            let keep = match session.is_readable() {
                Ok(false) => {
                    index += 1;
                    continue;
                }
                Ok(true) if session.is_passive() => {
                    self.accept(pool, index, config.session_max());
                    true
                }
                Ok(true) => self.evaluate(session, diagnostics),
                Err(error) => {
                    debug!(
                        target: MULTIPLEXER_TARGET,
                        peer = ?session.peer_addr(),
                        %error,
                        "session readiness check failed"
                    );
                    false
                }
            };
            remaining -= 1;
            if keep {
                index += 1;
            } else {
                // The last slot moves into `index` and has not been visited.
                pool.remove(index);
            }
        }
    }

    fn accept(&self, pool: &mut SessionPool<T::Session>, index: usize, session_max: usize) {
        let Some(listener) = pool.get_mut(index) else {
            return;
        };
        let mut session = match listener.accept() {
            Ok(session) => session,
            Err(error) if error.is_transient() => return,
            Err(error) => {
                warn!(target: MULTIPLEXER_TARGET, %error, "failed to accept connection");
                return;
            }
        };
        if pool.is_full() {
            self.health.session_rejected(session_max);
            return;
        }
        if let Err(error) = session.set_read_interest() {
            warn!(target: MULTIPLEXER_TARGET, %error, "failed to watch accepted connection");
            return;
        }
        if pool.push(session).is_err() {
            self.health.session_rejected(session_max);
        }
    }

    fn evaluate(&self, session: &mut T::Session, diagnostics: &mut String) -> bool {
        diagnostics.clear();
        let peer = session.peer_addr();
        let outcome = self
            .lock_interpreter()
            .evaluate_session(SESSION_CONFIGURATOR, session, diagnostics);
        match outcome {
            Ok(EvalOutcome::Complete | EvalOutcome::Incomplete) => true,
            Ok(EvalOutcome::EndOfStream) => {
                debug!(target: MULTIPLEXER_TARGET, ?peer, "session closed by peer");
                false
            }
            Err(error) => {
                if diagnostics.is_empty() {
                    warn!(target: MULTIPLEXER_TARGET, ?peer, %error, "command evaluation failed");
                } else {
                    warn!(
                        target: MULTIPLEXER_TARGET,
                        ?peer,
                        diagnostics = %diagnostics,
                        "command evaluation failed"
                    );
                }
                true
            }
        }
    }
}
