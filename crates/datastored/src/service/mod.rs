//! Lifecycle state machine for the datastore session worker.
//!
//! ```text
//! Uninitialized --initialize--> Initialized --start--> Running
//!                                    ^                    |
//!                                    +--shutdown / stop---+
//! any --finalize--> Finalized
//! ```
//!
//! Every transition takes the same lock for its check-and-mutate step.
//! Transitions are expected from a single control thread; the worker itself
//! only observes the [`LoopControl`] flags of its run.

mod errors;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use tracing::{debug, info, warn};

use crate::gate::{GlobalGate, ShutdownGrace};
use crate::health::HealthReporter;
use crate::interpreter::{Command, SESSION_CONFIGURATOR, SharedInterpreter};
use crate::multiplexer::{LoopControl, LoopError, SessionMultiplexer};
use crate::settings::DatastoreSettings;
use crate::transport::Transport;

pub use self::errors::ServiceError;

const SERVICE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::service");

/// Name of the session worker thread.
pub const WORKER_THREAD_NAME: &str = "datastore";

/// Observable lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceStatus {
    /// Nothing registered, no worker prepared.
    Uninitialized,
    /// Commands registered and the worker prepared but not running.
    Initialized,
    /// The worker was started and has not been told to stop.
    Running,
    /// Torn down; no further transitions are possible.
    Finalized,
}

type WorkerResult = Result<(), LoopError>;

#[derive(Debug, Default)]
struct Worker {
    control: Option<Arc<LoopControl>>,
    handle: Option<JoinHandle<WorkerResult>>,
    last_result: Option<WorkerResult>,
}

impl Worker {
    fn signal_cancel(&self, gate: &GlobalGate) {
        if let Some(control) = &self.control {
            control.cancel();
        }
        gate.wake_waiters();
    }

    fn join(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        let result = handle.join().unwrap_or(Err(LoopError::Panicked));
        self.last_result = Some(result);
    }
}

#[derive(Debug)]
struct Inner {
    status: ServiceStatus,
    worker: Option<Worker>,
}

/// Owns the session worker and serializes lifecycle transitions.
pub struct ServiceState<T: Transport> {
    inner: Mutex<Inner>,
    transport: Arc<T>,
    settings: Arc<DatastoreSettings>,
    gate: Arc<GlobalGate>,
    interpreter: SharedInterpreter,
    health: Arc<dyn HealthReporter>,
}

impl<T: Transport + 'static> ServiceState<T> {
    /// Builds an uninitialized service over shared datastore state.
    #[must_use]
    pub fn new(
        transport: Arc<T>,
        settings: Arc<DatastoreSettings>,
        gate: Arc<GlobalGate>,
        interpreter: SharedInterpreter,
        health: Arc<dyn HealthReporter>,
    ) -> Self {
        Self {
            inner: Mutex::new(Inner {
                status: ServiceStatus::Uninitialized,
                worker: None,
            }),
            transport,
            settings,
            gate,
            interpreter,
            health,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn status(&self) -> ServiceStatus {
        self.lock().status
    }

    /// Registers `commands` and the session configurator, then prepares the
    /// worker. A second call succeeds without side effects.
    ///
    /// A registration failure is returned as is; registrations made before
    /// it stay in place.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::InvalidObject`] after finalization and
    /// [`ServiceError::Registration`] when the interpreter refuses a
    /// registration.
    pub fn initialize(&self, commands: Vec<Arc<dyn Command>>) -> Result<(), ServiceError> {
        let mut inner = self.lock();
        match inner.status {
            ServiceStatus::Initialized | ServiceStatus::Running => return Ok(()),
            ServiceStatus::Finalized => {
                return Err(ServiceError::InvalidObject {
                    operation: "initialize",
                    status: inner.status,
                });
            }
            ServiceStatus::Uninitialized => {}
        }

        {
            let mut interpreter = self
                .interpreter
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            for command in commands {
                interpreter
                    .register_command(command)
                    .map_err(ServiceError::Registration)?;
            }
            interpreter
                .register_configurator(SESSION_CONFIGURATOR)
                .map_err(ServiceError::Registration)?;
        }

        inner.worker = Some(Worker::default());
        inner.status = ServiceStatus::Initialized;
        debug!(target: SERVICE_TARGET, "datastore initialized");
        Ok(())
    }

    /// Launches the worker thread running the event loop.
    ///
    /// A stopped service can be started again once its previous worker has
    /// exited.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::InvalidObject`] when there is no worker,
    /// [`ServiceError::InvalidStateTransition`] when it is already running or
    /// the previous run has not exited yet, and [`ServiceError::Spawn`] when
    /// the thread cannot be created.
    pub fn start(&self) -> Result<(), ServiceError> {
        let mut inner = self.lock();
        let status = inner.status;
        if status == ServiceStatus::Running {
            return Err(ServiceError::InvalidStateTransition {
                operation: "start",
                status,
            });
        }
        let Some(worker) = inner.worker.as_mut() else {
            return Err(ServiceError::InvalidObject {
                operation: "start",
                status,
            });
        };
        if worker
            .handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
        {
            return Err(ServiceError::InvalidStateTransition {
                operation: "start",
                status,
            });
        }
        worker.join();

        let control = Arc::new(LoopControl::new());
        let multiplexer = SessionMultiplexer::new(
            Arc::clone(&self.transport),
            Arc::clone(&self.settings),
            Arc::clone(&self.gate),
            Arc::clone(&self.interpreter),
            Arc::clone(&self.health),
            Arc::clone(&control),
        );
        let health = Arc::clone(&self.health);
        let gate = Arc::clone(&self.gate);
        let handle = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_owned())
            .spawn(move || {
                let result = multiplexer.run();
                health.worker_exited(&result);
                if result.as_ref().is_err_and(LoopError::is_setup_failure) {
                    gate.request_shutdown(ShutdownGrace::Riskily);
                }
                result
            })
            .map_err(ServiceError::Spawn)?;

        worker.control = Some(control);
        worker.handle = Some(handle);
        inner.status = ServiceStatus::Running;
        info!(target: SERVICE_TARGET, "datastore worker started");
        Ok(())
    }

    /// Clears the run flag so the loop exits after its current iteration.
    /// Does not wait for the exit.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::InvalidStateTransition`] before
    /// initialization and [`ServiceError::InvalidObject`] after
    /// finalization.
    pub fn shutdown(&self, grace: ShutdownGrace) -> Result<(), ServiceError> {
        let mut inner = self.lock();
        let worker = Self::live_worker(&inner, "shutdown")?;
        if let Some(control) = &worker.control {
            if grace == ShutdownGrace::Gracefully {
                control.mark_graceful();
            }
            control.stop_running();
        }
        inner.status = ServiceStatus::Initialized;
        info!(target: SERVICE_TARGET, ?grace, "datastore shutdown requested");
        Ok(())
    }

    /// Cancels the worker, waking it if it is still waiting for startup.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::InvalidStateTransition`] before
    /// initialization and [`ServiceError::InvalidObject`] after
    /// finalization.
    pub fn stop(&self) -> Result<(), ServiceError> {
        let mut inner = self.lock();
        let worker = Self::live_worker(&inner, "stop")?;
        worker.signal_cancel(&self.gate);
        inner.status = ServiceStatus::Initialized;
        info!(target: SERVICE_TARGET, "datastore stop requested");
        Ok(())
    }

    fn live_worker<'a>(inner: &'a Inner, operation: &'static str) -> Result<&'a Worker, ServiceError> {
        match (inner.status, inner.worker.as_ref()) {
            (ServiceStatus::Finalized, _) => Err(ServiceError::InvalidObject {
                operation,
                status: inner.status,
            }),
            (_, Some(worker)) => Ok(worker),
            (status, None) => Err(ServiceError::InvalidStateTransition { operation, status }),
        }
    }

    /// Tears the service down: cancels and joins a worker that is still
    /// running, unregisters the session configurator, and drops the worker.
    ///
    /// Returns the result of the last worker run, if there was one. Safe to
    /// call in any state; later calls return `None`.
    #[must_use = "the worker result reports how the last run ended"]
    pub fn finalize(&self) -> Option<Result<(), LoopError>> {
        let mut inner = self.lock();
        if inner.status == ServiceStatus::Finalized {
            return None;
        }
        let result = inner.worker.take().and_then(|mut worker| {
            worker.signal_cancel(&self.gate);
            worker.join();
            worker.last_result
        });
        if inner.status != ServiceStatus::Uninitialized
            && let Err(error) = self
                .interpreter
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .unregister_configurator(SESSION_CONFIGURATOR)
        {
            warn!(target: SERVICE_TARGET, %error, "failed to unregister session configurator");
        }
        inner.status = ServiceStatus::Finalized;
        debug!(target: SERVICE_TARGET, "datastore finalized");
        result
    }
}

impl<T: Transport> Drop for ServiceState<T> {
    fn drop(&mut self) {
        let inner = self.inner.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(worker) = inner.worker.as_mut() {
            worker.signal_cancel(&self.gate);
            worker.join();
        }
    }
}
