//! Supervises daemon launch sequencing and runtime orchestration.

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use datastore_config::Config;
use tracing::{info, warn};

use crate::bootstrap::{ConfigLoader, SystemConfigLoader, bootstrap_with};
use crate::context::Datastore;
use crate::gate::{CancelToken, GlobalGate, GlobalPhase, ShutdownGrace};
use crate::health::{HealthReporter, StructuredHealthReporter};
use crate::multiplexer::LoopError;
use crate::transport::{PollTransport, Transport, TransportError};

use super::errors::LaunchError;
use super::shutdown::{ShutdownError, ShutdownSignal, SystemShutdownSignal};
use super::{PROCESS_TARGET, SIGNAL_THREAD_NAME};

/// Collaborators required to launch the daemon runtime.
pub(crate) struct LaunchPlan<L, S, F> {
    pub(crate) loader: L,
    pub(crate) reporter: Arc<dyn HealthReporter>,
    pub(crate) shutdown: S,
    pub(crate) transport: F,
}

/// Runs the daemon using the production collaborators.
///
/// # Errors
///
/// Returns [`LaunchError`] when startup fails, when the command file cannot
/// be evaluated, or when the session worker does not stop gracefully.
pub fn run_daemon() -> Result<(), LaunchError> {
    let plan = LaunchPlan {
        loader: SystemConfigLoader,
        reporter: Arc::new(StructuredHealthReporter::new()),
        shutdown: SystemShutdownSignal::new(),
        transport: PollTransport::from_config,
    };
    run_daemon_with(plan)
}

/// Runs the daemon with injected collaborators.
pub(crate) fn run_daemon_with<L, S, T, F>(plan: LaunchPlan<L, S, F>) -> Result<(), LaunchError>
where
    L: ConfigLoader,
    S: ShutdownSignal + 'static,
    T: Transport + 'static,
    F: FnOnce(&Config) -> Result<T, TransportError>,
{
    let LaunchPlan {
        loader,
        reporter,
        shutdown,
        transport,
    } = plan;

    let datastore = bootstrap_with(&loader, reporter, transport)?.into_datastore();
    info!(target: PROCESS_TARGET, "starting datastore runtime");
    let gate = Arc::clone(datastore.gate());

    if let Err(error) = configure(&datastore) {
        finish(&datastore);
        return Err(error);
    }
    let signals = match spawn_signal_watcher(shutdown, Arc::clone(&gate)) {
        Ok(signals) => signals,
        Err(source) => {
            finish(&datastore);
            return Err(LaunchError::SignalThread { source });
        }
    };
    if let Err(error) = datastore.start() {
        finish(&datastore);
        return Err(error.into());
    }
    gate.set_phase(GlobalPhase::Started);

    let (_, grace) = gate.wait_for(GlobalPhase::ShuttingDown, None, &CancelToken::new())?;
    info!(target: PROCESS_TARGET, ?grace, "shutdown sequence started");
    datastore.shutdown(grace)?;
    let worker = finish(&datastore);

    if signals.is_finished() {
        match signals.join() {
            Ok(Err(error)) => return Err(error.into()),
            Ok(Ok(())) => {}
            Err(_) => warn!(target: PROCESS_TARGET, "signal thread panicked"),
        }
    }
    match worker {
        Some(Err(LoopError::NotStarted { phase })) => {
            info!(target: PROCESS_TARGET, ?phase, "shutdown arrived before the listener was bound");
        }
        Some(Err(error)) => return Err(error.into()),
        Some(Ok(())) | None => {}
    }
    info!(target: PROCESS_TARGET, "shutdown sequence completed");
    Ok(())
}

fn configure<T: Transport + 'static>(datastore: &Datastore<T>) -> Result<(), LaunchError> {
    datastore.initialize()?;
    datastore.preload_config()?;
    datastore.load_config()?;
    Ok(())
}

fn finish<T: Transport + 'static>(datastore: &Datastore<T>) -> Option<Result<(), LoopError>> {
    datastore.gate().request_shutdown(ShutdownGrace::Riskily);
    datastore.finalize()
}

fn spawn_signal_watcher<S>(
    shutdown: S,
    gate: Arc<GlobalGate>,
) -> io::Result<JoinHandle<Result<(), ShutdownError>>>
where
    S: ShutdownSignal + 'static,
{
    thread::Builder::new()
        .name(SIGNAL_THREAD_NAME.to_owned())
        .spawn(move || match shutdown.wait() {
            Ok(()) => {
                gate.request_shutdown(ShutdownGrace::Gracefully);
                Ok(())
            }
            Err(error) => {
                warn!(target: PROCESS_TARGET, %error, "signal listener failed");
                gate.request_shutdown(ShutdownGrace::Riskily);
                Err(error)
            }
        })
}
