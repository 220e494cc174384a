//! Error types for lifecycle transitions.

use std::io;

use thiserror::Error;

use super::ServiceStatus;
use crate::interpreter::InterpreterError;

/// Errors raised by [`super::ServiceState`] transitions.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// There is no worker to operate on: the service was never initialized
    /// or has been finalized.
    #[error("cannot {operation}: the datastore worker does not exist ({status:?})")]
    InvalidObject {
        /// Transition that was attempted.
        operation: &'static str,
        /// State at the time of the call.
        status: ServiceStatus,
    },
    /// The transition is not valid from the current state.
    #[error("cannot {operation} while the datastore is {status:?}")]
    InvalidStateTransition {
        /// Transition that was attempted.
        operation: &'static str,
        /// State at the time of the call.
        status: ServiceStatus,
    },
    /// Registering a command or configurator failed.
    #[error("failed to register with the interpreter: {0}")]
    Registration(#[source] InterpreterError),
    /// The worker thread could not be spawned.
    #[error("failed to spawn the datastore worker: {0}")]
    Spawn(#[source] io::Error),
}
