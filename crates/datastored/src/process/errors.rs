//! Defines the error surface for daemon launch and supervision.

use thiserror::Error;

use crate::bootstrap::BootstrapError;
use crate::context::ConfigFileError;
use crate::gate::GateError;
use crate::multiplexer::LoopError;
use crate::service::ServiceError;

use super::shutdown::ShutdownError;

/// Errors surfaced while launching or supervising the daemon process.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// Bootstrapping the daemon failed.
    #[error("daemon bootstrap failed: {source}")]
    Bootstrap {
        /// Underlying bootstrap error.
        #[source]
        source: BootstrapError,
    },
    /// A lifecycle transition was refused.
    #[error("datastore lifecycle failed: {source}")]
    Service {
        /// Underlying lifecycle error.
        #[source]
        source: ServiceError,
    },
    /// The startup command file could not be evaluated.
    #[error("datastore command file failed: {source}")]
    ConfigFile {
        /// Underlying evaluation error.
        #[source]
        source: ConfigFileError,
    },
    /// The signal thread could not be spawned.
    #[error("failed to spawn the signal thread: {source}")]
    SignalThread {
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },
    /// Waiting for shutdown failed.
    #[error("failed to await shutdown signal: {source}")]
    Shutdown {
        /// Underlying shutdown error.
        #[source]
        source: ShutdownError,
    },
    /// Waiting on the global phase gate failed.
    #[error("failed to await the shutdown phase: {source}")]
    Gate {
        /// Underlying gate error.
        #[source]
        source: GateError,
    },
    /// The session worker exited with an error.
    #[error("datastore worker failed: {source}")]
    Worker {
        /// Result reported by the worker.
        #[source]
        source: LoopError,
    },
}

impl From<BootstrapError> for LaunchError {
    fn from(source: BootstrapError) -> Self {
        Self::Bootstrap { source }
    }
}

impl From<ServiceError> for LaunchError {
    fn from(source: ServiceError) -> Self {
        Self::Service { source }
    }
}

impl From<ConfigFileError> for LaunchError {
    fn from(source: ConfigFileError) -> Self {
        Self::ConfigFile { source }
    }
}

impl From<ShutdownError> for LaunchError {
    fn from(source: ShutdownError) -> Self {
        Self::Shutdown { source }
    }
}

impl From<GateError> for LaunchError {
    fn from(source: GateError) -> Self {
        Self::Gate { source }
    }
}

impl From<LoopError> for LaunchError {
    fn from(source: LoopError) -> Self {
        Self::Worker { source }
    }
}
