//! Termination signals that end the daemon gracefully.

use std::ffi::c_int;
use std::io;

use nix::sys::signal::Signal;
use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
use signal_hook::iterator::Signals;
use thiserror::Error;
use tracing::info;

use super::PROCESS_TARGET;

/// Signals that request a graceful datastore shutdown.
pub const TERMINATION_SIGNALS: [c_int; 4] = [SIGTERM, SIGINT, SIGQUIT, SIGHUP];

/// Source of the process shutdown request.
///
/// The launcher runs [`ShutdownSignal::wait`] on a dedicated thread; a
/// successful return requests a graceful shutdown, an error a risky one.
pub trait ShutdownSignal: Send + Sync {
    /// Blocks until the daemon should shut down.
    ///
    /// # Errors
    ///
    /// Returns [`ShutdownError`] when the listener cannot be installed.
    fn wait(&self) -> Result<(), ShutdownError>;
}

/// Errors reported by shutdown signal listeners.
#[derive(Debug, Error)]
pub enum ShutdownError {
    /// The termination signal handlers could not be registered.
    #[error("failed to register termination signal handlers: {source}")]
    Install {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

/// Waits for one of [`TERMINATION_SIGNALS`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemShutdownSignal;

impl SystemShutdownSignal {
    /// Builds a signal listener.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl ShutdownSignal for SystemShutdownSignal {
    fn wait(&self) -> Result<(), ShutdownError> {
        let mut signals =
            Signals::new(TERMINATION_SIGNALS).map_err(|source| ShutdownError::Install { source })?;
        let name = signals
            .forever()
            .next()
            .and_then(|signal| Signal::try_from(signal).ok())
            .map_or("unknown", Signal::as_str);
        info!(target: PROCESS_TARGET, signal = name, "termination signal received");
        Ok(())
    }
}
