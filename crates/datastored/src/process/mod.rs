//! Process-level launch sequencing and signal handling.

mod errors;
pub(crate) mod launch;
pub(crate) mod shutdown;

pub use errors::LaunchError;
pub use launch::run_daemon;
pub use shutdown::{ShutdownError, ShutdownSignal, SystemShutdownSignal};

pub(crate) const PROCESS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::process");

/// Name of the thread that turns termination signals into shutdown requests.
pub(crate) const SIGNAL_THREAD_NAME: &str = "signals";
