//! Control-plane session server for the datastore.
//!
//! The daemon accepts TCP (optionally TLS) sessions on a configured address
//! and feeds each newline-terminated command to an interpreter that answers
//! with one JSON reply line. Sessions are served by a single worker thread
//! multiplexing a bounded pool with a readiness poll; the worker stays parked
//! until the process as a whole reaches [`gate::GlobalPhase::Started`].
//!
//! The lifecycle of that worker is an explicit state machine owned by
//! [`Datastore`]: `initialize` registers commands, `start` launches the
//! worker, `shutdown` and `stop` ask it to exit, and `finalize` tears
//! everything down. [`run_daemon`] drives the whole sequence for the
//! `datastored` binary: configuration via [`datastore_config`], structured
//! telemetry, the startup command file, and signal-driven shutdown.
//!
//! Listener settings live in [`settings::DatastoreSettings`]; preload
//! commands may change them until the process starts.
//!
//! Object-management commands resolve names through
//! [`namespace::NamespaceResolver`], which qualifies bare names with the
//! current namespace.

mod bootstrap;
mod context;
pub mod gate;
mod health;
pub mod interpreter;
pub mod multiplexer;
pub mod namespace;
mod process;
pub mod service;
pub mod settings;
pub mod telemetry;
pub mod transport;

pub use bootstrap::{
    BootstrapError, Bootstrapped, ConfigLoader, StaticConfigLoader, SystemConfigLoader,
    bootstrap_with,
};
pub use context::{ConfigFileError, Datastore};
pub use health::{HealthReporter, StructuredHealthReporter};
pub use process::{LaunchError, ShutdownError, ShutdownSignal, SystemShutdownSignal, run_daemon};
pub use telemetry::{TelemetryError, TelemetryHandle};

#[cfg(test)]
mod tests;
