//! Test harness utilities shared by the datastore suites.

mod config;
mod reporter;
mod transport;

pub use config::{TestConfigLoader, free_port, test_config, wait_until};
pub use reporter::{HealthEvent, RecordingHealthReporter};
pub use transport::{ConnHandle, ScriptedTransport};
