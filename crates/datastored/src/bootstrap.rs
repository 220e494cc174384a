//! Daemon bootstrap orchestration.

use std::sync::Arc;

use ortho_config::OrthoError;
use thiserror::Error;

use datastore_config::Config;

use crate::context::Datastore;
use crate::health::HealthReporter;
use crate::telemetry::{self, TelemetryError, TelemetryHandle};
use crate::transport::{Transport, TransportError};

/// Trait abstracting configuration loading for testability.
pub trait ConfigLoader: Send + Sync {
    /// Loads the daemon configuration.
    fn load(&self) -> Result<Config, Arc<OrthoError>>;
}

/// Loader that delegates to [`Config::load`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemConfigLoader;

impl ConfigLoader for SystemConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Config::load()
    }
}

/// Loader that hands out a fixed configuration.
#[derive(Debug, Clone)]
pub struct StaticConfigLoader {
    config: Config,
}

impl StaticConfigLoader {
    /// Wraps an already resolved configuration.
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config }
    }
}

impl ConfigLoader for StaticConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Ok(self.config.clone())
    }
}

/// Errors surfaced during bootstrap.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Configuration failed to load.
    #[error("failed to load configuration: {source}")]
    Configuration {
        /// Underlying loader error.
        #[source]
        source: Arc<OrthoError>,
    },
    /// Telemetry initialisation failed.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        /// Underlying telemetry error.
        #[source]
        source: TelemetryError,
    },
    /// The session transport could not be prepared.
    #[error("failed to prepare session transport: {source}")]
    Transport {
        /// Underlying transport error.
        #[source]
        source: TransportError,
    },
}

/// Result of a successful bootstrap invocation.
pub struct Bootstrapped<T: Transport> {
    datastore: Datastore<T>,
    telemetry: TelemetryHandle,
}

impl<T: Transport + 'static> Bootstrapped<T> {
    /// The constructed, not yet initialized, datastore context.
    #[must_use]
    pub const fn datastore(&self) -> &Datastore<T> {
        &self.datastore
    }

    /// Consumes the bootstrap result, keeping the datastore context.
    #[must_use]
    pub fn into_datastore(self) -> Datastore<T> {
        self.datastore
    }

    /// Accessor for the telemetry handle, primarily useful for testing.
    #[must_use]
    pub const fn telemetry(&self) -> TelemetryHandle {
        self.telemetry
    }
}

/// Bootstraps the datastore using the supplied collaborators.
///
/// `build_transport` builds the session transport from the resolved
/// configuration, which is where TLS material is read.
///
/// # Errors
///
/// Returns the first failing stage as a [`BootstrapError`] after reporting
/// it through `reporter`.
pub fn bootstrap_with<T, F>(
    loader: &dyn ConfigLoader,
    reporter: Arc<dyn HealthReporter>,
    build_transport: F,
) -> Result<Bootstrapped<T>, BootstrapError>
where
    T: Transport + 'static,
    F: FnOnce(&Config) -> Result<T, TransportError>,
{
    reporter.bootstrap_starting();

    let config = match loader.load() {
        Ok(config) => config,
        Err(source) => {
            let error = BootstrapError::Configuration { source };
            reporter.bootstrap_failed(&error);
            return Err(error);
        }
    };

    let telemetry = match telemetry::initialise(&config) {
        Ok(handle) => handle,
        Err(source) => {
            let error = BootstrapError::Telemetry { source };
            reporter.bootstrap_failed(&error);
            return Err(error);
        }
    };

    let transport = match build_transport(&config) {
        Ok(transport) => transport,
        Err(source) => {
            let error = BootstrapError::Transport { source };
            reporter.bootstrap_failed(&error);
            return Err(error);
        }
    };

    reporter.bootstrap_succeeded(&config);
    let datastore = Datastore::new(config, transport, reporter);
    Ok(Bootstrapped {
        datastore,
        telemetry,
    })
}
