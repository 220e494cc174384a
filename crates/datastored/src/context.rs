//! The datastore service context.
//!
//! [`Datastore`] owns everything the control plane shares: the listener
//! settings, the namespace resolver, the global phase gate, the interpreter,
//! and the lifecycle of the session worker. Constructing it only
//! allocates; [`Datastore::initialize`] performs the registrations.

use std::fs;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use camino::{Utf8Path, Utf8PathBuf};
use datastore_config::Config;
use thiserror::Error;
use tracing::{debug, error};

use crate::gate::{GlobalGate, ShutdownGrace};
use crate::health::HealthReporter;
use crate::interpreter::{
    CommandInterpreter, EvalMode, InterpreterError, MAIN_CONFIGURATOR,
    SharedInterpreter, builtin_commands,
};
use crate::multiplexer::LoopError;
use crate::namespace::NamespaceResolver;
use crate::service::{ServiceError, ServiceState, ServiceStatus};
use crate::settings::DatastoreSettings;
use crate::transport::Transport;

const CONTEXT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::service");

/// Errors raised while selecting or evaluating the command file.
#[derive(Debug, Error)]
pub enum ConfigFileError {
    /// The path could not be inspected.
    #[error("cannot use command file {path}: {source}")]
    Inaccessible {
        /// Rejected path.
        path: Utf8PathBuf,
        /// Underlying failure.
        #[source]
        source: io::Error,
    },
    /// The path names a directory.
    #[error("cannot use command file {path}: is a directory")]
    IsDirectory {
        /// Rejected path.
        path: Utf8PathBuf,
    },
    /// Evaluating the file failed.
    #[error("file: {path}, {diagnostics}")]
    Evaluation {
        /// Evaluated file.
        path: Utf8PathBuf,
        /// Interpreter diagnostics.
        diagnostics: String,
        /// Interpreter failure.
        #[source]
        source: InterpreterError,
    },
}

/// Owned datastore state shared by the control plane.
pub struct Datastore<T: Transport> {
    settings: Arc<DatastoreSettings>,
    default_config_file: Utf8PathBuf,
    namespace: Arc<NamespaceResolver>,
    gate: Arc<GlobalGate>,
    interpreter: SharedInterpreter,
    service: ServiceState<T>,
    config_file: Mutex<Utf8PathBuf>,
}

impl<T: Transport + 'static> Datastore<T> {
    /// Builds a context using the built-in [`CommandInterpreter`].
    #[must_use]
    pub fn new(config: Config, transport: T, health: Arc<dyn HealthReporter>) -> Self {
        let interpreter: SharedInterpreter = Arc::new(Mutex::new(CommandInterpreter::new()));
        Self::with_interpreter(config, transport, interpreter, health)
    }

    /// Builds a context around an existing interpreter.
    #[must_use]
    pub fn with_interpreter(
        config: Config,
        transport: T,
        interpreter: SharedInterpreter,
        health: Arc<dyn HealthReporter>,
    ) -> Self {
        let config_file = config.config_file().to_path_buf();
        let gate = Arc::new(GlobalGate::new());
        let settings = Arc::new(DatastoreSettings::new(config, Arc::clone(&gate)));
        let service = ServiceState::new(
            Arc::new(transport),
            Arc::clone(&settings),
            Arc::clone(&gate),
            Arc::clone(&interpreter),
            health,
        );
        Self {
            settings,
            default_config_file: config_file.clone(),
            namespace: Arc::new(NamespaceResolver::new()),
            gate,
            interpreter,
            service,
            config_file: Mutex::new(config_file),
        }
    }

    /// Current configuration, including changes made by preload commands.
    #[must_use]
    pub fn config(&self) -> Config {
        self.settings.snapshot()
    }

    /// Listener settings shared with the built-in commands.
    #[must_use]
    pub const fn settings(&self) -> &Arc<DatastoreSettings> {
        &self.settings
    }

    /// Namespace resolver used by object-management commands.
    #[must_use]
    pub fn namespace(&self) -> &NamespaceResolver {
        &self.namespace
    }

    /// Process-wide phase gate.
    #[must_use]
    pub fn gate(&self) -> &Arc<GlobalGate> {
        &self.gate
    }

    /// Lifecycle state of the session worker.
    #[must_use]
    pub fn status(&self) -> ServiceStatus {
        self.service.status()
    }

    /// Registers the built-in commands and the session configurator.
    ///
    /// # Errors
    ///
    /// See [`ServiceState::initialize`].
    pub fn initialize(&self) -> Result<(), ServiceError> {
        let commands = builtin_commands(&self.settings, &self.namespace, &self.gate);
        self.service.initialize(commands)
    }

    /// Starts the session worker.
    ///
    /// # Errors
    ///
    /// See [`ServiceState::start`].
    pub fn start(&self) -> Result<(), ServiceError> {
        self.service.start()
    }

    /// Asks the session worker to stop.
    ///
    /// # Errors
    ///
    /// See [`ServiceState::shutdown`].
    pub fn shutdown(&self, grace: ShutdownGrace) -> Result<(), ServiceError> {
        self.service.shutdown(grace)
    }

    /// Cancels the session worker.
    ///
    /// # Errors
    ///
    /// See [`ServiceState::stop`].
    pub fn stop(&self) -> Result<(), ServiceError> {
        self.service.stop()
    }

    /// Tears the service down and returns the last worker result.
    #[must_use = "the worker result reports how the last run ended"]
    pub fn finalize(&self) -> Option<Result<(), LoopError>> {
        self.service.finalize()
    }

    fn lock_config_file(&self) -> MutexGuard<'_, Utf8PathBuf> {
        self.config_file
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Command file used by [`Self::preload_config`] and
    /// [`Self::load_config`].
    #[must_use]
    pub fn config_file(&self) -> Utf8PathBuf {
        self.lock_config_file().clone()
    }

    /// Selects the command file. The path must name an existing file that is
    /// not a directory; on failure the configured default is restored.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigFileError::Inaccessible`] when the path cannot be
    /// inspected and [`ConfigFileError::IsDirectory`] for directories.
    pub fn set_config_file(&self, path: &Utf8Path) -> Result<(), ConfigFileError> {
        let checked = match fs::metadata(path) {
            Ok(metadata) if metadata.is_dir() => Err(ConfigFileError::IsDirectory {
                path: path.to_path_buf(),
            }),
            Ok(_) => Ok(()),
            Err(source) => Err(ConfigFileError::Inaccessible {
                path: path.to_path_buf(),
                source,
            }),
        };
        let mut current = self.lock_config_file();
        match checked {
            Ok(()) => {
                path.clone_into(&mut *current);
                Ok(())
            }
            Err(error) => {
                self.default_config_file.clone_into(&mut *current);
                Err(error)
            }
        }
    }

    /// Evaluates the preload-eligible commands of the command file.
    ///
    /// # Errors
    ///
    /// See [`Self::load_config`].
    pub fn preload_config(&self) -> Result<(), ConfigFileError> {
        self.evaluate_config(EvalMode::Preload)
    }

    /// Evaluates every command of the command file. A missing file is not
    /// an error.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigFileError::Evaluation`] carrying the interpreter's
    /// diagnostics for any other failure.
    pub fn load_config(&self) -> Result<(), ConfigFileError> {
        self.evaluate_config(EvalMode::Full)
    }

    fn evaluate_config(&self, mode: EvalMode) -> Result<(), ConfigFileError> {
        let path = self.config_file();
        let mut diagnostics = String::new();
        let result = self
            .interpreter
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .evaluate_file(MAIN_CONFIGURATOR, &path, mode, &mut diagnostics);
        match result {
            Ok(()) => Ok(()),
            Err(InterpreterError::FileNotFound { .. }) => {
                debug!(target: CONTEXT_TARGET, %path, ?mode, "command file absent; skipping");
                Ok(())
            }
            Err(source) => {
                if diagnostics.is_empty() {
                    diagnostics = source.to_string();
                }
                error!(target: CONTEXT_TARGET, "file: {path}, {diagnostics}");
                Err(ConfigFileError::Evaluation {
                    path,
                    diagnostics,
                    source,
                })
            }
        }
    }
}
