//! Error types for command evaluation.

use std::io;

use camino::Utf8PathBuf;
use thiserror::Error;

use crate::namespace::NamespaceError;
use crate::settings::SettingsError;

/// Errors raised by an individual command.
#[derive(Debug, Error)]
pub enum CommandError {
    /// No command is registered under the name.
    #[error("unknown command: {name}")]
    UnknownCommand {
        /// Name that was looked up.
        name: String,
    },
    /// The arguments do not fit the command.
    #[error("invalid arguments: {message}")]
    InvalidArguments {
        /// Explanation for the client.
        message: String,
    },
    /// Namespace resolution rejected the arguments.
    #[error(transparent)]
    Namespace(#[from] NamespaceError),
    /// The datastore no longer accepts the change.
    #[error(transparent)]
    Settings(#[from] SettingsError),
}

impl CommandError {
    /// Builds an invalid arguments error.
    pub fn invalid_arguments(message: impl Into<String>) -> Self {
        Self::InvalidArguments {
            message: message.into(),
        }
    }

    /// Status word written in the `ret` field of the reply.
    #[must_use]
    pub const fn status(&self) -> &'static str {
        match self {
            Self::UnknownCommand { .. } => "NOT_FOUND",
            Self::InvalidArguments { .. } | Self::Namespace(_) => "INVALID_ARGS",
            Self::Settings(_) => "INVALID_STATE",
        }
    }
}

/// Errors raised by an interpreter bridge.
#[derive(Debug, Error)]
pub enum InterpreterError {
    /// The configurator has not been registered.
    #[error("unknown configurator: {name}")]
    UnknownConfigurator {
        /// Configurator name.
        name: String,
    },
    /// The configurator is already registered.
    #[error("configurator already registered: {name}")]
    DuplicateConfigurator {
        /// Configurator name.
        name: String,
    },
    /// A command with the same name is already registered.
    #[error("command already registered: {name}")]
    DuplicateCommand {
        /// Command name.
        name: String,
    },
    /// A command received over a session failed.
    #[error("command '{line}' failed: {source}")]
    Command {
        /// Command line as received.
        line: String,
        /// Command failure.
        #[source]
        source: CommandError,
    },
    /// A command read from a file failed.
    #[error("{path}:{line}: {source}")]
    FileCommand {
        /// File being evaluated.
        path: Utf8PathBuf,
        /// One-based line number.
        line: usize,
        /// Command failure.
        #[source]
        source: CommandError,
    },
    /// The command file does not exist.
    #[error("command file {path} not found")]
    FileNotFound {
        /// Missing file.
        path: Utf8PathBuf,
    },
    /// The command file could not be read.
    #[error("failed to read command file {path}: {source}")]
    FileRead {
        /// Unreadable file.
        path: Utf8PathBuf,
        /// Underlying failure.
        #[source]
        source: io::Error,
    },
    /// A pending command line grew beyond the line limit.
    #[error("command line exceeds {max} bytes")]
    LineTooLong {
        /// Line limit in bytes.
        max: usize,
    },
    /// Reading from or writing to the session failed.
    #[error("session I/O failed: {source}")]
    Io {
        /// Underlying failure.
        #[source]
        source: io::Error,
    },
    /// A reply could not be serialized.
    #[error("failed to serialize reply: {source}")]
    Serialize {
        /// Underlying failure.
        #[source]
        source: serde_json::Error,
    },
}

impl From<io::Error> for InterpreterError {
    fn from(source: io::Error) -> Self {
        Self::Io { source }
    }
}

impl From<serde_json::Error> for InterpreterError {
    fn from(source: serde_json::Error) -> Self {
        Self::Serialize { source }
    }
}
