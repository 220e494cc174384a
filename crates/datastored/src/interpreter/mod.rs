//! Command evaluation for sessions and command files.
//!
//! [`InterpreterBridge`] is the seam between the datastore and whatever
//! evaluates its command language. [`CommandInterpreter`] is the built-in
//! implementation: newline-terminated commands of whitespace-separated words,
//! dispatched by name to registered [`Command`]s, each answered with one JSON
//! reply line.

mod builtin;
mod engine;
mod errors;
mod response;

use std::sync::{Arc, Mutex};

use camino::Utf8Path;
use serde_json::Value;

use crate::transport::SessionIo;

pub use self::builtin::builtin_commands;
pub use self::engine::{CommandInterpreter, MAX_LINE_BYTES};
pub use self::errors::{CommandError, InterpreterError};
pub use self::response::{RET_OK, Reply, ResponseWriter};

pub(crate) const INTERPRETER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::interpreter");

/// Configurator used for command files.
pub const MAIN_CONFIGURATOR: &str = "datastore";

/// Configurator used for commands received over sessions.
pub const SESSION_CONFIGURATOR: &str = "datastore.session";

/// Interpreter shared between the control thread and the session worker.
pub type SharedInterpreter = Arc<Mutex<dyn InterpreterBridge>>;

/// Result of one evaluation pass over a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalOutcome {
    /// Every buffered command was evaluated.
    Complete,
    /// A partial command remains buffered for the next pass.
    Incomplete,
    /// The peer closed the stream.
    EndOfStream,
}

/// Which commands a file evaluation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalMode {
    /// Only commands marked for preload; other lines are skipped.
    Preload,
    /// Every command.
    Full,
}

/// A named command the interpreter can dispatch to.
pub trait Command: Send + Sync {
    /// Word that selects the command.
    fn name(&self) -> &'static str;

    /// Whether the command runs during the preload phase.
    fn preload(&self) -> bool {
        false
    }

    /// Runs the command with the words that followed its name.
    ///
    /// # Errors
    ///
    /// Returns a [`CommandError`] describing why the command was refused.
    fn execute(&self, args: &[&str]) -> Result<Value, CommandError>;
}

/// Evaluates command streams on behalf of the datastore.
pub trait InterpreterBridge: Send {
    /// Makes `name` available for evaluation.
    ///
    /// # Errors
    ///
    /// Fails when the configurator is already registered.
    fn register_configurator(&mut self, name: &str) -> Result<(), InterpreterError>;

    /// Removes a configurator registered earlier.
    ///
    /// # Errors
    ///
    /// Fails when the configurator is unknown.
    fn unregister_configurator(&mut self, name: &str) -> Result<(), InterpreterError>;

    /// Adds a command to the dispatch table.
    ///
    /// # Errors
    ///
    /// Fails when a command with the same name exists.
    fn register_command(&mut self, command: Arc<dyn Command>) -> Result<(), InterpreterError>;

    /// Reads the session's available input and evaluates every complete
    /// command in it, appending failure details to `diagnostics`.
    ///
    /// # Errors
    ///
    /// Returns the first command or I/O failure of the pass.
    fn evaluate_session(
        &mut self,
        configurator: &str,
        session: &mut dyn SessionIo,
        diagnostics: &mut String,
    ) -> Result<EvalOutcome, InterpreterError>;

    /// Evaluates the command file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`InterpreterError::FileNotFound`] for a missing file and the
    /// first read or command failure otherwise.
    fn evaluate_file(
        &mut self,
        configurator: &str,
        path: &Utf8Path,
        mode: EvalMode,
        diagnostics: &mut String,
    ) -> Result<(), InterpreterError>;

    /// Releases evaluation state left behind by a worker that was cancelled.
    fn cancel_janitor(&mut self);
}
