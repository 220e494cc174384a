//! Line-oriented command interpreter.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::sync::Arc;

use camino::Utf8Path;
use serde_json::Value;
use tracing::{debug, warn};

use super::{
    Command, CommandError, EvalMode, EvalOutcome, INTERPRETER_TARGET, InterpreterBridge,
    InterpreterError, MAIN_CONFIGURATOR, ResponseWriter,
};
use crate::transport::SessionIo;

/// Longest command line accepted, in bytes.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

const READ_CHUNK: usize = 4096;

/// Built-in [`InterpreterBridge`] that dispatches newline-terminated
/// commands to registered [`Command`]s.
///
/// The main configurator is always registered.
pub struct CommandInterpreter {
    commands: BTreeMap<&'static str, Arc<dyn Command>>,
    configurators: BTreeSet<String>,
    janitor_runs: usize,
}

impl std::fmt::Debug for CommandInterpreter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandInterpreter")
            .field("commands", &self.commands.keys().collect::<Vec<_>>())
            .field("configurators", &self.configurators)
            .field("janitor_runs", &self.janitor_runs)
            .finish()
    }
}

impl Default for CommandInterpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandInterpreter {
    /// Builds an interpreter with no commands and the main configurator.
    #[must_use]
    pub fn new() -> Self {
        let mut configurators = BTreeSet::new();
        configurators.insert(MAIN_CONFIGURATOR.to_owned());
        Self {
            commands: BTreeMap::new(),
            configurators,
            janitor_runs: 0,
        }
    }

    /// Whether `name` is a registered configurator.
    #[must_use]
    pub fn has_configurator(&self, name: &str) -> bool {
        self.configurators.contains(name)
    }

    /// Whether a command named `name` is registered.
    #[must_use]
    pub fn has_command(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }

    /// Number of times the cancel janitor ran.
    #[must_use]
    pub const fn janitor_runs(&self) -> usize {
        self.janitor_runs
    }

    fn require_configurator(&self, name: &str) -> Result<(), InterpreterError> {
        if self.has_configurator(name) {
            Ok(())
        } else {
            Err(InterpreterError::UnknownConfigurator {
                name: name.to_owned(),
            })
        }
    }

    /// Runs one command line. `None` means the line was skipped: it was
    /// blank, a comment, or not eligible in `mode`.
    fn execute_line(&self, line: &str, mode: EvalMode) -> Option<Result<Value, CommandError>> {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            return None;
        }
        let mut words = trimmed.split_whitespace();
        let name = words.next()?;
        let args: Vec<&str> = words.collect();
        let Some(command) = self.commands.get(name) else {
            return match mode {
                EvalMode::Preload => None,
                EvalMode::Full => Some(Err(CommandError::UnknownCommand {
                    name: name.to_owned(),
                })),
            };
        };
        if mode == EvalMode::Preload && !command.preload() {
            return None;
        }
        debug!(target: INTERPRETER_TARGET, command = name, ?mode, "executing command");
        Some(command.execute(&args))
    }

    fn evaluate_pending(
        &self,
        pending: &mut Vec<u8>,
        session: &mut dyn SessionIo,
        diagnostics: &mut String,
    ) -> Result<EvalOutcome, InterpreterError> {
        let mut writer = ResponseWriter::new(&mut *session);
        let mut failure = None;
        while let Some(end) = pending.iter().position(|byte| *byte == b'\n') {
            let raw: Vec<u8> = pending.drain(..=end).collect();
            let line = String::from_utf8_lossy(&raw);
            let Some(result) = self.execute_line(&line, EvalMode::Full) else {
                continue;
            };
            writer.write_result(&result)?;
            if let Err(source) = result
                && failure.is_none()
            {
                let command = line.trim().to_owned();
                diagnostics.push_str(&format!("{command}: {source}"));
                failure = Some(InterpreterError::Command {
                    line: command,
                    source,
                });
            }
        }
        writer.flush()?;

        if pending.len() > MAX_LINE_BYTES {
            pending.clear();
            let error = InterpreterError::LineTooLong {
                max: MAX_LINE_BYTES,
            };
            diagnostics.push_str(&error.to_string());
            return Err(error);
        }
        if let Some(error) = failure {
            return Err(error);
        }
        Ok(if pending.is_empty() {
            EvalOutcome::Complete
        } else {
            EvalOutcome::Incomplete
        })
    }
}

fn read_available(session: &mut dyn SessionIo, chunk: &mut [u8]) -> io::Result<usize> {
    loop {
        match session.read(chunk) {
            Ok(read) => return Ok(read),
            Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
            Err(error) => return Err(error),
        }
    }
}

fn is_disconnect(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
    )
}

impl InterpreterBridge for CommandInterpreter {
    fn register_configurator(&mut self, name: &str) -> Result<(), InterpreterError> {
        if !self.configurators.insert(name.to_owned()) {
            return Err(InterpreterError::DuplicateConfigurator {
                name: name.to_owned(),
            });
        }
        debug!(target: INTERPRETER_TARGET, configurator = name, "configurator registered");
        Ok(())
    }

    fn unregister_configurator(&mut self, name: &str) -> Result<(), InterpreterError> {
        if !self.configurators.remove(name) {
            return Err(InterpreterError::UnknownConfigurator {
                name: name.to_owned(),
            });
        }
        debug!(target: INTERPRETER_TARGET, configurator = name, "configurator unregistered");
        Ok(())
    }

    fn register_command(&mut self, command: Arc<dyn Command>) -> Result<(), InterpreterError> {
        let name = command.name();
        if self.commands.contains_key(name) {
            return Err(InterpreterError::DuplicateCommand {
                name: name.to_owned(),
            });
        }
        self.commands.insert(name, command);
        Ok(())
    }

    fn evaluate_session(
        &mut self,
        configurator: &str,
        session: &mut dyn SessionIo,
        diagnostics: &mut String,
    ) -> Result<EvalOutcome, InterpreterError> {
        self.require_configurator(configurator)?;
        let mut chunk = [0_u8; READ_CHUNK];
        let read = match read_available(session, &mut chunk) {
            Ok(0) => return Ok(EvalOutcome::EndOfStream),
            Ok(read) => read,
            Err(error) if is_disconnect(&error) => return Ok(EvalOutcome::EndOfStream),
            Err(error) => {
                diagnostics.push_str(&format!("read failed: {error}"));
                return Err(error.into());
            }
        };

        let mut pending = std::mem::take(session.pending_input());
        pending.extend_from_slice(chunk.get(..read).unwrap_or_default());
        let outcome = self.evaluate_pending(&mut pending, session, diagnostics);
        *session.pending_input() = pending;
        outcome
    }

    fn evaluate_file(
        &mut self,
        configurator: &str,
        path: &Utf8Path,
        mode: EvalMode,
        diagnostics: &mut String,
    ) -> Result<(), InterpreterError> {
        self.require_configurator(configurator)?;
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                return Err(InterpreterError::FileNotFound {
                    path: path.to_path_buf(),
                });
            }
            Err(source) => {
                diagnostics.push_str(&source.to_string());
                return Err(InterpreterError::FileRead {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        for (index, line) in text.lines().enumerate() {
            match self.execute_line(line, mode) {
                None | Some(Ok(_)) => {}
                Some(Err(source)) => {
                    let number = index + 1;
                    diagnostics.push_str(&format!("line {number}: {source}"));
                    warn!(target: INTERPRETER_TARGET, %path, line = number, error = %source, "command failed");
                    return Err(InterpreterError::FileCommand {
                        path: path.to_path_buf(),
                        line: number,
                        source,
                    });
                }
            }
        }
        Ok(())
    }

    fn cancel_janitor(&mut self) {
        self.janitor_runs += 1;
        debug!(target: INTERPRETER_TARGET, runs = self.janitor_runs, "cancel janitor ran");
    }
}
