//! Reply serialization for evaluated commands.
//!
//! Every command line produces exactly one JSON reply line:
//! `{"ret":"OK","data":...}` on success, or the error status and message
//! otherwise.

use std::io::Write;

use serde::Serialize;
use serde_json::Value;

use super::{CommandError, InterpreterError};

/// Status word for successful commands.
pub const RET_OK: &str = "OK";

/// One reply line.
#[derive(Debug, Serialize)]
pub struct Reply {
    /// `OK` or an error status word.
    pub ret: &'static str,
    /// Command result or error message.
    pub data: Value,
}

impl Reply {
    /// Successful reply carrying `data`.
    #[must_use]
    pub fn ok(data: Value) -> Self {
        Self { ret: RET_OK, data }
    }

    /// Failure reply describing `error`.
    #[must_use]
    pub fn error(error: &CommandError) -> Self {
        Self {
            ret: error.status(),
            data: Value::String(error.to_string()),
        }
    }
}

/// Writer that frames replies as JSON lines.
pub struct ResponseWriter<W> {
    writer: W,
}

impl<W: Write> ResponseWriter<W> {
    /// Wraps an output stream.
    pub const fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Writes the reply for a command result.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn write_result(&mut self, result: &Result<Value, CommandError>) -> Result<(), InterpreterError> {
        let reply = match result {
            Ok(data) => Reply::ok(data.clone()),
            Err(error) => Reply::error(error),
        };
        serde_json::to_writer(&mut self.writer, &reply)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    /// Flushes buffered replies.
    ///
    /// # Errors
    ///
    /// Returns an error if flushing fails.
    pub fn flush(&mut self) -> Result<(), InterpreterError> {
        self.writer.flush()?;
        Ok(())
    }
}
