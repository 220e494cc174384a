//! Entry point for the `datastored` daemon.

use std::io::{self, Write};
use std::process::ExitCode;

fn main() -> ExitCode {
    match datastored::run_daemon() {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            // Error messages already embed their sources.
            writeln!(io::stderr().lock(), "datastored: {error}").ok();
            ExitCode::FAILURE
        }
    }
}
