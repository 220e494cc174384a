//! Test suites for the datastore daemon.

mod context;
mod support;
mod tls_session;
