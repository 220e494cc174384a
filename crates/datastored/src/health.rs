//! Structured health reporting for datastore lifecycle events.

use std::net::SocketAddr;

use datastore_config::Config;

use crate::bootstrap::BootstrapError;
use crate::multiplexer::LoopError;
use crate::transport::TransportError;

const HEALTH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::health");

/// Observer trait used to surface lifecycle events to telemetry sinks.
pub trait HealthReporter: Send + Sync {
    /// Invoked before configuration loading begins.
    fn bootstrap_starting(&self);

    /// Invoked after bootstrap completes successfully.
    fn bootstrap_succeeded(&self, config: &Config);

    /// Invoked when bootstrap fails.
    fn bootstrap_failed(&self, error: &BootstrapError);

    /// Invoked once the listening session is bound and watched.
    fn listener_ready(&self, addr: SocketAddr);

    /// Invoked when an accepted connection is dropped because `session_max`
    /// clients are already served.
    fn session_rejected(&self, session_max: usize);

    /// Invoked for every readiness poll that fails with a non-transient
    /// error. The loop keeps running.
    fn poll_failed(&self, error: &TransportError);

    /// Invoked when the session worker exits.
    fn worker_exited(&self, result: &Result<(), LoopError>);
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredHealthReporter;

impl StructuredHealthReporter {
    /// Builds a new reporter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl HealthReporter for StructuredHealthReporter {
    fn bootstrap_starting(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_starting",
            "starting datastore bootstrap"
        );
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_succeeded",
            bind_address = %config.bind_address(),
            bind_port = config.bind_port(),
            protocol = %config.protocol(),
            tls = config.tls(),
            log_filter = %config.log_filter(),
            log_format = ?config.log_format(),
            "datastore bootstrap completed"
        );
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "bootstrap_failed",
            error = %error,
            "datastore bootstrap failed"
        );
    }

    fn listener_ready(&self, addr: SocketAddr) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "listener_ready",
            %addr,
            "datastore listening"
        );
    }

    fn session_rejected(&self, session_max: usize) {
        tracing::warn!(
            target: HEALTH_TARGET,
            event = "session_rejected",
            session_max,
            "session pool full, connection dropped"
        );
    }

    fn poll_failed(&self, error: &TransportError) {
        tracing::warn!(
            target: HEALTH_TARGET,
            event = "poll_failed",
            error = %error,
            "readiness poll failed"
        );
    }

    fn worker_exited(&self, result: &Result<(), LoopError>) {
        match result {
            Ok(()) => tracing::info!(
                target: HEALTH_TARGET,
                event = "worker_exited",
                "datastore worker stopped gracefully"
            ),
            Err(error) => tracing::warn!(
                target: HEALTH_TARGET,
                event = "worker_exited",
                error = %error,
                "datastore worker stopped"
            ),
        }
    }
}
