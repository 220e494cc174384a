//! Test double for [`HealthReporter`] that records lifecycle events.

use std::net::SocketAddr;
use std::sync::Mutex;

use datastore_config::Config;

use crate::bootstrap::BootstrapError;
use crate::health::HealthReporter;
use crate::multiplexer::LoopError;
use crate::transport::TransportError;

/// Health events tracked during scenarios.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthEvent {
    BootstrapStarting,
    BootstrapSucceeded,
    BootstrapFailed(String),
    ListenerReady(SocketAddr),
    SessionRejected(usize),
    PollFailed(String),
    WorkerExited(Result<(), String>),
}

/// Records health events for assertions.
#[derive(Debug, Default)]
pub struct RecordingHealthReporter {
    events: Mutex<Vec<HealthEvent>>,
}

impl RecordingHealthReporter {
    /// Captures a copy of the recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<HealthEvent> {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .clone()
    }

    pub fn rejections(&self) -> usize {
        self.events()
            .iter()
            .filter(|event| matches!(event, HealthEvent::SessionRejected(_)))
            .count()
    }

    pub fn poll_failures(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                HealthEvent::PollFailed(error) => Some(error),
                _ => None,
            })
            .collect()
    }

    pub fn worker_exits(&self) -> Vec<Result<(), String>> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                HealthEvent::WorkerExited(result) => Some(result),
                _ => None,
            })
            .collect()
    }

    fn record(&self, event: HealthEvent) {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .push(event);
    }
}

impl HealthReporter for RecordingHealthReporter {
    fn bootstrap_starting(&self) {
        self.record(HealthEvent::BootstrapStarting);
    }

    fn bootstrap_succeeded(&self, _config: &Config) {
        self.record(HealthEvent::BootstrapSucceeded);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        self.record(HealthEvent::BootstrapFailed(error.to_string()));
    }

    fn listener_ready(&self, addr: SocketAddr) {
        self.record(HealthEvent::ListenerReady(addr));
    }

    fn session_rejected(&self, session_max: usize) {
        self.record(HealthEvent::SessionRejected(session_max));
    }

    fn poll_failed(&self, error: &TransportError) {
        self.record(HealthEvent::PollFailed(error.to_string()));
    }

    fn worker_exited(&self, result: &Result<(), LoopError>) {
        let result = result.as_ref().map(|()| ()).map_err(ToString::to_string);
        self.record(HealthEvent::WorkerExited(result));
    }
}
