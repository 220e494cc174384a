//! Scripted transport that lets tests decide what the readiness poll sees.
//!
//! Connections are queued with [`ScriptedTransport::connect`]; the listener
//! reports readable while the queue is non-empty. Each connection is driven
//! through its [`ConnHandle`], which feeds input, closes or breaks the
//! connection, and exposes everything the interpreter wrote back.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};

use crate::transport::{ProtocolDescriptor, Session, SessionIo, Transport, TransportError};

#[derive(Debug, Default)]
struct Feed {
    chunks: VecDeque<Vec<u8>>,
    closed: bool,
    broken: bool,
    failing_read: bool,
}

impl Feed {
    fn has_event(&self) -> bool {
        !self.chunks.is_empty() || self.closed || self.broken || self.failing_read
    }
}

/// Test-side end of a scripted connection.
#[derive(Debug, Clone, Default)]
pub struct ConnHandle {
    feed: Arc<Mutex<Feed>>,
    output: Arc<Mutex<Vec<u8>>>,
    dropped: Arc<AtomicBool>,
}

impl ConnHandle {
    pub fn send(&self, bytes: &str) -> &Self {
        self.feed
            .lock()
            .expect("feed mutex poisoned")
            .chunks
            .push_back(bytes.as_bytes().to_vec());
        self
    }

    pub fn close(&self) -> &Self {
        self.feed.lock().expect("feed mutex poisoned").closed = true;
        self
    }

    pub fn break_connection(&self) -> &Self {
        self.feed.lock().expect("feed mutex poisoned").broken = true;
        self
    }

    pub fn fail_next_read(&self) -> &Self {
        self.feed.lock().expect("feed mutex poisoned").failing_read = true;
        self
    }

    /// Reply lines written so far.
    pub fn replies(&self) -> Vec<serde_json::Value> {
        let output = self.output.lock().expect("output mutex poisoned");
        String::from_utf8_lossy(&output)
            .lines()
            .map(|line| serde_json::from_str(line).expect("reply is JSON"))
            .collect()
    }

    /// Whether the multiplexer released the session.
    pub fn is_dropped(&self) -> bool {
        self.dropped.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Default)]
struct Script {
    pending_accepts: VecDeque<ConnHandle>,
    poll_errors: VecDeque<TransportError>,
    listen_error: Option<TransportError>,
    bind_error: Option<TransportError>,
    bound: Option<SocketAddr>,
    listened: Option<ProtocolDescriptor>,
    tls_material: Option<(Utf8PathBuf, Utf8PathBuf)>,
    polls: usize,
}

/// In-memory [`Transport`] driven by the test.
#[derive(Debug, Clone, Default)]
pub struct ScriptedTransport {
    script: Arc<Mutex<Script>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn script(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().expect("script mutex poisoned")
    }

    /// Queues a client connection for the listener to accept.
    pub fn connect(&self) -> ConnHandle {
        let handle = ConnHandle::default();
        self.script().pending_accepts.push_back(handle.clone());
        handle
    }

    pub fn fail_next_poll(&self, error: TransportError) {
        self.script().poll_errors.push_back(error);
    }

    pub fn fail_listen(&self, error: TransportError) {
        self.script().listen_error = Some(error);
    }

    pub fn fail_bind(&self, error: TransportError) {
        self.script().bind_error = Some(error);
    }

    pub fn bound_addr(&self) -> Option<SocketAddr> {
        self.script().bound
    }

    /// Descriptor of the last listening session created.
    pub fn listened(&self) -> Option<ProtocolDescriptor> {
        self.script().listened
    }

    /// Certificate and key paths handed to the last `prepare_tls`.
    pub fn tls_material(&self) -> Option<(Utf8PathBuf, Utf8PathBuf)> {
        self.script().tls_material.clone()
    }

    pub fn pending_accepts(&self) -> usize {
        self.script().pending_accepts.len()
    }

    pub fn polls(&self) -> usize {
        self.script().polls
    }
}

#[derive(Debug)]
enum Role {
    Listener { bound: bool },
    Conn(ConnHandle),
}

/// Session produced by [`ScriptedTransport`].
#[derive(Debug)]
pub struct ScriptedSession {
    role: Role,
    interest: bool,
    ready: bool,
    pending: Vec<u8>,
    script: Arc<Mutex<Script>>,
}

impl Drop for ScriptedSession {
    fn drop(&mut self) {
        if let Role::Conn(handle) = &self.role {
            handle.dropped.store(true, Ordering::SeqCst);
        }
    }
}

impl Read for ScriptedSession {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let Role::Conn(handle) = &self.role else {
            return Err(io::Error::other("listeners are not readable streams"));
        };
        let mut feed = handle.feed.lock().expect("feed mutex poisoned");
        if feed.failing_read {
            feed.failing_read = false;
            return Err(io::Error::other("scripted read failure"));
        }
        match feed.chunks.pop_front() {
            Some(mut chunk) => {
                let read = chunk.len().min(buf.len());
                buf[..read].copy_from_slice(&chunk[..read]);
                if read < chunk.len() {
                    feed.chunks.push_front(chunk.split_off(read));
                }
                Ok(read)
            }
            None if feed.closed => Ok(0),
            None => Err(io::ErrorKind::WouldBlock.into()),
        }
    }
}

impl Write for ScriptedSession {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let Role::Conn(handle) = &self.role else {
            return Err(io::Error::other("listeners are not writable streams"));
        };
        handle
            .output
            .lock()
            .expect("output mutex poisoned")
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl SessionIo for ScriptedSession {
    fn pending_input(&mut self) -> &mut Vec<u8> {
        &mut self.pending
    }
}

impl Session for ScriptedSession {
    fn bind(&mut self, addr: SocketAddr) -> Result<(), TransportError> {
        match &mut self.role {
            Role::Listener { bound } if !*bound => {
                let mut script = self.script.lock().expect("script mutex poisoned");
                if let Some(error) = script.bind_error.take() {
                    return Err(error);
                }
                *bound = true;
                script.bound = Some(addr);
                Ok(())
            }
            _ => Err(TransportError::InvalidSessionState { operation: "bind" }),
        }
    }

    fn accept(&mut self) -> Result<Self, TransportError> {
        if !matches!(self.role, Role::Listener { bound: true }) {
            return Err(TransportError::InvalidSessionState {
                operation: "accept",
            });
        }
        let next = self
            .script
            .lock()
            .expect("script mutex poisoned")
            .pending_accepts
            .pop_front();
        let handle = next.ok_or_else(|| TransportError::Accept {
            source: io::ErrorKind::WouldBlock.into(),
        })?;
        Ok(Self {
            role: Role::Conn(handle),
            interest: false,
            ready: false,
            pending: Vec::new(),
            script: Arc::clone(&self.script),
        })
    }

    fn set_read_interest(&mut self) -> Result<(), TransportError> {
        if matches!(self.role, Role::Listener { bound: false }) {
            return Err(TransportError::InvalidSessionState {
                operation: "watch",
            });
        }
        self.interest = true;
        Ok(())
    }

    fn is_readable(&mut self) -> Result<bool, TransportError> {
        if let Role::Conn(handle) = &self.role
            && self.ready
            && handle.feed.lock().expect("feed mutex poisoned").broken
        {
            return Err(TransportError::Broken);
        }
        Ok(self.ready)
    }

    fn is_passive(&self) -> bool {
        matches!(self.role, Role::Listener { .. })
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        match self.role {
            Role::Listener { .. } => None,
            Role::Conn(_) => Some(SocketAddr::from(([127, 0, 0, 1], 40_000))),
        }
    }
}

impl Transport for ScriptedTransport {
    type Session = ScriptedSession;

    fn prepare_tls(
        &self,
        certificate: &Utf8Path,
        private_key: &Utf8Path,
    ) -> Result<(), TransportError> {
        self.script().tls_material =
            Some((certificate.to_path_buf(), private_key.to_path_buf()));
        Ok(())
    }

    fn listen(&self, descriptor: ProtocolDescriptor) -> Result<ScriptedSession, TransportError> {
        let mut script = self.script();
        if let Some(error) = script.listen_error.take() {
            return Err(error);
        }
        if !descriptor.passive {
            return Err(TransportError::NotPassive);
        }
        script.listened = Some(descriptor);
        Ok(ScriptedSession {
            role: Role::Listener { bound: false },
            interest: false,
            ready: false,
            pending: Vec::new(),
            script: Arc::clone(&self.script),
        })
    }

    fn poll(
        &self,
        sessions: &mut [ScriptedSession],
        timeout: Duration,
    ) -> Result<usize, TransportError> {
        let ready = {
            let mut script = self.script();
            script.polls += 1;
            if let Some(error) = script.poll_errors.pop_front() {
                return Err(error);
            }
            let mut ready = 0;
            for session in sessions.iter_mut() {
                session.ready = session.interest
                    && match &session.role {
                        Role::Listener { bound } => *bound && !script.pending_accepts.is_empty(),
                        Role::Conn(handle) => {
                            handle.feed.lock().expect("feed mutex poisoned").has_event()
                        }
                    };
                if session.ready {
                    ready += 1;
                }
            }
            ready
        };
        if ready == 0 {
            thread::sleep(timeout.min(Duration::from_millis(2)));
        }
        Ok(ready)
    }
}
