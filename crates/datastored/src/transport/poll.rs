//! Socket-backed sessions multiplexed with `poll(2)`.

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::os::fd::{AsFd, BorrowedFd};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use camino::Utf8Path;
use datastore_config::Config;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use rustls::{ServerConfig, ServerConnection, StreamOwned};
use tracing::debug;

use super::{
    ProtocolDescriptor, Session, SessionIo, TRANSPORT_TARGET, Transport, TransportError,
    load_server_config,
};

/// Transport that backs sessions with `std::net` sockets.
#[derive(Debug, Default)]
pub struct PollTransport {
    tls: RwLock<Option<Arc<ServerConfig>>>,
}

impl PollTransport {
    /// Transport for plain TCP sessions only.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            tls: RwLock::new(None),
        }
    }

    /// Transport whose TLS listeners use `config`.
    #[must_use]
    pub const fn with_tls(config: Arc<ServerConfig>) -> Self {
        Self {
            tls: RwLock::new(Some(config)),
        }
    }

    /// Builds the transport described by the daemon configuration, loading
    /// TLS material when TLS is enabled.
    ///
    /// # Errors
    ///
    /// Returns the TLS loading failure.
    pub fn from_config(config: &Config) -> Result<Self, TransportError> {
        if !config.tls() {
            return Ok(Self::new());
        }
        let tls = load_server_config(config.tls_certificate(), config.tls_private_key())?;
        Ok(Self::with_tls(tls))
    }
}

impl Transport for PollTransport {
    type Session = PollSession;

    fn prepare_tls(
        &self,
        certificate: &Utf8Path,
        private_key: &Utf8Path,
    ) -> Result<(), TransportError> {
        let config = load_server_config(certificate, private_key)?;
        *self.tls.write().unwrap_or_else(PoisonError::into_inner) = Some(config);
        debug!(target: TRANSPORT_TARGET, %certificate, "TLS material loaded");
        Ok(())
    }

    fn listen(&self, descriptor: ProtocolDescriptor) -> Result<PollSession, TransportError> {
        if !descriptor.passive {
            return Err(TransportError::NotPassive);
        }
        let tls = if descriptor.tls {
            let loaded = self.tls.read().unwrap_or_else(PoisonError::into_inner).clone();
            Some(loaded.ok_or(TransportError::TlsUnconfigured)?)
        } else {
            None
        };
        Ok(PollSession {
            descriptor,
            endpoint: Endpoint::Unbound,
            tls,
            read_interest: false,
            readiness: Readiness::Idle,
            pending: Vec::new(),
            peer: None,
        })
    }

    fn poll(&self, sessions: &mut [PollSession], timeout: Duration) -> Result<usize, TransportError> {
        let mut buffered = 0;
        for session in sessions.iter_mut() {
            session.readiness = Readiness::Idle;
            if session.read_interest {
                session.readiness = session.buffered_readiness();
                if session.readiness != Readiness::Idle {
                    buffered += 1;
                }
            }
        }
        let wait = if buffered > 0 { Duration::ZERO } else { timeout };
        let millis = u16::try_from(wait.as_millis()).unwrap_or(u16::MAX);

        let events: Vec<(usize, Option<PollFlags>)> = {
            let watched: Vec<(usize, BorrowedFd<'_>)> = sessions
                .iter()
                .enumerate()
                .filter(|(_, session)| session.readiness == Readiness::Idle)
                .filter_map(|(index, session)| session.watched_fd().map(|fd| (index, fd)))
                .collect();
            let mut fds: Vec<PollFd<'_>> = watched
                .iter()
                .map(|(_, fd)| PollFd::new(*fd, PollFlags::POLLIN))
                .collect();
            poll(&mut fds, PollTimeout::from(millis))
                .map_err(|source| TransportError::Poll { source })?;
            watched
                .iter()
                .zip(fds.iter())
                .map(|((index, _), fd)| (*index, fd.revents()))
                .collect()
        };

        let mut ready = buffered;
        for (index, revents) in events {
            let readiness = Readiness::from_revents(revents);
            if readiness != Readiness::Idle {
                ready += 1;
            }
            if let Some(session) = sessions.get_mut(index) {
                session.readiness = readiness;
            }
        }
        Ok(ready)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Readiness {
    Idle,
    Readable,
    Broken,
}

impl Readiness {
    fn from_revents(events: Option<PollFlags>) -> Self {
        let Some(revents) = events else {
            return Self::Idle;
        };
        if revents.intersects(PollFlags::POLLERR | PollFlags::POLLNVAL) {
            Self::Broken
        } else if revents.intersects(PollFlags::POLLIN | PollFlags::POLLHUP) {
            Self::Readable
        } else {
            Self::Idle
        }
    }
}

#[derive(Debug)]
enum Endpoint {
    Unbound,
    Listener(TcpListener),
    Plain(TcpStream),
    Tls(Box<StreamOwned<ServerConnection, TcpStream>>),
}

/// Listening or connected socket session created by [`PollTransport`].
#[derive(Debug)]
pub struct PollSession {
    descriptor: ProtocolDescriptor,
    endpoint: Endpoint,
    tls: Option<Arc<ServerConfig>>,
    read_interest: bool,
    readiness: Readiness,
    pending: Vec<u8>,
    peer: Option<SocketAddr>,
}

impl PollSession {
    /// Descriptor the session was created with.
    #[must_use]
    pub const fn descriptor(&self) -> ProtocolDescriptor {
        self.descriptor
    }

    /// Local address of a bound listener.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match &self.endpoint {
            Endpoint::Listener(listener) => listener.local_addr().ok(),
            Endpoint::Plain(stream) => stream.local_addr().ok(),
            Endpoint::Tls(stream) => stream.sock.local_addr().ok(),
            Endpoint::Unbound => None,
        }
    }

    fn watched_fd(&self) -> Option<BorrowedFd<'_>> {
        if !self.read_interest {
            return None;
        }
        match &self.endpoint {
            Endpoint::Listener(listener) => Some(listener.as_fd()),
            Endpoint::Plain(stream) => Some(stream.as_fd()),
            Endpoint::Tls(stream) => Some(stream.sock.as_fd()),
            Endpoint::Unbound => None,
        }
    }

    // Plaintext already decrypted by rustls is invisible to poll(2).
    fn buffered_readiness(&mut self) -> Readiness {
        let Endpoint::Tls(stream) = &mut self.endpoint else {
            return Readiness::Idle;
        };
        match stream.conn.process_new_packets() {
            Ok(state) if state.plaintext_bytes_to_read() > 0 => Readiness::Readable,
            Ok(_) => Readiness::Idle,
            Err(_) => Readiness::Broken,
        }
    }

    fn not_connected() -> io::Error {
        io::Error::new(io::ErrorKind::NotConnected, "session has no connected stream")
    }
}

impl Read for PollSession {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.endpoint {
            Endpoint::Plain(stream) => stream.read(buf),
            Endpoint::Tls(stream) => stream.read(buf),
            Endpoint::Unbound | Endpoint::Listener(_) => Err(Self::not_connected()),
        }
    }
}

impl Write for PollSession {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &mut self.endpoint {
            Endpoint::Plain(stream) => stream.write(buf),
            Endpoint::Tls(stream) => stream.write(buf),
            Endpoint::Unbound | Endpoint::Listener(_) => Err(Self::not_connected()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.endpoint {
            Endpoint::Plain(stream) => stream.flush(),
            Endpoint::Tls(stream) => stream.flush(),
            Endpoint::Unbound | Endpoint::Listener(_) => Ok(()),
        }
    }
}

impl SessionIo for PollSession {
    fn pending_input(&mut self) -> &mut Vec<u8> {
        &mut self.pending
    }
}

impl Session for PollSession {
    fn bind(&mut self, addr: SocketAddr) -> Result<(), TransportError> {
        if !self.descriptor.passive || !matches!(self.endpoint, Endpoint::Unbound) {
            return Err(TransportError::InvalidSessionState { operation: "bind" });
        }
        if addr.is_ipv6() != self.descriptor.kind.is_ipv6() {
            return Err(TransportError::AddressFamily {
                addr,
                kind: self.descriptor.kind,
            });
        }
        let listener = TcpListener::bind(addr).map_err(|source| TransportError::Bind { addr, source })?;
        listener
            .set_nonblocking(true)
            .map_err(|source| TransportError::Bind { addr, source })?;
        debug!(target: TRANSPORT_TARGET, %addr, tls = self.descriptor.tls, "listener bound");
        self.endpoint = Endpoint::Listener(listener);
        Ok(())
    }

    fn accept(&mut self) -> Result<Self, TransportError> {
        let Endpoint::Listener(listener) = &self.endpoint else {
            return Err(TransportError::InvalidSessionState {
                operation: "accept",
            });
        };
        let (stream, peer) = listener
            .accept()
            .map_err(|source| TransportError::Accept { source })?;
        stream
            .set_nonblocking(false)
            .map_err(|source| TransportError::Accept { source })?;
        let endpoint = match &self.tls {
            Some(config) => {
                let connection = ServerConnection::new(Arc::clone(config))?;
                Endpoint::Tls(Box::new(StreamOwned::new(connection, stream)))
            }
            None => Endpoint::Plain(stream),
        };
        debug!(target: TRANSPORT_TARGET, %peer, "connection accepted");
        Ok(Self {
            descriptor: self.descriptor.accepted(),
            endpoint,
            tls: None,
            read_interest: false,
            readiness: Readiness::Idle,
            pending: Vec::new(),
            peer: Some(peer),
        })
    }

    fn set_read_interest(&mut self) -> Result<(), TransportError> {
        if matches!(self.endpoint, Endpoint::Unbound) {
            return Err(TransportError::InvalidSessionState { operation: "watch" });
        }
        self.read_interest = true;
        Ok(())
    }

    fn is_readable(&mut self) -> Result<bool, TransportError> {
        match self.readiness {
            Readiness::Idle => Ok(false),
            Readiness::Readable => Ok(true),
            Readiness::Broken => Err(TransportError::Broken),
        }
    }

    fn is_passive(&self) -> bool {
        self.descriptor.passive
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }
}
