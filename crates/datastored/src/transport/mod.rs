//! Session primitives used by the multiplexer.
//!
//! A [`Transport`] creates listening sessions and waits for readiness across
//! a slice of sessions. A [`Session`] is either passive (a listener that yields
//! new sessions through [`Session::accept`]) or an accepted connection whose
//! bytes are fed to the command interpreter. Dropping a session closes it.

mod errors;
mod poll;
mod tls;

use std::io::{Read, Write};
use std::net::SocketAddr;
use std::time::Duration;

use camino::Utf8Path;
use datastore_config::TransportProtocol;

pub use self::errors::TransportError;
pub use self::poll::{PollSession, PollTransport};
pub use self::tls::load_server_config;

const TRANSPORT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");

/// Transport kind, TLS flag, and passive bit of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProtocolDescriptor {
    /// Underlying stream transport.
    pub kind: TransportProtocol,
    /// Whether accepted sessions are wrapped in TLS.
    pub tls: bool,
    /// Whether the session listens for connections.
    pub passive: bool,
}

impl ProtocolDescriptor {
    /// Descriptor for a listening session.
    #[must_use]
    pub const fn listener(kind: TransportProtocol, tls: bool) -> Self {
        Self {
            kind,
            tls,
            passive: true,
        }
    }

    /// The same descriptor with the passive bit cleared, as carried by the
    /// sessions a listener accepts.
    #[must_use]
    pub const fn accepted(self) -> Self {
        Self {
            passive: false,
            ..self
        }
    }
}

/// Byte stream handed to the interpreter for evaluation.
///
/// The pending buffer holds input read from the stream that has not yet
/// formed a complete command; it survives across evaluation passes.
pub trait SessionIo: Read + Write {
    /// Input carried over from earlier reads.
    fn pending_input(&mut self) -> &mut Vec<u8>;
}

/// A listening or connected session.
pub trait Session: SessionIo + Send {
    /// Binds a passive session to `addr`.
    ///
    /// # Errors
    ///
    /// Fails when the session is not passive, is already bound, or the
    /// address does not match the session's transport kind.
    fn bind(&mut self, addr: SocketAddr) -> Result<(), TransportError>;

    /// Accepts one pending connection from a bound passive session.
    ///
    /// # Errors
    ///
    /// Fails when the session cannot accept or the accept call fails.
    fn accept(&mut self) -> Result<Self, TransportError>
    where
        Self: Sized;

    /// Registers interest in readability so [`Transport::poll`] watches the
    /// session.
    ///
    /// # Errors
    ///
    /// Fails when the session has nothing to watch yet.
    fn set_read_interest(&mut self) -> Result<(), TransportError>;

    /// Whether the last poll reported the session readable.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Broken`] when the poll reported an error
    /// condition on the session.
    fn is_readable(&mut self) -> Result<bool, TransportError>;

    /// Whether the session is a listener.
    fn is_passive(&self) -> bool;

    /// Remote address of a connected session.
    fn peer_addr(&self) -> Option<SocketAddr>;
}

/// Factory and readiness poller for sessions.
pub trait Transport: Send + Sync {
    /// Session type produced by this transport.
    type Session: Session;

    /// Loads the certificate chain and private key that TLS listeners hand
    /// to the sessions they accept, replacing any earlier material.
    ///
    /// # Errors
    ///
    /// Fails when the material cannot be read or is rejected.
    fn prepare_tls(&self, certificate: &Utf8Path, private_key: &Utf8Path)
    -> Result<(), TransportError>;

    /// Creates an unbound listening session for `descriptor`.
    ///
    /// # Errors
    ///
    /// Fails when the descriptor is not passive or its TLS material cannot
    /// be loaded.
    fn listen(&self, descriptor: ProtocolDescriptor) -> Result<Self::Session, TransportError>;

    /// Waits up to `timeout` for any session with read interest to become
    /// readable and returns how many are.
    ///
    /// # Errors
    ///
    /// Returns the poll failure; [`TransportError::is_transient`] tells the
    /// caller whether to retry silently.
    fn poll(
        &self,
        sessions: &mut [Self::Session],
        timeout: Duration,
    ) -> Result<usize, TransportError>;
}
