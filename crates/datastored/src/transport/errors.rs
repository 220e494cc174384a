//! Error types for session transport operations.

use std::io;
use std::net::SocketAddr;

use camino::Utf8PathBuf;
use datastore_config::TransportProtocol;
use nix::errno::Errno;
use thiserror::Error;

/// Errors surfaced by transports and sessions.
#[derive(Debug, Error)]
pub enum TransportError {
    /// A listener was requested with a non-passive descriptor.
    #[error("listening sessions require a passive descriptor")]
    NotPassive,
    /// The session cannot perform the requested operation in its state.
    #[error("session cannot {operation} in its current state")]
    InvalidSessionState {
        /// Operation that was attempted.
        operation: &'static str,
    },
    /// The bind address belongs to the other address family.
    #[error("address {addr} does not match the {kind} transport")]
    AddressFamily {
        /// Rejected address.
        addr: SocketAddr,
        /// Transport kind of the session.
        kind: TransportProtocol,
    },
    /// Binding the listener failed.
    #[error("failed to bind listener at {addr}: {source}")]
    Bind {
        /// Address that could not be bound.
        addr: SocketAddr,
        /// Underlying failure.
        #[source]
        source: io::Error,
    },
    /// Accepting a connection failed.
    #[error("failed to accept connection: {source}")]
    Accept {
        /// Underlying failure.
        #[source]
        source: io::Error,
    },
    /// The readiness poll failed.
    #[error("readiness poll failed: {source}")]
    Poll {
        /// Errno reported by `poll(2)`.
        #[source]
        source: Errno,
    },
    /// The last poll reported an error condition on the session.
    #[error("session reported an error condition")]
    Broken,
    /// A TLS listener was requested from a transport without TLS material.
    #[error("TLS requested but no server configuration was loaded")]
    TlsUnconfigured,
    /// TLS material could not be read.
    #[error("failed to read TLS material {path}: {source}")]
    TlsMaterial {
        /// File that could not be read.
        path: Utf8PathBuf,
        /// Underlying failure.
        #[source]
        source: io::Error,
    },
    /// TLS material could not be parsed.
    #[error("invalid TLS material {path}: {message}")]
    TlsParse {
        /// Offending file.
        path: Utf8PathBuf,
        /// Parser diagnostic.
        message: String,
    },
    /// rustls rejected the configuration or a connection.
    #[error("TLS error: {source}")]
    Tls {
        /// Underlying failure.
        #[source]
        source: rustls::Error,
    },
}

impl TransportError {
    /// Whether the failure is an interruption the caller should retry
    /// without reporting.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Poll { source } => matches!(source, Errno::EINTR | Errno::EAGAIN),
            Self::Accept { source } => matches!(
                source.kind(),
                io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock
            ),
            _ => false,
        }
    }
}

impl From<rustls::Error> for TransportError {
    fn from(source: rustls::Error) -> Self {
        Self::Tls { source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Errno::EINTR, true)]
    #[case(Errno::EAGAIN, true)]
    #[case(Errno::EBADF, false)]
    #[case(Errno::ENOMEM, false)]
    fn classifies_poll_errnos(#[case] errno: Errno, #[case] transient: bool) {
        let error = TransportError::Poll { source: errno };
        assert_eq!(error.is_transient(), transient);
    }

    #[test]
    fn interrupted_accept_is_transient() {
        let error = TransportError::Accept {
            source: io::Error::from(io::ErrorKind::Interrupted),
        };
        assert!(error.is_transient());
    }

    #[test]
    fn broken_session_is_fatal() {
        assert!(!TransportError::Broken.is_transient());
    }
}
