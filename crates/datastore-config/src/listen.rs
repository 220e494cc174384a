//! Listening transport selection and bind address resolution.

use std::net::{AddrParseError, IpAddr, SocketAddr};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use thiserror::Error;

/// Transport carried by the listening session.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, Hash, EnumString, Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum TransportProtocol {
    /// TCP over IPv4.
    #[default]
    Tcp,
    /// TCP over IPv6.
    Tcp6,
}

/// Errors encountered while parsing a [`TransportProtocol`] from text.
pub type TransportProtocolParseError = strum::ParseError;

impl TransportProtocol {
    /// Whether the transport expects an IPv6 bind address.
    #[must_use]
    pub const fn is_ipv6(self) -> bool {
        matches!(self, Self::Tcp6)
    }

    /// Parses `address` and pairs it with `port`, insisting that the address
    /// family matches this transport.
    ///
    /// # Errors
    ///
    /// Returns [`BindAddressError::InvalidAddress`] when `address` is not an
    /// IP literal and [`BindAddressError::FamilyMismatch`] when it belongs to
    /// the other family.
    pub fn resolve_bind_address(
        self,
        address: &str,
        port: u16,
    ) -> Result<SocketAddr, BindAddressError> {
        let ip: IpAddr = address
            .trim()
            .parse()
            .map_err(|source| BindAddressError::InvalidAddress {
                address: address.to_owned(),
                source,
            })?;
        if ip.is_ipv6() != self.is_ipv6() {
            return Err(BindAddressError::FamilyMismatch {
                address: address.to_owned(),
                protocol: self,
            });
        }
        Ok(SocketAddr::new(ip, port))
    }
}

/// Errors raised while resolving the configured bind address.
#[derive(Debug, Error)]
pub enum BindAddressError {
    /// The address is not an IP literal.
    #[error("bind address '{address}' is not an IP address: {source}")]
    InvalidAddress {
        /// Offending address text.
        address: String,
        /// Parser failure.
        #[source]
        source: AddrParseError,
    },
    /// The address does not belong to the transport's family.
    #[error("bind address '{address}' does not match the {protocol} address family")]
    FamilyMismatch {
        /// Offending address text.
        address: String,
        /// Transport that demanded the other family.
        protocol: TransportProtocol,
    },
}
