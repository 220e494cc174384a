//! Shared configuration for the datastore daemon.
//!
//! Values are layered by `ortho_config`: built-in defaults, then the
//! `datastore.toml` file (or the file named by `--config-path`), then
//! `DATASTORE_*` environment variables, then command-line flags. The daemon
//! resolves [`Config`] once during startup; preload commands may still adjust
//! the listener settings until the datastore has started.

mod defaults;
mod listen;
mod logging;

use std::ffi::OsString;
use std::net::SocketAddr;

use camino::{Utf8Path, Utf8PathBuf};
use ortho_config::{OrthoConfig, OrthoResult};
use serde::{Deserialize, Serialize};

pub use defaults::{
    DEFAULT_BIND_ADDRESS, DEFAULT_BIND_PORT, DEFAULT_CONFIG_FILE, DEFAULT_LOG_FILTER,
    DEFAULT_POLL_INTERVAL_MS, DEFAULT_SESSION_MAX, DEFAULT_TLS_CERTIFICATE,
    DEFAULT_TLS_PRIVATE_KEY, default_bind_address, default_bind_port, default_config_file,
    default_log_filter, default_log_filter_string, default_log_format, default_poll_interval_ms,
    default_protocol, default_session_max, default_tls_certificate, default_tls_private_key,
};
pub use listen::{BindAddressError, TransportProtocol, TransportProtocolParseError};
pub use logging::{LogFormat, LogFormatParseError};

/// Resolved configuration for the datastore daemon.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "DATASTORE")]
pub struct Config {
    /// Textual address the listening session binds to.
    #[serde(default = "default_bind_address")]
    #[ortho_config(default = default_bind_address())]
    pub bind_address: String,
    /// Port the listening session binds to.
    #[serde(default = "default_bind_port")]
    #[ortho_config(default = default_bind_port())]
    pub bind_port: u16,
    /// Transport used by the listening session.
    #[serde(default = "default_protocol")]
    #[ortho_config(default = default_protocol())]
    pub protocol: TransportProtocol,
    /// Wraps accepted sessions in TLS when set.
    #[serde(default)]
    #[ortho_config(default = false)]
    pub tls: bool,
    /// PEM certificate chain presented by TLS sessions.
    #[serde(default = "default_tls_certificate")]
    #[ortho_config(default = default_tls_certificate())]
    pub tls_certificate: Utf8PathBuf,
    /// PEM private key matching [`Config::tls_certificate`].
    #[serde(default = "default_tls_private_key")]
    #[ortho_config(default = default_tls_private_key())]
    pub tls_private_key: Utf8PathBuf,
    /// Command file evaluated by the preload and load phases.
    #[serde(default = "default_config_file")]
    #[ortho_config(default = default_config_file())]
    pub config_file: Utf8PathBuf,
    /// Upper bound on concurrently served client sessions. The listening
    /// session holds a slot of its own on top of this bound.
    #[serde(default = "default_session_max")]
    #[ortho_config(default = default_session_max())]
    pub session_max: usize,
    /// Upper bound on a single readiness poll, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    #[ortho_config(default = default_poll_interval_ms())]
    pub poll_interval_ms: u64,
    /// `tracing` filter directive.
    #[serde(default = "default_log_filter_string")]
    #[ortho_config(default = default_log_filter_string())]
    pub log_filter: String,
    /// Output format for structured logs.
    #[serde(default = "default_log_format")]
    #[ortho_config(default = default_log_format())]
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            bind_port: default_bind_port(),
            protocol: default_protocol(),
            tls: false,
            tls_certificate: default_tls_certificate(),
            tls_private_key: default_tls_private_key(),
            config_file: default_config_file(),
            session_max: default_session_max(),
            poll_interval_ms: default_poll_interval_ms(),
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
        }
    }
}

impl Config {
    /// Resolves the layered configuration from the process arguments.
    ///
    /// # Errors
    ///
    /// Returns the `ortho_config` error when a layer cannot be read or a
    /// value fails to deserialize.
    pub fn load() -> OrthoResult<Self> {
        <Self as OrthoConfig>::load()
    }

    /// Resolves the layered configuration from `args`, whose first item is
    /// the program name.
    ///
    /// # Errors
    ///
    /// Returns the `ortho_config` error when a layer cannot be read or a
    /// value fails to deserialize.
    pub fn load_from_iter<I, T>(args: I) -> OrthoResult<Self>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as OrthoConfig>::load_from_iter(args)
    }

    /// Textual bind address.
    #[must_use]
    pub fn bind_address(&self) -> &str {
        &self.bind_address
    }

    /// Bind port.
    #[must_use]
    pub const fn bind_port(&self) -> u16 {
        self.bind_port
    }

    /// Listening transport.
    #[must_use]
    pub const fn protocol(&self) -> TransportProtocol {
        self.protocol
    }

    /// Whether sessions are wrapped in TLS.
    #[must_use]
    pub const fn tls(&self) -> bool {
        self.tls
    }

    /// Certificate chain used when TLS is enabled.
    #[must_use]
    pub fn tls_certificate(&self) -> &Utf8Path {
        &self.tls_certificate
    }

    /// Private key used when TLS is enabled.
    #[must_use]
    pub fn tls_private_key(&self) -> &Utf8Path {
        &self.tls_private_key
    }

    /// Command file evaluated at startup.
    #[must_use]
    pub fn config_file(&self) -> &Utf8Path {
        &self.config_file
    }

    /// Maximum number of concurrent client sessions.
    #[must_use]
    pub const fn session_max(&self) -> usize {
        self.session_max
    }

    /// Poll bound in milliseconds.
    #[must_use]
    pub const fn poll_interval_ms(&self) -> u64 {
        self.poll_interval_ms
    }

    /// Log filter directive.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Log output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Converts the bind address and port into a socket address whose family
    /// matches the configured transport.
    ///
    /// # Errors
    ///
    /// Returns [`BindAddressError`] when the address is not an IP literal or
    /// belongs to the other address family.
    pub fn bind_socket_address(&self) -> Result<SocketAddr, BindAddressError> {
        self.protocol
            .resolve_bind_address(&self.bind_address, self.bind_port)
    }
}
