use camino::Utf8PathBuf;

use crate::listen::TransportProtocol;
use crate::logging::LogFormat;

/// Address the listening session binds to when none is configured.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0";

/// Port the listening session binds to when none is configured.
pub const DEFAULT_BIND_PORT: u16 = 12345;

/// Command file evaluated at startup when none is configured.
pub const DEFAULT_CONFIG_FILE: &str = "/etc/datastored/datastore.conf";

/// Certificate chain presented by TLS sessions.
pub const DEFAULT_TLS_CERTIFICATE: &str = "/etc/datastored/tls/server.crt";

/// Private key for [`DEFAULT_TLS_CERTIFICATE`].
pub const DEFAULT_TLS_PRIVATE_KEY: &str = "/etc/datastored/tls/server.key";

/// Concurrent client sessions served by default.
pub const DEFAULT_SESSION_MAX: usize = 1024;

/// Upper bound on a single readiness poll.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

/// Default log filter expression used by the daemon.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Owned default bind address.
#[must_use]
pub fn default_bind_address() -> String {
    DEFAULT_BIND_ADDRESS.to_owned()
}

/// Default bind port.
#[must_use]
pub const fn default_bind_port() -> u16 {
    DEFAULT_BIND_PORT
}

/// Default listening transport.
#[must_use]
pub const fn default_protocol() -> TransportProtocol {
    TransportProtocol::Tcp
}

/// Owned default command file path.
#[must_use]
pub fn default_config_file() -> Utf8PathBuf {
    Utf8PathBuf::from(DEFAULT_CONFIG_FILE)
}

/// Owned default certificate path.
#[must_use]
pub fn default_tls_certificate() -> Utf8PathBuf {
    Utf8PathBuf::from(DEFAULT_TLS_CERTIFICATE)
}

/// Owned default private key path.
#[must_use]
pub fn default_tls_private_key() -> Utf8PathBuf {
    Utf8PathBuf::from(DEFAULT_TLS_PRIVATE_KEY)
}

/// Default client session bound.
#[must_use]
pub const fn default_session_max() -> usize {
    DEFAULT_SESSION_MAX
}

/// Default poll bound in milliseconds.
#[must_use]
pub const fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

/// Default log filter expression used by the daemon.
#[must_use]
pub const fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
#[must_use]
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format for the daemon.
#[must_use]
pub const fn default_log_format() -> LogFormat {
    LogFormat::Json
}
