//! Server-side TLS configuration for accepted sessions.

use std::fs;
use std::sync::Arc;

use camino::Utf8Path;
use rustls::ServerConfig;
use rustls::crypto::ring;
use rustls_pki_types::pem::PemObject;
use rustls_pki_types::{CertificateDer, PrivateKeyDer};

use super::TransportError;

/// Loads a PEM certificate chain and private key into a rustls server
/// configuration without client authentication.
///
/// # Errors
///
/// Returns [`TransportError::TlsMaterial`] when a file cannot be read,
/// [`TransportError::TlsParse`] when it holds no usable PEM section, and
/// [`TransportError::Tls`] when rustls rejects the pair.
pub fn load_server_config(
    certificate: &Utf8Path,
    private_key: &Utf8Path,
) -> Result<Arc<ServerConfig>, TransportError> {
    let chain = read_certificates(certificate)?;
    let key = read_private_key(private_key)?;
    let config = ServerConfig::builder_with_provider(Arc::new(ring::default_provider()))
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_single_cert(chain, key)?;
    Ok(Arc::new(config))
}

fn read_pem(path: &Utf8Path) -> Result<Vec<u8>, TransportError> {
    fs::read(path).map_err(|source| TransportError::TlsMaterial {
        path: path.to_path_buf(),
        source,
    })
}

fn read_certificates(path: &Utf8Path) -> Result<Vec<CertificateDer<'static>>, TransportError> {
    let pem = read_pem(path)?;
    let chain = CertificateDer::pem_slice_iter(&pem)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|error| TransportError::TlsParse {
            path: path.to_path_buf(),
            message: error.to_string(),
        })?;
    if chain.is_empty() {
        return Err(TransportError::TlsParse {
            path: path.to_path_buf(),
            message: String::from("no certificates found"),
        });
    }
    Ok(chain)
}

fn read_private_key(path: &Utf8Path) -> Result<PrivateKeyDer<'static>, TransportError> {
    let pem = read_pem(path)?;
    PrivateKeyDer::from_pem_slice(&pem).map_err(|error| TransportError::TlsParse {
        path: path.to_path_buf(),
        message: error.to_string(),
    })
}
