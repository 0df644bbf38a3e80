use rustls_pki_types::pem::PemObject;
use rustls_pki_types::{CertificateDer, PrivateKeyDer};
use std::path::Path;
use tonic::transport::{Certificate, Identity, Server, ServerTlsConfig};

use crate::server::config::TlsConfig;
use crate::server::error::{Error, Result};

fn tls_error(path: &Path, reason: impl ToString) -> Error {
    Error::Tls {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

fn read(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|err| tls_error(path, err))
}

/// Reads a PEM bundle holding at least one certificate.
pub fn read_certificates(path: &Path) -> Result<Vec<u8>> {
    let pem = read(path)?;
    let mut count = 0usize;
    for cert in CertificateDer::pem_slice_iter(&pem) {
        cert.map_err(|err| tls_error(path, err))?;
        count += 1;
    }
    if count == 0 {
        return Err(tls_error(path, "no certificate found"));
    }
    Ok(pem)
}

/// Reads a PEM file holding a private key.
pub fn read_private_key(path: &Path) -> Result<Vec<u8>> {
    let pem = read(path)?;
    PrivateKeyDer::from_pem_slice(&pem).map_err(|err| tls_error(path, err))?;
    Ok(pem)
}

/// Builds server credentials that require client certificates signed by the
/// configured CA.
///
/// # Errors
///
/// Returns [`Error::Tls`] naming the offending file if any file is
/// unreadable or unparsable, or naming the certificate if the key does not
/// match it.
pub fn load(config: &TlsConfig) -> Result<ServerTlsConfig> {
    let cert = read_certificates(&config.cert_path)?;
    let key = read_private_key(&config.key_path)?;
    let ca = read_certificates(&config.ca_path)?;

    let tls = ServerTlsConfig::new()
        .identity(Identity::from_pem(cert, key))
        .client_ca_root(Certificate::from_pem(ca));

    // Building the acceptor now surfaces key mismatches before any bind.
    Server::builder()
        .tls_config(tls.clone())
        .map_err(|err| tls_error(&config.cert_path, err))?;

    tracing::debug!(
        cert = %config.cert_path.display(),
        ca = %config.ca_path.display(),
        "mutual TLS credentials loaded"
    );
    Ok(tls)
}
