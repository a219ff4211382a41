//! TLS material loading for the optional encrypted listener.
//!
//! Certificate chain and private key are loaded once at boot from PEM files
//! and turned into a [`TlsAcceptor`]. Connections are server-authenticated
//! only; client certificates are not requested.

use rustls_pki_types::{CertificateDer, PrivateKeyDer};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio_rustls::TlsAcceptor;

#[derive(Debug, Error)]
pub enum TlsError {
    #[error("certificate file not found: {0}")]
    CertificateNotFound(PathBuf),
    #[error("private key file not found: {0}")]
    PrivateKeyNotFound(PathBuf),
    #[error("failed to parse certificate file: {0}")]
    CertificateParse(PathBuf),
    #[error("no private key found in {0}")]
    NoPrivateKey(PathBuf),
    #[error("TLS configuration rejected: {0}")]
    Configuration(#[from] rustls::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Build a [`TlsAcceptor`] from a PEM certificate chain and private key.
pub fn load_tls_acceptor(certfile: &Path, keyfile: &Path) -> Result<TlsAcceptor, TlsError> {
    if !certfile.exists() {
        return Err(TlsError::CertificateNotFound(certfile.to_path_buf()));
    }
    if !keyfile.exists() {
        return Err(TlsError::PrivateKeyNotFound(keyfile.to_path_buf()));
    }

    let mut cert_reader = BufReader::new(File::open(certfile)?);
    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut cert_reader)
        .collect::<Result<_, _>>()
        .map_err(|_| TlsError::CertificateParse(certfile.to_path_buf()))?;
    if certs.is_empty() {
        return Err(TlsError::CertificateParse(certfile.to_path_buf()));
    }

    let mut key_reader = BufReader::new(File::open(keyfile)?);
    let key: PrivateKeyDer<'static> = rustls_pemfile::private_key(&mut key_reader)?
        .ok_or_else(|| TlsError::NoPrivateKey(keyfile.to_path_buf()))?;

    let config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)?;

    Ok(TlsAcceptor::from(Arc::new(config)))
}
