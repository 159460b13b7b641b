//! Client certificate loading and TLS configuration.

use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::{ClientConfig, RootCertStore};

use crate::error::{Error, Result};

fn open(path: &Path, what: &str) -> io::Result<BufReader<File>> {
    if !path.exists() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("{what} file not found: {}", path.display()),
        ));
    }
    Ok(BufReader::new(File::open(path)?))
}

/// Read every certificate in a PEM file.
pub fn load_certs(path: &Path) -> io::Result<Vec<CertificateDer<'static>>> {
    let mut reader = open(path, "Certificate")?;
    let certs = rustls_pemfile::certs(&mut reader).collect::<io::Result<Vec<_>>>()?;
    if certs.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("no certificates in {}", path.display()),
        ));
    }
    Ok(certs)
}

/// Read the first private key in a PEM file.
pub fn load_key(path: &Path) -> io::Result<PrivateKeyDer<'static>> {
    let mut reader = open(path, "Private key")?;
    rustls_pemfile::private_key(&mut reader)?.ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("no private key in {}", path.display()),
        )
    })
}

/// Build a client TLS configuration from PEM files.
///
/// When `key_path` is `None` the key is read from the certificate file,
/// which is how push certificates are commonly exported.
pub fn load_client_config(cert_path: &Path, key_path: Option<&Path>) -> Result<Arc<ClientConfig>> {
    let certs = load_certs(cert_path).map_err(|err| Error::Tls(err.to_string()))?;
    let key = load_key(key_path.unwrap_or(cert_path)).map_err(|err| Error::Tls(err.to_string()))?;
    client_config(certs, key)
}

/// TLS configuration presenting `certs`/`key`, trusting the webpki roots,
/// and offering only `h2`.
pub fn client_config(
    certs: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
) -> Result<Arc<ClientConfig>> {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let mut config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|err| Error::Tls(err.to_string()))?
        .with_root_certificates(roots)
        .with_client_auth_cert(certs, key)
        .map_err(|err| Error::Tls(err.to_string()))?;
    config.alpn_protocols = vec![b"h2".to_vec()];
    Ok(Arc::new(config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_files_are_reported() {
        let err = load_certs(Path::new("/nonexistent/push-cert.pem")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);

        match load_client_config(Path::new("/nonexistent/push-cert.pem"), None) {
            Err(Error::Tls(message)) => assert!(message.contains("Certificate file not found")),
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn pem_without_certificates_rejected() {
        let path = std::env::temp_dir().join(format!("push-client-empty-{}.pem", std::process::id()));
        std::fs::write(&path, "not a pem file\n").unwrap();
        let err = load_certs(&path).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        let err = load_key(&path).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        std::fs::remove_file(&path).ok();
    }
}
