//! rustls server configuration from PEM material.
//!
//! All certificate and key files are PEM; DER is not accepted.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use rustls::RootCertStore;
use rustls::ServerConfig;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::server::danger::ClientCertVerifier;
use tracing::debug;

use super::config::MtlsConfig;
use crate::{Error, Result};

/// Build the server-side TLS config.
///
/// Client certificates must chain to `ca_cert`. When
/// `require_client_cert` is off, certificate-less clients are let through
/// (they end up anonymous) but a presented certificate is still verified.
///
/// # Errors
///
/// Returns `Error::Config` if any file cannot be read or parsed, or the
/// certificate and key do not belong together.
pub fn build_tls_config(config: &MtlsConfig) -> Result<ServerConfig> {
    let chain = load_certs(&config.server_cert)?;
    let key = load_private_key(&config.server_key)?;

    let mut roots = RootCertStore::empty();
    for ca in load_certs(&config.ca_cert)? {
        roots
            .add(ca)
            .map_err(|e| Error::Config(format!("Invalid CA certificate in '{}': {e}", config.ca_cert)))?;
    }

    let verifier = client_verifier(roots, config.require_client_cert)?;

    let mut tls = ServerConfig::builder()
        .with_client_cert_verifier(verifier)
        .with_single_cert(chain, key)
        .map_err(|e| Error::Config(format!("Server certificate and key rejected: {e}")))?;
    tls.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

    debug!(
        server_cert = %config.server_cert,
        ca_cert = %config.ca_cert,
        require_client_cert = config.require_client_cert,
        "TLS server config built"
    );
    Ok(tls)
}

fn client_verifier(roots: RootCertStore, required: bool) -> Result<Arc<dyn ClientCertVerifier>> {
    let builder = WebPkiClientVerifier::builder(Arc::new(roots));
    let builder = if required {
        builder
    } else {
        builder.allow_unauthenticated()
    };
    builder
        .build()
        .map_err(|e| Error::Config(format!("Cannot build client certificate verifier: {e}")))
}

/// Every certificate in a PEM file, in file order.
///
/// # Errors
///
/// Returns `Error::Config` if the file is unreadable or holds no certificate.
pub fn load_certs(path: impl AsRef<Path>) -> Result<Vec<CertificateDer<'static>>> {
    let path = path.as_ref();
    let pem = read_pem(path)?;
    let certs = rustls_pemfile::certs(&mut pem.as_slice())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::Config(format!("Malformed PEM in '{}': {e}", path.display())))?;

    if certs.is_empty() {
        return Err(Error::Config(format!(
            "No certificate in '{}'",
            path.display()
        )));
    }
    Ok(certs)
}

/// The first private key (PKCS#8, PKCS#1 or SEC1) in a PEM file.
///
/// # Errors
///
/// Returns `Error::Config` if the file is unreadable or holds no key.
pub fn load_private_key(path: impl AsRef<Path>) -> Result<PrivateKeyDer<'static>> {
    let path = path.as_ref();
    let pem = read_pem(path)?;
    rustls_pemfile::private_key(&mut pem.as_slice())
        .map_err(|e| Error::Config(format!("Malformed PEM in '{}': {e}", path.display())))?
        .ok_or_else(|| Error::Config(format!("No private key in '{}'", path.display())))
}

fn read_pem(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| Error::Config(format!("Cannot read '{}': {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use rcgen::{BasicConstraints, CertificateParams, IsCa, KeyPair};

    use super::*;

    struct Material {
        _dir: tempfile::TempDir,
        config: MtlsConfig,
    }

    fn write_material() -> Material {
        let dir = tempfile::tempdir().unwrap();

        let ca_key = KeyPair::generate().unwrap();
        let mut ca_params = CertificateParams::new(Vec::<String>::new()).unwrap();
        ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        let ca = ca_params.self_signed(&ca_key).unwrap();

        // rustls does not check the server chain against the CA here, so a
        // self-signed server certificate is enough.
        let server_key = KeyPair::generate().unwrap();
        let server = CertificateParams::new(vec!["localhost".to_string()])
            .unwrap()
            .self_signed(&server_key)
            .unwrap();

        let path = |name: &str| dir.path().join(name).to_string_lossy().into_owned();
        fs::write(path("ca.crt"), ca.pem()).unwrap();
        fs::write(path("server.crt"), server.pem()).unwrap();
        fs::write(path("server.key"), server_key.serialize_pem()).unwrap();

        let config = MtlsConfig {
            enabled: true,
            server_cert: path("server.crt"),
            server_key: path("server.key"),
            ca_cert: path("ca.crt"),
            require_client_cert: true,
        };
        Material { _dir: dir, config }
    }

    fn install_crypto_provider() {
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
    }

    #[test]
    fn builds_config_from_generated_material() {
        install_crypto_provider();
        let material = write_material();
        let tls = build_tls_config(&material.config).unwrap();
        assert_eq!(tls.alpn_protocols[0], b"h2".to_vec());
    }

    #[test]
    fn optional_client_cert_also_builds() {
        install_crypto_provider();
        let mut material = write_material();
        material.config.require_client_cert = false;
        build_tls_config(&material.config).unwrap();
    }

    #[test]
    fn missing_file_is_config_error() {
        let err = load_certs("/nonexistent/ca.crt").unwrap_err();
        assert!(matches!(err, Error::Config(msg) if msg.contains("Cannot read")));
    }

    #[test]
    fn key_file_without_certificate_is_rejected() {
        let material = write_material();
        let err = load_certs(&material.config.server_key).unwrap_err();
        assert!(err.to_string().contains("No certificate"));
        load_private_key(&material.config.server_key).unwrap();
    }
}
