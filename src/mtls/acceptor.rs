//! TLS acceptor that records the peer certificate serial.
//!
//! Wraps axum-server's `RustlsAcceptor`. Once the handshake completes, the
//! leaf certificate the client presented (already verified by rustls against
//! the configured CA) is parsed and its serial injected as a
//! [`ConnectionPeer`] extension into every request on that connection.

use std::io;
use std::sync::Arc;

use axum::Extension;
use axum::middleware::AddExtension;
use axum_server::accept::{Accept, DefaultAcceptor};
use axum_server::tls_rustls::{RustlsAcceptor, RustlsConfig};
use futures::future::BoxFuture;
use rustls::ServerConfig;
use rustls::pki_types::CertificateDer;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_rustls::server::TlsStream;
use tower::Layer;
use tracing::{debug, warn};

use super::identity::{ConnectionPeer, serial_from_der};

/// Accepts TLS connections and tags them with the peer serial.
#[derive(Clone)]
pub struct PeerCertAcceptor {
    inner: RustlsAcceptor<DefaultAcceptor>,
}

impl PeerCertAcceptor {
    /// Wrap a finished rustls server config.
    #[must_use]
    pub fn new(config: ServerConfig) -> Self {
        Self {
            inner: RustlsAcceptor::new(RustlsConfig::from_config(Arc::new(config))),
        }
    }
}

impl<I, S> Accept<I, S> for PeerCertAcceptor
where
    I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    S: Send + 'static,
{
    type Stream = TlsStream<I>;
    type Service = AddExtension<S, ConnectionPeer>;
    type Future = BoxFuture<'static, io::Result<(Self::Stream, Self::Service)>>;

    fn accept(&self, stream: I, service: S) -> Self::Future {
        let inner = self.inner.clone();
        Box::pin(async move {
            let (stream, service) = inner.accept(stream, service).await?;
            let peer = peer_from_chain(stream.get_ref().1.peer_certificates());
            Ok((stream, Extension(peer).layer(service)))
        })
    }
}

/// Serial of the leaf certificate, if the client sent one we can parse.
fn peer_from_chain(chain: Option<&[CertificateDer<'static>]>) -> ConnectionPeer {
    let Some(leaf) = chain.and_then(<[_]>::first) else {
        debug!("TLS peer presented no certificate");
        return ConnectionPeer::default();
    };
    match serial_from_der(leaf.as_ref()) {
        Ok(serial) => ConnectionPeer {
            serial: Some(serial),
        },
        Err(e) => {
            // rustls already verified it; a parse failure here means x509-parser
            // disagrees with webpki about the encoding.
            warn!(error = %e, "Unreadable peer certificate, treating caller as anonymous");
            ConnectionPeer::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use rcgen::{CertificateParams, KeyPair, SerialNumber};
    use x509_parser::num_bigint::BigUint;

    use super::*;

    #[test]
    fn leaf_serial_is_taken_from_first_certificate() {
        let key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::new(vec!["client".to_string()]).unwrap();
        params.serial_number = Some(SerialNumber::from_slice(&[0x1A, 0x2B]));
        let cert = params.self_signed(&key).unwrap();
        let chain = vec![cert.der().clone()];

        let peer = peer_from_chain(Some(&chain));

        assert_eq!(peer.serial, Some(BigUint::from(0x1A2B_u32)));
    }

    #[test]
    fn missing_or_garbage_chain_is_anonymous() {
        assert!(peer_from_chain(None).serial.is_none());
        assert!(peer_from_chain(Some(&[])).serial.is_none());

        let garbage = vec![CertificateDer::from(vec![0_u8, 1, 2, 3])];
        assert!(peer_from_chain(Some(&garbage)).serial.is_none());
    }
}
