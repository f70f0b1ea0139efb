//! Mutual TLS: transport security and client identity.
//!
//! ```text
//! TCP connection
//!   → TLS handshake          (rustls verifies the client cert against the CA)
//!   → PeerCertAcceptor       (leaf serial → ConnectionPeer extension)
//!   → authorize middleware   (serial → Identity → Client → decision)
//! ```
//!
//! - [`config`]: YAML configuration (`MtlsConfig`)
//! - [`identity`]: serial → canonical [`Identity`], request-context helpers
//! - [`tls`]: rustls `ServerConfig` from PEM files
//! - [`acceptor`]: axum-server acceptor that records the peer serial

pub mod acceptor;
pub mod config;
pub mod identity;
pub mod tls;

pub use acceptor::PeerCertAcceptor;
pub use config::MtlsConfig;
pub use identity::{
    ConnectionPeer, Identity, ResolvedClient, attach_identity, extract_identity, resolve_identity,
    serial_from_der,
};
pub use tls::{build_tls_config, load_certs, load_private_key};
