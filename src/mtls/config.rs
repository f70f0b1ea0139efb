//! mTLS configuration types.
//!
//! ```yaml
//! mtls:
//!   enabled: true
//!   server_cert: "/etc/rpc-gateway/tls/server.crt"
//!   server_key:  "/etc/rpc-gateway/tls/server.key"
//!   ca_cert:     "/etc/rpc-gateway/tls/ca.crt"
//!   require_client_cert: true
//! ```

use serde::{Deserialize, Serialize};

/// Top-level mTLS configuration block.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MtlsConfig {
    /// Terminate TLS and derive client identity from peer certificates.
    ///
    /// When `false` the gateway listens on plain TCP and every caller is
    /// anonymous, so only methods reachable with no scopes are served.
    pub enabled: bool,

    /// PEM server certificate chain.
    pub server_cert: String,

    /// PEM server private key.
    pub server_key: String,

    /// PEM CA bundle that client certificates must chain to.
    pub ca_cert: String,

    /// Reject the handshake when the client presents no certificate.
    ///
    /// With `false`, certificate-less callers connect and are treated as
    /// anonymous.
    pub require_client_cert: bool,
}

impl Default for MtlsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            server_cert: String::new(),
            server_key: String::new(),
            ca_cert: String::new(),
            require_client_cert: true,
        }
    }
}
