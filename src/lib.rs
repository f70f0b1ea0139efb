//! RPC Gateway Library
//!
//! Multi-tenant RPC gateway that fronts several business services (orders,
//! payments, products) behind one mutual-TLS endpoint.
//!
//! # Features
//!
//! - **Certificate identity**: the client is the serial number of the
//!   certificate it presented, rendered as canonical uppercase hex
//! - **Scope-based authorization**: `*`, `public`, `read` and `write` scopes
//!   checked against each service's declared read and write methods
//! - **Bind-once service slots**: each service is registered exactly once
//!   at startup
//! - **Payment providers**: Stripe and an in-memory sandbox behind one
//!   interface, with per-request deadlines and call-site retry

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod failsafe;
pub mod gateway;
pub mod mtls;
pub mod payment;
pub mod service;

pub use error::{Error, Result};

use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
///
/// `RUST_LOG` takes precedence over `level`. `format` is `text` (default)
/// or `json`.
///
/// # Errors
///
/// Returns `Error::Config` if `level` is not a valid filter directive or a
/// global subscriber is already installed.
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level)
            .map_err(|e| Error::Config(format!("Invalid log level '{level}': {e}")))?,
    };

    let subscriber = tracing_subscriber::registry().with(filter);

    let installed = match format {
        Some("json") => subscriber.with(fmt::layer().json()).try_init(),
        _ => subscriber.with(fmt::layer()).try_init(),
    };
    installed.map_err(|e| Error::Config(format!("Cannot install tracing subscriber: {e}")))
}

/// Install the aws-lc-rs rustls provider for the process.
///
/// Returns `false` when a provider was already installed; the existing one
/// stays in effect.
pub fn install_crypto_provider() -> bool {
    let installed = rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .is_ok();
    if !installed {
        debug!("rustls crypto provider already installed, keeping it");
    }
    installed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_provider_install_keeps_the_first() {
        install_crypto_provider();
        assert!(!install_crypto_provider());
        assert!(rustls::crypto::CryptoProvider::get_default().is_some());
    }
}
