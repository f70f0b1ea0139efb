//! Certificate identity extraction.
//!
//! A client is identified by the serial number of the certificate it
//! presented during the mutual-TLS handshake. The serial is rendered as an
//! uppercase hexadecimal string without zero padding; the same canonical
//! form is produced for identities written in configuration, so that a
//! runtime lookup always agrees with what the operator configured.
//!
//! # Request context
//!
//! The transport inserts a [`ConnectionPeer`] into every request's
//! extensions. [`attach_identity`] turns that serial into a
//! [`ResolvedClient`] when the client is known; an unknown serial leaves the
//! extensions untouched and the request is treated as anonymous.

use std::fmt;
use std::sync::Arc;

use axum::http::Extensions;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use x509_parser::certificate::X509Certificate;
use x509_parser::num_bigint::BigUint;
use x509_parser::prelude::FromDer;

use crate::client::{Client, ClientRegistry};
use crate::{Error, Result};

// ─────────────────────────────────────────────────────────────────────────────
// Canonical identity
// ─────────────────────────────────────────────────────────────────────────────

/// Canonical client identity: uppercase hex of the certificate serial.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identity(String);

impl Identity {
    /// Canonicalise an identity string taken from configuration.
    ///
    /// Accepts lowercase digits, an optional `0x` prefix and `:` separators
    /// (the form printed by `openssl x509 -serial` variants). Leading zeros
    /// are dropped so that `"00AB"` and `"ab"` name the same client.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` when the string is empty or contains a
    /// non-hexadecimal character.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let body = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);

        let digits: String = body.chars().filter(|c| *c != ':').collect();
        if digits.is_empty() {
            return Err(Error::Config(format!("Empty client identity: '{raw}'")));
        }
        if let Some(bad) = digits.chars().find(|c| !c.is_ascii_hexdigit()) {
            return Err(Error::Config(format!(
                "Client identity '{raw}' is not hexadecimal (unexpected '{bad}')"
            )));
        }

        let stripped = digits.trim_start_matches('0');
        let canonical = if stripped.is_empty() {
            "0".to_owned()
        } else {
            stripped.to_ascii_uppercase()
        };
        Ok(Self(canonical))
    }

    /// The canonical string form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl Serialize for Identity {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Identity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Map a certificate serial number to its canonical identity.
///
/// Deterministic and injective: distinct serials never share an identity.
#[must_use]
pub fn extract_identity(serial: &BigUint) -> Identity {
    Identity(serial.to_str_radix(16).to_ascii_uppercase())
}

/// Read the serial number from a DER-encoded certificate.
///
/// # Errors
///
/// Returns `Error::Config` if the certificate cannot be parsed.
pub fn serial_from_der(der: &[u8]) -> Result<BigUint> {
    let (_, cert) = X509Certificate::from_der(der)
        .map_err(|e| Error::Config(format!("Failed to parse client certificate: {e}")))?;
    Ok(cert.serial.clone())
}

// ─────────────────────────────────────────────────────────────────────────────
// Request context
// ─────────────────────────────────────────────────────────────────────────────

/// Peer information for one transport connection.
///
/// Inserted by the TLS acceptor; `serial` is `None` on plain-TCP listeners
/// or when the peer presented no certificate.
#[derive(Debug, Clone, Default)]
pub struct ConnectionPeer {
    /// Serial number of the verified leaf certificate.
    pub serial: Option<BigUint>,
}

/// The registry entry resolved for the calling peer.
#[derive(Debug, Clone)]
pub struct ResolvedClient(pub Arc<Client>);

/// Resolve `serial` against `clients` and attach the result to `extensions`.
///
/// Returns `true` when a client was found. An unknown serial is not an
/// error: the extensions are left as they were and the caller is anonymous.
pub fn attach_identity(
    extensions: &mut Extensions,
    clients: &ClientRegistry,
    serial: &BigUint,
) -> bool {
    let identity = extract_identity(serial);
    match clients.lookup(&identity) {
        Some(client) => {
            extensions.insert(ResolvedClient(Arc::clone(client)));
            true
        }
        None => false,
    }
}

/// Read back whatever client [`attach_identity`] attached.
#[must_use]
pub fn resolve_identity(extensions: &Extensions) -> Option<&Client> {
    extensions.get::<ResolvedClient>().map(|r| r.0.as_ref())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Scope;
    use crate::config::ClientConfig;
    use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair, SerialNumber};

    // ── helpers ──────────────────────────────────────────────────────────────

    /// Generate a self-signed DER cert with the given serial bytes.
    fn make_cert_der(serial: &[u8]) -> Vec<u8> {
        let mut params = CertificateParams::new(vec!["client.test".to_owned()])
            .expect("valid SAN");
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, "orders-client");
        params.distinguished_name = dn;
        params.serial_number = Some(SerialNumber::from_slice(serial));

        let key_pair = KeyPair::generate().expect("key generation failed");
        let cert = params
            .self_signed(&key_pair)
            .expect("rcgen cert generation failed");
        cert.der().to_vec()
    }

    fn registry(identities: &[&str]) -> ClientRegistry {
        let clients: Vec<ClientConfig> = identities
            .iter()
            .map(|id| ClientConfig {
                identity: (*id).to_owned(),
                scopes: vec![Scope::Read],
            })
            .collect();
        ClientRegistry::from_config(&clients).unwrap()
    }

    // ── extract_identity ─────────────────────────────────────────────────────

    #[test]
    fn extract_identity_is_uppercase_hex() {
        let serial = BigUint::from(0x12ff_00d4_u64);
        assert_eq!(extract_identity(&serial).as_str(), "12FF00D4");
    }

    #[test]
    fn extract_identity_has_no_zero_padding() {
        let serial = BigUint::from(0x0a_u64);
        assert_eq!(extract_identity(&serial).as_str(), "A");
    }

    #[test]
    fn extract_identity_of_zero_is_zero() {
        assert_eq!(extract_identity(&BigUint::from(0_u8)).as_str(), "0");
    }

    #[test]
    fn extract_identity_handles_serials_wider_than_u128() {
        let serial = BigUint::parse_bytes(b"12FFAB34CD56EF7890123456789ABCDEF0D4", 16).unwrap();
        assert_eq!(
            extract_identity(&serial).as_str(),
            "12FFAB34CD56EF7890123456789ABCDEF0D4"
        );
    }

    #[test]
    fn extract_identity_is_stable() {
        let serial = BigUint::from(987_654_321_u64);
        assert_eq!(extract_identity(&serial), extract_identity(&serial.clone()));
    }

    // ── Identity::parse ──────────────────────────────────────────────────────

    #[test]
    fn parse_canonicalises_case_prefix_separators_and_padding() {
        for raw in ["12ffd4", "0x12FFD4", "12:FF:D4", "0012FFD4", " 12FFD4 "] {
            assert_eq!(Identity::parse(raw).unwrap().as_str(), "12FFD4", "{raw}");
        }
    }

    #[test]
    fn parse_rejects_non_hex() {
        let err = Identity::parse("12FG").unwrap_err();
        assert!(err.to_string().contains("not hexadecimal"));
    }

    #[test]
    fn parse_rejects_empty() {
        assert!(Identity::parse("").is_err());
        assert!(Identity::parse("0x").is_err());
    }

    #[test]
    fn parse_agrees_with_extract_identity() {
        // GIVEN: a serial and the hex string an operator would configure
        let serial = BigUint::from(0xdead_beef_u64);
        // THEN: both sides land on the same key
        assert_eq!(Identity::parse("deadbeef").unwrap(), extract_identity(&serial));
    }

    // ── serial_from_der ──────────────────────────────────────────────────────

    #[test]
    fn serial_from_der_reads_certificate_serial() {
        // GIVEN: cert with serial 0x12FFD4
        let der = make_cert_der(&[0x12, 0xFF, 0xD4]);
        // WHEN: extracting
        let serial = serial_from_der(&der).unwrap();
        // THEN: identity matches the configured hex string
        assert_eq!(extract_identity(&serial).as_str(), "12FFD4");
    }

    #[test]
    fn serial_from_der_invalid_bytes_returns_error() {
        assert!(serial_from_der(b"not a cert").is_err());
    }

    // ── attach / resolve ─────────────────────────────────────────────────────

    #[test]
    fn attach_identity_resolves_known_client() {
        let clients = registry(&["12FFD4"]);
        let mut ext = Extensions::new();

        let found = attach_identity(&mut ext, &clients, &BigUint::from(0x12ffd4_u32));

        assert!(found);
        let client = resolve_identity(&ext).expect("client attached");
        assert_eq!(client.identity.as_str(), "12FFD4");
    }

    #[test]
    fn attach_identity_leaves_context_unchanged_for_unknown_client() {
        let clients = registry(&["12FFD4"]);
        let mut ext = Extensions::new();

        let found = attach_identity(&mut ext, &clients, &BigUint::from(0x99_u32));

        assert!(!found);
        assert!(resolve_identity(&ext).is_none());
        assert!(ext.is_empty());
    }

    #[test]
    fn resolve_identity_on_empty_context_is_none() {
        assert!(resolve_identity(&Extensions::new()).is_none());
    }
}
