//! Client registry: who may call the gateway and with which scopes.
//!
//! The registry is built once from configuration before the transport starts
//! accepting connections, then shared as `Arc<ClientRegistry>` and only read.
//! Mutation requires `&mut self`, so once shared it cannot change.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::ClientConfig;
use crate::mtls::identity::Identity;
use crate::{Error, Result};

// ─────────────────────────────────────────────────────────────────────────────
// Scope
// ─────────────────────────────────────────────────────────────────────────────

/// Capability tag granted to a client.
///
/// Scopes are opaque: none of them implies another. [`Scope::Wildcard`] is
/// the only scope that grants everything, and it has to be checked
/// explicitly wherever `Read` or `Write` are checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Scope {
    /// Every method, classified or not.
    #[serde(rename = "*")]
    Wildcard,
    /// Read-classified methods open to anonymous-grade callers.
    #[serde(rename = "public")]
    Public,
    /// Write-classified methods.
    #[serde(rename = "write")]
    Write,
    /// Read-classified methods.
    #[serde(rename = "read")]
    Read,
}

impl Scope {
    /// Configuration tag for this scope.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Wildcard => "*",
            Self::Public => "public",
            Self::Write => "write",
            Self::Read => "read",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scope {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "*" => Ok(Self::Wildcard),
            "public" => Ok(Self::Public),
            "write" => Ok(Self::Write),
            "read" => Ok(Self::Read),
            other => Err(Error::Config(format!(
                "Unknown scope '{other}' (expected one of: *, public, read, write)"
            ))),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Client
// ─────────────────────────────────────────────────────────────────────────────

/// A known caller and the scopes it was granted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Client {
    /// Canonical certificate-serial identity.
    pub identity: Identity,
    /// Granted scopes.
    pub scopes: BTreeSet<Scope>,
}

impl Client {
    /// Build a client from an identity and scopes.
    pub fn new(identity: Identity, scopes: impl IntoIterator<Item = Scope>) -> Self {
        Self {
            identity,
            scopes: scopes.into_iter().collect(),
        }
    }

    /// Whether `scope` was granted literally (no implication).
    #[must_use]
    pub fn has_scope(&self, scope: Scope) -> bool {
        self.scopes.contains(&scope)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Registry
// ─────────────────────────────────────────────────────────────────────────────

/// In-memory table of known clients.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: Vec<Arc<Client>>,
    index: HashMap<Identity, usize>,
}

impl ClientRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from configuration.
    ///
    /// # Errors
    ///
    /// See [`ClientRegistry::load`].
    pub fn from_config(clients: &[ClientConfig]) -> Result<Self> {
        let mut registry = Self::new();
        registry.load(clients)?;
        Ok(registry)
    }

    /// Replace the table with `clients`.
    ///
    /// The new table is built completely before it replaces the old one, so
    /// a failed load leaves the registry as it was. Loading twice does not
    /// accumulate entries.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for an identity that is not hexadecimal and
    /// `Error::DuplicateClient` when two entries share a canonical identity.
    pub fn load(&mut self, clients: &[ClientConfig]) -> Result<()> {
        let mut table = Vec::with_capacity(clients.len());
        let mut index = HashMap::with_capacity(clients.len());

        for entry in clients {
            let identity = Identity::parse(&entry.identity)?;
            if index.contains_key(&identity) {
                return Err(Error::DuplicateClient(identity.to_string()));
            }
            debug!(client = %identity, scopes = ?entry.scopes, "Registering client");
            index.insert(identity.clone(), table.len());
            table.push(Arc::new(Client::new(identity, entry.scopes.iter().copied())));
        }

        info!(clients = table.len(), "Client registry loaded");
        self.clients = table;
        self.index = index;
        Ok(())
    }

    /// Find the client with `identity`.
    #[must_use]
    pub fn lookup(&self, identity: &Identity) -> Option<&Arc<Client>> {
        self.index.get(identity).map(|&i| &self.clients[i])
    }

    /// Iterate over clients in configuration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Client>> {
        self.clients.iter()
    }

    /// Number of registered clients.
    #[must_use]
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Returns `true` if no clients are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(identity: &str, scopes: &[Scope]) -> ClientConfig {
        ClientConfig {
            identity: identity.to_owned(),
            scopes: scopes.to_vec(),
        }
    }

    #[test]
    fn lookup_finds_configured_client() {
        let registry =
            ClientRegistry::from_config(&[entry("12FFD4", &[Scope::Read, Scope::Write])]).unwrap();

        let client = registry.lookup(&Identity::parse("12ffd4").unwrap()).unwrap();

        assert!(client.has_scope(Scope::Read));
        assert!(client.has_scope(Scope::Write));
        assert!(!client.has_scope(Scope::Wildcard));
    }

    #[test]
    fn lookup_unknown_identity_is_none() {
        let registry = ClientRegistry::from_config(&[entry("AB", &[Scope::Read])]).unwrap();
        assert!(registry.lookup(&Identity::parse("CD").unwrap()).is_none());
    }

    #[test]
    fn duplicate_identity_is_rejected_after_canonicalisation() {
        // GIVEN: two spellings of the same serial
        let result = ClientRegistry::from_config(&[
            entry("00ab", &[Scope::Read]),
            entry("AB", &[Scope::Wildcard]),
        ]);
        // THEN: startup fails instead of silently keeping both
        assert!(matches!(result, Err(Error::DuplicateClient(id)) if id == "AB"));
    }

    #[test]
    fn malformed_identity_is_rejected() {
        let result = ClientRegistry::from_config(&[entry("not-hex", &[Scope::Read])]);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn reload_replaces_instead_of_accumulating() {
        let mut registry = ClientRegistry::from_config(&[entry("01", &[Scope::Read])]).unwrap();

        registry.load(&[entry("02", &[Scope::Write])]).unwrap();

        assert_eq!(registry.len(), 1);
        assert!(registry.lookup(&Identity::parse("01").unwrap()).is_none());
        assert!(registry.lookup(&Identity::parse("02").unwrap()).is_some());
    }

    #[test]
    fn failed_reload_keeps_previous_table() {
        let mut registry = ClientRegistry::from_config(&[entry("01", &[Scope::Read])]).unwrap();

        let result = registry.load(&[entry("02", &[]), entry("2", &[])]);

        assert!(result.is_err());
        assert_eq!(registry.len(), 1);
        assert!(registry.lookup(&Identity::parse("01").unwrap()).is_some());
    }

    #[test]
    fn iter_preserves_configuration_order() {
        let registry = ClientRegistry::from_config(&[
            entry("0C", &[]),
            entry("0A", &[]),
            entry("0B", &[]),
        ])
        .unwrap();

        let order: Vec<&str> = registry.iter().map(|c| c.identity.as_str()).collect();
        assert_eq!(order, ["C", "A", "B"]);
    }

    #[test]
    fn scope_tags_round_trip_through_from_str() {
        for scope in [Scope::Wildcard, Scope::Public, Scope::Write, Scope::Read] {
            assert_eq!(scope.as_str().parse::<Scope>().unwrap(), scope);
        }
        assert!("admin".parse::<Scope>().is_err());
    }

    #[test]
    fn scopes_deserialise_from_yaml_tags() {
        let scopes: Vec<Scope> = serde_yaml::from_str("['*', public, read, write]").unwrap();
        assert_eq!(
            scopes,
            [Scope::Wildcard, Scope::Public, Scope::Read, Scope::Write]
        );
    }
}
