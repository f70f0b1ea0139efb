//! Configuration management
//!
//! One YAML file, overridable per key from the environment:
//! `RPC_GATEWAY_SERVER__PORT=9443` sets `server.port`.
//!
//! ```yaml
//! server:
//!   host: "0.0.0.0"
//!   port: 8443
//!   default_deadline: 30s
//! mtls:
//!   enabled: true
//!   server_cert: /etc/rpc-gateway/tls/server.crt
//!   server_key:  /etc/rpc-gateway/tls/server.key
//!   ca_cert:     /etc/rpc-gateway/tls/ca.crt
//! clients:
//!   - identity: "1A2B"
//!     scopes: [read, write]
//!   - identity: "FF"
//!     scopes: ["*"]
//! payments:
//!   enabled: true
//!   provider:
//!     kind: stripe
//!     secret_key: sk_live_...
//!   retry:
//!     max_attempts: 3
//!     backoff: 200ms
//! ```

use std::fmt;
use std::path::Path;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};

use crate::client::{ClientRegistry, Scope};
use crate::mtls::MtlsConfig;
use crate::payment::CardType;
use crate::{Error, Result};

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "RPC_GATEWAY_";

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Listener settings
    pub server: ServerConfig,
    /// Mutual TLS
    pub mtls: MtlsConfig,
    /// Known clients and their scopes
    pub clients: Vec<ClientConfig>,
    /// Payment backend
    pub payments: PaymentsConfig,
}

/// Listener settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address
    pub host: String,
    /// Bind port
    pub port: u16,
    /// Deadline applied when a request carries no `grpc-timeout`
    #[serde(with = "duration_serde")]
    pub default_deadline: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8443,
            default_deadline: Duration::from_secs(30),
        }
    }
}

/// A configured client: certificate serial (hex) and granted scopes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Hex certificate serial, as printed by `openssl x509 -serial`
    pub identity: String,
    /// Granted scope tags
    #[serde(default)]
    pub scopes: Vec<Scope>,
}

/// Payment backend settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PaymentsConfig {
    /// Bind the payment service at startup
    pub enabled: bool,
    /// Which backend, and its settings
    pub provider: ProviderConfig,
    /// Call-site retry for backend calls
    pub retry: RetryConfig,
}

impl Default for PaymentsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            provider: ProviderConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

/// Payment backend, selected by `kind`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProviderConfig {
    /// Stripe REST API
    Stripe(StripeConfig),
    /// In-memory sandbox
    Sandbox(SandboxConfig),
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self::Sandbox(SandboxConfig::default())
    }
}

/// Stripe credentials and endpoint
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StripeConfig {
    /// Secret API key (`sk_...`)
    pub secret_key: String,
    /// API root; overridable for test doubles
    pub base_url: String,
    /// Card networks enabled on the account
    pub supported_cards: Vec<CardType>,
    /// Per-request HTTP timeout
    #[serde(with = "duration_serde")]
    pub request_timeout: Duration,
}

impl Default for StripeConfig {
    fn default() -> Self {
        Self {
            secret_key: String::new(),
            base_url: "https://api.stripe.com".to_string(),
            supported_cards: vec![
                CardType::Visa,
                CardType::Mastercard,
                CardType::Amex,
                CardType::Discover,
                CardType::Jcb,
                CardType::DinersClub,
                CardType::UnionPay,
            ],
            request_timeout: Duration::from_secs(20),
        }
    }
}

impl fmt::Debug for StripeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StripeConfig")
            .field("secret_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("supported_cards", &self.supported_cards)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

/// In-memory sandbox behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Card networks the sandbox claims to accept
    pub supported_cards: Vec<CardType>,
    /// Source tokens that are always declined
    pub declined_sources: Vec<String>,
    /// Artificial delay before every backend call
    #[serde(with = "duration_serde")]
    pub latency: Duration,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            supported_cards: vec![CardType::Visa, CardType::Mastercard],
            declined_sources: vec!["tok_chargeDeclined".to_string()],
            latency: Duration::ZERO,
        }
    }
}

/// Fixed-count, fixed-delay retry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retry at all
    pub enabled: bool,
    /// Total attempts including the first
    pub max_attempts: u32,
    /// Pause between attempts
    #[serde(with = "duration_serde")]
    pub backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 3,
            backoff: Duration::from_millis(200),
        }
    }
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist or cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))
    }

    /// Reject settings that would only fail later, at bind or first call.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` (or `Error::DuplicateClient`) describing the
    /// first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.server.default_deadline.is_zero() {
            return Err(Error::Config(
                "server.default_deadline must be greater than zero".to_string(),
            ));
        }

        if self.mtls.enabled {
            for (key, value) in [
                ("mtls.server_cert", &self.mtls.server_cert),
                ("mtls.server_key", &self.mtls.server_key),
                ("mtls.ca_cert", &self.mtls.ca_cert),
            ] {
                if value.trim().is_empty() {
                    return Err(Error::Config(format!("{key} is required when mTLS is enabled")));
                }
            }
        }

        ClientRegistry::from_config(&self.clients)?;

        if self.payments.enabled {
            if let ProviderConfig::Stripe(stripe) = &self.payments.provider {
                if stripe.secret_key.trim().is_empty() {
                    return Err(Error::Config(
                        "payments.provider.secret_key is required for the stripe provider"
                            .to_string(),
                    ));
                }
            }
            if self.payments.retry.enabled && self.payments.retry.max_attempts == 0 {
                return Err(Error::Config(
                    "payments.retry.max_attempts must be at least 1".to_string(),
                ));
            }
        }

        Ok(())
    }
}

/// Human-readable `Duration` fields: `"250ms"`, `"30s"`, `"5m"`, `"1h"`.
/// A bare number is seconds.
pub mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    /// Serialize as whole seconds when exact, milliseconds otherwise.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the serializer fails.
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_nanos() == 0 {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        } else {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        }
    }

    /// Deserialize from a string with a unit suffix, or a bare integer.
    ///
    /// # Errors
    ///
    /// Returns a deserialization error if the value is not a duration.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Secs(u64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Secs(secs) => Ok(Duration::from_secs(secs)),
            Raw::Text(text) => parse(&text).map_err(serde::de::Error::custom),
        }
    }

    /// Parse one duration literal.
    ///
    /// # Errors
    ///
    /// Returns a message naming the offending input.
    pub fn parse(text: &str) -> Result<Duration, String> {
        let s = text.trim();
        let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
        let (digits, unit) = s.split_at(split);
        let value: u64 = digits
            .parse()
            .map_err(|_| format!("invalid duration '{text}'"))?;
        match unit.trim() {
            "" | "s" => Ok(Duration::from_secs(value)),
            "ms" => Ok(Duration::from_millis(value)),
            "m" => Ok(Duration::from_secs(value.saturating_mul(60))),
            "h" => Ok(Duration::from_secs(value.saturating_mul(3600))),
            other => Err(format!("unknown duration unit '{other}' in '{text}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use figment::Jail;

    use super::*;

    #[test]
    fn defaults_are_usable() {
        let config = Config::default();
        assert_eq!(config.server.port, 8443);
        assert!(!config.mtls.enabled);
        assert!(matches!(config.payments.provider, ProviderConfig::Sandbox(_)));
        config.validate().unwrap();
    }

    #[test]
    fn yaml_file_is_loaded() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
server:
  port: 9000
  default_deadline: 1500ms
clients:
  - identity: "0x01:2A"
    scopes: [read, public]
  - identity: ff
    scopes: ["*"]
payments:
  provider:
    kind: sandbox
    latency: 5ms
  retry:
    max_attempts: 5
    backoff: 1s
"#
        )
        .unwrap();

        let config = Config::load(Some(file.path())).unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.default_deadline, Duration::from_millis(1500));
        assert_eq!(config.clients.len(), 2);
        assert_eq!(config.clients[0].scopes, vec![Scope::Read, Scope::Public]);
        assert_eq!(config.clients[1].scopes, vec![Scope::Wildcard]);
        assert_eq!(config.payments.retry.max_attempts, 5);
        match &config.payments.provider {
            ProviderConfig::Sandbox(sandbox) => {
                assert_eq!(sandbox.latency, Duration::from_millis(5));
            }
            ProviderConfig::Stripe(_) => panic!("expected sandbox"),
        }
        config.validate().unwrap();
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = Config::load(Some(Path::new("/nonexistent/rpc-gateway.yaml"))).unwrap_err();
        assert!(err.to_string().contains("Config file not found"));
    }

    #[test]
    fn env_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file("gateway.yaml", "server:\n  port: 9000\n")?;
            jail.set_env("RPC_GATEWAY_SERVER__PORT", "9443");
            jail.set_env("RPC_GATEWAY_SERVER__HOST", "0.0.0.0");

            let config = Config::load(Some(Path::new("gateway.yaml")))
                .map_err(|e| e.to_string())?;

            assert_eq!(config.server.port, 9443);
            assert_eq!(config.server.host, "0.0.0.0");
            Ok(())
        });
    }

    #[test]
    fn stripe_provider_is_selected_by_kind() {
        let yaml = r"
provider:
  kind: stripe
  secret_key: sk_test_123
  request_timeout: 5s
";
        let payments: PaymentsConfig = serde_yaml::from_str(yaml).unwrap();
        match payments.provider {
            ProviderConfig::Stripe(stripe) => {
                assert_eq!(stripe.secret_key, "sk_test_123");
                assert_eq!(stripe.base_url, "https://api.stripe.com");
                assert_eq!(stripe.request_timeout, Duration::from_secs(5));
                assert!(!format!("{stripe:?}").contains("sk_test_123"));
            }
            ProviderConfig::Sandbox(_) => panic!("expected stripe"),
        }
    }

    #[test]
    fn unknown_scope_is_rejected() {
        let yaml = "identity: AB\nscopes: [admin]\n";
        assert!(serde_yaml::from_str::<ClientConfig>(yaml).is_err());
    }

    #[test]
    fn validate_rejects_duplicate_clients() {
        let config = Config {
            clients: vec![
                ClientConfig {
                    identity: "0a".to_string(),
                    scopes: vec![Scope::Read],
                },
                ClientConfig {
                    identity: "0x0A".to_string(),
                    scopes: vec![Scope::Write],
                },
            ],
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(Error::DuplicateClient(_))));
    }

    #[test]
    fn validate_requires_tls_material() {
        let mut config = Config::default();
        config.mtls.enabled = true;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("mtls.server_cert"));
    }

    #[test]
    fn validate_requires_stripe_secret() {
        let mut config = Config::default();
        config.payments.provider = ProviderConfig::Stripe(StripeConfig::default());
        assert!(config.validate().is_err());

        config.payments.enabled = false;
        config.validate().unwrap();
    }

    #[test]
    fn duration_literals() {
        assert_eq!(duration_serde::parse("250ms"), Ok(Duration::from_millis(250)));
        assert_eq!(duration_serde::parse("30s"), Ok(Duration::from_secs(30)));
        assert_eq!(duration_serde::parse("2m"), Ok(Duration::from_secs(120)));
        assert_eq!(duration_serde::parse("1h"), Ok(Duration::from_secs(3600)));
        assert_eq!(duration_serde::parse("7"), Ok(Duration::from_secs(7)));
        assert!(duration_serde::parse("soon").is_err());
        assert!(duration_serde::parse("5d").is_err());
    }
}
