//! Payment provider abstraction.
//!
//! A payment backend implements [`Provider`]: charge, refund, the card
//! networks it accepts, and a stable identifier. The gateway runs exactly
//! one backend per process, held as a [`PaymentProvider`], an enum with one
//! variant per backend kind, each carrying its own configuration.
//!
//! ```text
//! ProviderConfig (tagged by `kind`)
//!     │ from_config   (Unconfigured → Configured)
//!     ▼
//! PaymentProvider ──┬── Stripe(StripeProvider)
//!                   └── Sandbox(SandboxProvider)
//! ```
//!
//! # Errors and deadlines
//!
//! Backend errors are surfaced verbatim as `Error::Provider`. The provider
//! never retries; callers that need resilience wrap calls in
//! [`crate::failsafe::with_retry`]. Every call through [`PaymentProvider`]
//! carries the inbound request's [`Deadline`] and is abandoned when it
//! expires.

mod sandbox;
mod stripe;

pub use sandbox::SandboxProvider;
pub use stripe::StripeProvider;

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::timeout_at;
use tracing::debug;

use crate::config::ProviderConfig;
use crate::gateway::Deadline;
use crate::{Error, Result};

// ─────────────────────────────────────────────────────────────────────────────
// Domain types
// ─────────────────────────────────────────────────────────────────────────────

/// Card network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardType {
    /// Visa
    Visa,
    /// Mastercard
    Mastercard,
    /// American Express
    Amex,
    /// Discover
    Discover,
    /// JCB
    Jcb,
    /// Diners Club
    DinersClub,
    /// UnionPay
    UnionPay,
}

/// Charge request. Amounts are integers in the currency's minor unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargeRequest {
    /// Amount in minor units (cents for USD).
    pub amount: u64,
    /// ISO-4217 currency code.
    pub currency: String,
    /// Tokenised payment source.
    pub source: String,
    /// Free-form description shown on statements.
    #[serde(default)]
    pub description: Option<String>,
    /// Key that makes repeated submissions of the same charge safe.
    #[serde(default)]
    pub idempotency_key: Option<String>,
    /// Opaque caller metadata.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// Outcome of a charge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChargeStatus {
    /// Funds captured.
    Succeeded,
    /// Awaiting asynchronous confirmation.
    Pending,
    /// Rejected by the backend.
    Failed,
}

/// A charge record returned by a backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Charge {
    /// Backend charge identifier.
    pub id: String,
    /// Identifier of the provider that created it.
    pub provider: String,
    /// Amount in minor units.
    pub amount: u64,
    /// ISO-4217 currency code.
    pub currency: String,
    /// Outcome.
    pub status: ChargeStatus,
    /// Creation time reported by the backend.
    pub created_at: DateTime<Utc>,
}

/// Why a refund was issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefundReason {
    /// Charged twice.
    Duplicate,
    /// Charge was fraudulent.
    Fraudulent,
    /// Customer asked for it.
    RequestedByCustomer,
}

impl RefundReason {
    /// Wire tag.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Duplicate => "duplicate",
            Self::Fraudulent => "fraudulent",
            Self::RequestedByCustomer => "requested_by_customer",
        }
    }
}

/// Refund request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundRequest {
    /// Charge to refund.
    pub charge_id: String,
    /// Minor units to refund; 0 refunds whatever is left.
    #[serde(default)]
    pub amount: u64,
    /// ISO-4217 currency of the original charge.
    pub currency: String,
    /// Stated reason.
    #[serde(default)]
    pub reason: Option<RefundReason>,
    /// Key that makes repeated submissions of the same refund safe.
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

/// Outcome of a refund.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefundStatus {
    /// Refund settled.
    Succeeded,
    /// Refund in flight.
    Pending,
    /// Refund rejected.
    Failed,
}

/// A refund record returned by a backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Refund {
    /// Backend refund identifier.
    pub id: String,
    /// Charge the refund applies to.
    pub charge_id: String,
    /// Amount refunded in minor units.
    pub amount: u64,
    /// ISO-4217 currency code.
    pub currency: String,
    /// Stated reason.
    pub reason: Option<RefundReason>,
    /// Outcome.
    pub status: RefundStatus,
    /// Creation time reported by the backend.
    pub created_at: DateTime<Utc>,
}

/// Canonical currency code: trimmed, uppercase.
#[must_use]
pub fn normalize_currency(currency: &str) -> String {
    currency.trim().to_ascii_uppercase()
}

// ─────────────────────────────────────────────────────────────────────────────
// Provider trait
// ─────────────────────────────────────────────────────────────────────────────

/// Capability interface every payment backend implements.
///
/// `provider_id` and `supported_cards` are constant for the lifetime of an
/// instance. `charge` and `refund` report backend failures unchanged.
#[async_trait]
pub trait Provider: Send + Sync + 'static {
    /// Stable identifier (`stripe`, `sandbox`).
    fn provider_id(&self) -> &str;

    /// Card networks this backend accepts.
    fn supported_cards(&self) -> &[CardType];

    /// Create a charge.
    ///
    /// # Errors
    ///
    /// Returns `Error::Provider` with the backend's message when the charge
    /// is rejected, or a transport error when the backend is unreachable.
    async fn charge(&self, request: &ChargeRequest) -> Result<Charge>;

    /// Refund (part of) a charge.
    ///
    /// # Errors
    ///
    /// Same contract as [`Provider::charge`]. A request carrying an
    /// idempotency key the backend has already seen returns the original
    /// refund instead of issuing another.
    async fn refund(&self, request: &RefundRequest) -> Result<Refund>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Active provider
// ─────────────────────────────────────────────────────────────────────────────

/// The single configured payment backend.
pub enum PaymentProvider {
    /// Stripe REST API.
    Stripe(StripeProvider),
    /// In-memory backend for development and tests.
    Sandbox(SandboxProvider),
}

impl PaymentProvider {
    /// Configure the backend named by `config`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` when credentials are missing or malformed.
    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        let provider = match config {
            ProviderConfig::Stripe(cfg) => Self::Stripe(StripeProvider::new(cfg)?),
            ProviderConfig::Sandbox(cfg) => Self::Sandbox(SandboxProvider::new(cfg)),
        };
        debug!(
            provider = provider.provider_id(),
            cards = ?provider.supported_cards(),
            "Payment provider configured"
        );
        Ok(provider)
    }

    /// The active backend as a trait object.
    #[must_use]
    pub fn as_provider(&self) -> &dyn Provider {
        match self {
            Self::Stripe(p) => p as &dyn Provider,
            Self::Sandbox(p) => p,
        }
    }

    /// Backend identifier.
    #[must_use]
    pub fn provider_id(&self) -> &str {
        self.as_provider().provider_id()
    }

    /// Card networks accepted by the backend.
    #[must_use]
    pub fn supported_cards(&self) -> &[CardType] {
        self.as_provider().supported_cards()
    }

    /// Charge, abandoning the backend call when `deadline` passes.
    ///
    /// # Errors
    ///
    /// `Error::DeadlineExceeded` on expiry, otherwise the backend's error.
    pub async fn charge(&self, request: &ChargeRequest, deadline: Deadline) -> Result<Charge> {
        timeout_at(deadline.instant(), self.as_provider().charge(request))
            .await
            .map_err(|_| self.deadline_error("charge"))?
    }

    /// Refund, abandoning the backend call when `deadline` passes.
    ///
    /// # Errors
    ///
    /// `Error::DeadlineExceeded` on expiry, otherwise the backend's error.
    pub async fn refund(&self, request: &RefundRequest, deadline: Deadline) -> Result<Refund> {
        timeout_at(deadline.instant(), self.as_provider().refund(request))
            .await
            .map_err(|_| self.deadline_error("refund"))?
    }

    fn deadline_error(&self, operation: &str) -> Error {
        Error::DeadlineExceeded(format!("{} {operation}", self.provider_id()))
    }
}

impl fmt::Debug for PaymentProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaymentProvider")
            .field("provider", &self.provider_id())
            .field("supported_cards", &self.supported_cards())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::SandboxConfig;

    fn sandbox() -> PaymentProvider {
        PaymentProvider::from_config(&ProviderConfig::Sandbox(SandboxConfig::default())).unwrap()
    }

    fn request(amount: u64) -> ChargeRequest {
        ChargeRequest {
            amount,
            currency: "usd".to_owned(),
            source: "tok_visa".to_owned(),
            description: None,
            idempotency_key: None,
            metadata: BTreeMap::new(),
        }
    }

    #[test]
    fn from_config_selects_variant() {
        let provider = sandbox();
        assert!(matches!(provider, PaymentProvider::Sandbox(_)));
        assert_eq!(provider.provider_id(), "sandbox");
    }

    #[test]
    fn normalize_currency_upper_cases() {
        assert_eq!(normalize_currency(" eur "), "EUR");
    }

    #[tokio::test]
    async fn charge_within_deadline_succeeds() {
        let provider = sandbox();
        let charge = provider
            .charge(&request(1250), Deadline::after(Duration::from_secs(5)))
            .await
            .unwrap();
        assert_eq!(charge.amount, 1250);
        assert_eq!(charge.currency, "USD");
    }

    #[tokio::test(start_paused = true)]
    async fn expired_deadline_aborts_call() {
        // GIVEN: a sandbox that takes 10s to answer
        let provider = PaymentProvider::from_config(&ProviderConfig::Sandbox(SandboxConfig {
            latency: Duration::from_secs(10),
            ..SandboxConfig::default()
        }))
        .unwrap();
        // WHEN: the caller only allows 1s
        let result = provider
            .charge(&request(100), Deadline::after(Duration::from_secs(1)))
            .await;
        // THEN: the call is abandoned with a deadline error
        assert!(matches!(result, Err(Error::DeadlineExceeded(msg)) if msg == "sandbox charge"));
    }

    #[test]
    fn refund_reason_tags_match_serde() {
        for reason in [
            RefundReason::Duplicate,
            RefundReason::Fraudulent,
            RefundReason::RequestedByCustomer,
        ] {
            let json = serde_json::to_value(reason).unwrap();
            assert_eq!(json, reason.as_str());
        }
    }
}
