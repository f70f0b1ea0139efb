//! `SandboxProvider`: in-memory payment backend.
//!
//! Behaves like a card processor without talking to one: charges are kept
//! in a ledger so refunds can be checked against what was captured, and
//! configured source tokens are declined. Used for local development and
//! the test suites.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::debug;
use uuid::Uuid;

use super::{
    CardType, Charge, ChargeRequest, ChargeStatus, Provider, Refund, RefundRequest, RefundStatus,
    normalize_currency,
};
use crate::config::SandboxConfig;
use crate::{Error, Result};

const PROVIDER_ID: &str = "sandbox";

#[derive(Debug)]
struct LedgerEntry {
    charge: Charge,
    refunded: u64,
}

/// In-memory payment backend.
#[derive(Debug)]
pub struct SandboxProvider {
    cards: Vec<CardType>,
    declined_sources: HashSet<String>,
    latency: Duration,
    ledger: DashMap<String, LedgerEntry>,
    /// Issued refunds by idempotency key.
    refunds: DashMap<String, Refund>,
}

impl SandboxProvider {
    /// Create a sandbox from configuration.
    #[must_use]
    pub fn new(config: &SandboxConfig) -> Self {
        Self {
            cards: config.supported_cards.clone(),
            declined_sources: config.declined_sources.iter().cloned().collect(),
            latency: config.latency,
            ledger: DashMap::new(),
            refunds: DashMap::new(),
        }
    }

    /// Amount still refundable on `charge_id`.
    #[must_use]
    pub fn refundable(&self, charge_id: &str) -> Option<u64> {
        self.ledger
            .get(charge_id)
            .map(|entry| entry.charge.amount - entry.refunded)
    }

    async fn simulate_latency(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    fn apply_refund(&self, request: &RefundRequest) -> Result<Refund> {
        let charge_id = request.charge_id.as_str();
        let mut entry = self
            .ledger
            .get_mut(charge_id)
            .ok_or_else(|| Error::provider(PROVIDER_ID, format!("No such charge: '{charge_id}'")))?;

        let currency = normalize_currency(&request.currency);
        if currency != entry.charge.currency {
            return Err(Error::provider(
                PROVIDER_ID,
                format!(
                    "Refund currency {currency} does not match charge currency {}",
                    entry.charge.currency
                ),
            ));
        }

        let remaining = entry.charge.amount - entry.refunded;
        // Zero means "whatever is left".
        let amount = if request.amount == 0 {
            remaining
        } else {
            request.amount
        };
        if amount == 0 || amount > remaining {
            return Err(Error::provider(
                PROVIDER_ID,
                format!("Refund amount {amount} exceeds refundable amount {remaining}"),
            ));
        }
        entry.refunded += amount;

        Ok(Refund {
            id: format!("re_{}", Uuid::new_v4().simple()),
            charge_id: charge_id.to_owned(),
            amount,
            currency,
            reason: request.reason,
            status: RefundStatus::Succeeded,
            created_at: Utc::now(),
        })
    }
}

#[async_trait]
impl Provider for SandboxProvider {
    fn provider_id(&self) -> &str {
        PROVIDER_ID
    }

    fn supported_cards(&self) -> &[CardType] {
        &self.cards
    }

    async fn charge(&self, request: &ChargeRequest) -> Result<Charge> {
        self.simulate_latency().await;

        if self.declined_sources.contains(&request.source) {
            return Err(Error::provider(PROVIDER_ID, "Your card was declined."));
        }
        if request.amount == 0 {
            return Err(Error::provider(
                PROVIDER_ID,
                "Amount must be at least one minor unit.",
            ));
        }

        let capture = |id: String| Charge {
            id,
            provider: PROVIDER_ID.to_owned(),
            amount: request.amount,
            currency: normalize_currency(&request.currency),
            status: ChargeStatus::Succeeded,
            created_at: Utc::now(),
        };
        let charge = match request.idempotency_key.as_deref() {
            // Lookup and insert happen under one shard lock, so concurrent
            // replays of a key capture once.
            Some(key) => match self.ledger.entry(idempotent_id(key)) {
                Entry::Occupied(existing) => return Ok(existing.get().charge.clone()),
                Entry::Vacant(slot) => {
                    let charge = capture(slot.key().clone());
                    slot.insert(LedgerEntry {
                        charge: charge.clone(),
                        refunded: 0,
                    });
                    charge
                }
            },
            None => {
                let charge = capture(format!("ch_{}", Uuid::new_v4().simple()));
                self.ledger.insert(
                    charge.id.clone(),
                    LedgerEntry {
                        charge: charge.clone(),
                        refunded: 0,
                    },
                );
                charge
            }
        };
        debug!(charge = %charge.id, amount = charge.amount, "Sandbox charge captured");
        Ok(charge)
    }

    async fn refund(&self, request: &RefundRequest) -> Result<Refund> {
        self.simulate_latency().await;

        let Some(key) = request.idempotency_key.as_deref() else {
            return self.apply_refund(request);
        };
        match self.refunds.entry(key.to_owned()) {
            Entry::Occupied(existing) => {
                let refund = existing.get();
                if refund.charge_id != request.charge_id {
                    return Err(Error::provider(
                        PROVIDER_ID,
                        format!("Idempotency key '{key}' was already used for another refund"),
                    ));
                }
                debug!(refund = %refund.id, "Sandbox refund replayed");
                Ok(refund.clone())
            }
            Entry::Vacant(slot) => {
                let refund = self.apply_refund(request)?;
                slot.insert(refund.clone());
                Ok(refund)
            }
        }
    }
}

fn idempotent_id(key: &str) -> String {
    format!("ch_idem_{key}")
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::payment::RefundReason;

    fn provider() -> SandboxProvider {
        SandboxProvider::new(&SandboxConfig::default())
    }

    fn request(amount: u64, source: &str) -> ChargeRequest {
        ChargeRequest {
            amount,
            currency: "eur".to_owned(),
            source: source.to_owned(),
            description: Some("test".to_owned()),
            idempotency_key: None,
            metadata: BTreeMap::new(),
        }
    }

    fn refund(charge_id: &str, amount: u64, currency: &str) -> RefundRequest {
        RefundRequest {
            charge_id: charge_id.to_owned(),
            amount,
            currency: currency.to_owned(),
            reason: None,
            idempotency_key: None,
        }
    }

    #[tokio::test]
    async fn charge_records_normalised_currency() {
        let charge = provider().charge(&request(500, "tok_visa")).await.unwrap();
        assert!(charge.id.starts_with("ch_"));
        assert_eq!(charge.currency, "EUR");
        assert_eq!(charge.status, ChargeStatus::Succeeded);
    }

    #[tokio::test]
    async fn declined_source_surfaces_backend_message() {
        let err = provider()
            .charge(&request(500, "tok_chargeDeclined"))
            .await
            .unwrap_err();
        assert!(
            matches!(err, Error::Provider { ref provider, ref message }
                if provider == "sandbox" && message == "Your card was declined.")
        );
    }

    #[tokio::test]
    async fn idempotency_key_replays_original_charge() {
        let sandbox = provider();
        let mut req = request(700, "tok_visa");
        req.idempotency_key = Some("order-42".to_owned());

        let first = sandbox.charge(&req).await.unwrap();
        let second = sandbox.charge(&req).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(sandbox.ledger.len(), 1);
    }

    #[tokio::test]
    async fn partial_then_full_refund() {
        let sandbox = provider();
        let charge = sandbox.charge(&request(1000, "tok_visa")).await.unwrap();

        let partial = sandbox
            .refund(&RefundRequest {
                reason: Some(RefundReason::RequestedByCustomer),
                ..refund(&charge.id, 300, "EUR")
            })
            .await
            .unwrap();
        assert_eq!(partial.amount, 300);
        assert_eq!(sandbox.refundable(&charge.id), Some(700));

        // amount 0 refunds the remainder
        let rest = sandbox.refund(&refund(&charge.id, 0, "eur")).await.unwrap();
        assert_eq!(rest.amount, 700);
        assert_eq!(sandbox.refundable(&charge.id), Some(0));
    }

    #[tokio::test]
    async fn over_refund_is_rejected() {
        let sandbox = provider();
        let charge = sandbox.charge(&request(100, "tok_visa")).await.unwrap();

        let err = sandbox
            .refund(&refund(&charge.id, 101, "EUR"))
            .await
            .unwrap_err();

        assert!(err.to_string().contains("exceeds refundable amount 100"));
        assert_eq!(sandbox.refundable(&charge.id), Some(100));
    }

    #[tokio::test]
    async fn refund_unknown_charge_is_rejected() {
        let err = provider()
            .refund(&refund("ch_missing", 1, "EUR"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("No such charge"));
    }

    #[tokio::test]
    async fn refund_currency_must_match() {
        let sandbox = provider();
        let charge = sandbox.charge(&request(100, "tok_visa")).await.unwrap();
        assert!(sandbox.refund(&refund(&charge.id, 50, "USD")).await.is_err());
    }

    #[tokio::test]
    async fn refund_with_same_key_is_issued_once() {
        // GIVEN: a 1000 charge and a refund request carrying a key
        let sandbox = provider();
        let charge = sandbox.charge(&request(1000, "tok_visa")).await.unwrap();
        let req = RefundRequest {
            idempotency_key: Some("refund-7".to_owned()),
            ..refund(&charge.id, 400, "EUR")
        };

        // WHEN: the same request is submitted twice
        let first = sandbox.refund(&req).await.unwrap();
        let second = sandbox.refund(&req).await.unwrap();

        // THEN: the second call replays the first refund
        assert_eq!(first, second);
        assert_eq!(sandbox.refundable(&charge.id), Some(600));
    }

    #[tokio::test]
    async fn refund_key_cannot_be_reused_for_another_charge() {
        let sandbox = provider();
        let a = sandbox.charge(&request(100, "tok_visa")).await.unwrap();
        let b = sandbox.charge(&request(100, "tok_visa")).await.unwrap();
        let keyed = |charge_id: &str| RefundRequest {
            idempotency_key: Some("shared".to_owned()),
            ..refund(charge_id, 50, "EUR")
        };

        sandbox.refund(&keyed(&a.id)).await.unwrap();
        let err = sandbox.refund(&keyed(&b.id)).await.unwrap_err();

        assert!(err.to_string().contains("already used"));
        assert_eq!(sandbox.refundable(&b.id), Some(100));
    }

    #[tokio::test]
    async fn replayed_charge_keeps_refund_progress() {
        // GIVEN: a keyed charge that has been partly refunded
        let sandbox = provider();
        let mut req = request(900, "tok_visa");
        req.idempotency_key = Some("order-9".to_owned());
        let charge = sandbox.charge(&req).await.unwrap();
        sandbox.refund(&refund(&charge.id, 300, "EUR")).await.unwrap();

        // WHEN: the charge is submitted again with the same key
        let replay = sandbox.charge(&req).await.unwrap();

        // THEN: the ledger entry is untouched
        assert_eq!(replay, charge);
        assert_eq!(sandbox.refundable(&charge.id), Some(600));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_charges_with_same_key_capture_once() {
        let sandbox = std::sync::Arc::new(provider());
        let mut req = request(250, "tok_visa");
        req.idempotency_key = Some("race".to_owned());

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let sandbox = std::sync::Arc::clone(&sandbox);
                let req = req.clone();
                tokio::spawn(async move { sandbox.charge(&req).await.unwrap() })
            })
            .collect();
        let mut charges = Vec::new();
        for task in tasks {
            charges.push(task.await.unwrap());
        }

        assert_eq!(sandbox.ledger.len(), 1);
        assert!(charges.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn supported_cards_and_id_are_constant() {
        let sandbox = provider();
        assert_eq!(sandbox.provider_id(), "sandbox");
        assert_eq!(sandbox.supported_cards(), sandbox.supported_cards());
        assert!(!sandbox.supported_cards().is_empty());
    }
}
