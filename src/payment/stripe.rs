//! `StripeProvider`: charges and refunds through the Stripe REST API.
//!
//! Requests are form-encoded and authenticated with the secret key as a
//! bearer token. A non-2xx response is turned into `Error::Provider` carrying
//! Stripe's own error message unchanged.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::HeaderValue;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use super::{
    CardType, Charge, ChargeRequest, ChargeStatus, Provider, Refund, RefundReason, RefundRequest,
    RefundStatus, normalize_currency,
};
use crate::config::StripeConfig;
use crate::{Error, Result};

const PROVIDER_ID: &str = "stripe";

/// Stripe-backed payment provider.
pub struct StripeProvider {
    http: reqwest::Client,
    base_url: Url,
    secret_key: String,
    cards: Vec<CardType>,
}

impl StripeProvider {
    /// Build a configured client.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` when the secret key is empty or the base URL
    /// is not an absolute http(s) URL.
    pub fn new(config: &StripeConfig) -> Result<Self> {
        let secret_key = config.secret_key.trim();
        if secret_key.is_empty() {
            return Err(Error::Config(
                "payments.provider.secret_key is required for the stripe provider".to_owned(),
            ));
        }
        if HeaderValue::from_str(&format!("Bearer {secret_key}")).is_err() {
            return Err(Error::Config(
                "payments.provider.secret_key contains characters not allowed in a header"
                    .to_owned(),
            ));
        }

        let mut base_url = Url::parse(&config.base_url).map_err(|e| {
            Error::Config(format!("Invalid stripe base_url '{}': {e}", config.base_url))
        })?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(Error::Config(format!(
                "Stripe base_url must be http(s): {}",
                config.base_url
            )));
        }
        // `Url::join` replaces the last segment unless the path ends in '/'.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            http,
            base_url,
            secret_key: secret_key.to_owned(),
            cards: config.supported_cards.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| Error::Internal(format!("Invalid stripe endpoint '{path}': {e}")))
    }

    async fn post_form<T: DeserializeOwned>(
        &self,
        path: &str,
        form: &[(&str, String)],
        idempotency_key: Option<&str>,
    ) -> Result<T> {
        let url = self.endpoint(path)?;
        let mut request = self
            .http
            .post(url)
            .bearer_auth(&self.secret_key)
            .form(form);
        if let Some(key) = idempotency_key {
            request = request.header("Idempotency-Key", key);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        debug!(path, status = status.as_u16(), "Stripe response");

        if !status.is_success() {
            return Err(Error::provider(PROVIDER_ID, api_error_message(status, &body)));
        }
        Ok(serde_json::from_str(&body)?)
    }
}

impl fmt::Debug for StripeProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StripeProvider")
            .field("base_url", &self.base_url.as_str())
            .field("secret_key", &"<redacted>")
            .field("cards", &self.cards)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Provider for StripeProvider {
    fn provider_id(&self) -> &str {
        PROVIDER_ID
    }

    fn supported_cards(&self) -> &[CardType] {
        &self.cards
    }

    async fn charge(&self, request: &ChargeRequest) -> Result<Charge> {
        let mut form = vec![
            ("amount", request.amount.to_string()),
            ("currency", request.currency.trim().to_ascii_lowercase()),
            ("source", request.source.clone()),
        ];
        if let Some(description) = &request.description {
            form.push(("description", description.clone()));
        }
        let metadata_keys: Vec<String> = request
            .metadata
            .keys()
            .map(|k| format!("metadata[{k}]"))
            .collect();
        for (key, value) in metadata_keys.iter().zip(request.metadata.values()) {
            form.push((key.as_str(), value.clone()));
        }

        let charge: StripeCharge = self
            .post_form("v1/charges", &form, request.idempotency_key.as_deref())
            .await?;
        Ok(charge.into_charge())
    }

    async fn refund(&self, request: &RefundRequest) -> Result<Refund> {
        let mut form = vec![("charge", request.charge_id.clone())];
        // Stripe refunds the full remainder when amount is omitted.
        if request.amount > 0 {
            form.push(("amount", request.amount.to_string()));
        }
        if let Some(reason) = request.reason {
            form.push(("reason", reason.as_str().to_owned()));
        }

        let refund: StripeRefund = self
            .post_form("v1/refunds", &form, request.idempotency_key.as_deref())
            .await?;
        Ok(refund.into_refund(&request.currency, request.reason))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct StripeCharge {
    id: String,
    amount: u64,
    currency: String,
    status: String,
    created: i64,
}

impl StripeCharge {
    fn into_charge(self) -> Charge {
        let status = match self.status.as_str() {
            "succeeded" => ChargeStatus::Succeeded,
            "pending" => ChargeStatus::Pending,
            _ => ChargeStatus::Failed,
        };
        Charge {
            id: self.id,
            provider: PROVIDER_ID.to_owned(),
            amount: self.amount,
            currency: normalize_currency(&self.currency),
            status,
            created_at: timestamp(self.created),
        }
    }
}

#[derive(Debug, Deserialize)]
struct StripeRefund {
    id: String,
    charge: String,
    amount: u64,
    #[serde(default)]
    currency: Option<String>,
    status: String,
    created: i64,
}

impl StripeRefund {
    fn into_refund(self, requested_currency: &str, reason: Option<RefundReason>) -> Refund {
        let status = match self.status.as_str() {
            "succeeded" => RefundStatus::Succeeded,
            "pending" | "requires_action" => RefundStatus::Pending,
            _ => RefundStatus::Failed,
        };
        let currency = self
            .currency
            .as_deref()
            .map_or_else(|| normalize_currency(requested_currency), normalize_currency);
        Refund {
            id: self.id,
            charge_id: self.charge,
            amount: self.amount,
            currency,
            reason,
            status,
            created_at: timestamp(self.created),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: Option<String>,
}

fn timestamp(unix: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(unix, 0).unwrap_or_else(Utc::now)
}

/// Stripe's error message, or the raw body when it is not the usual shape.
fn api_error_message(status: reqwest::StatusCode, body: &str) -> String {
    serde_json::from_str::<ApiErrorBody>(body)
        .ok()
        .and_then(|b| b.error.message)
        .unwrap_or_else(|| format!("HTTP {}: {}", status.as_u16(), body.trim()))
}
