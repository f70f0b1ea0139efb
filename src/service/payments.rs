//! `payments.PaymentService`: charges and refunds over the configured
//! payment backend.

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::State;
use axum::routing::post;
use axum::{Extension, Json, Router};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::classifier::ServiceDescriptor;
use crate::Result;
use crate::failsafe::{RetryPolicy, with_retry};
use crate::gateway::Deadline;
use crate::payment::{CardType, Charge, ChargeRequest, PaymentProvider, Refund};

pub use crate::payment::RefundRequest;

/// Read/write declaration for the payment service.
pub static DESCRIPTOR: ServiceDescriptor = ServiceDescriptor::new(
    "payments.PaymentService",
    &["SupportedCards", "ProviderInfo"],
    &["Charge", "Refund"],
);

/// `SupportedCards` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupportedCardsResponse {
    /// Accepted card networks.
    pub cards: Vec<CardType>,
}

/// `ProviderInfo` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderInfoResponse {
    /// Backend identifier.
    pub provider: String,
    /// Accepted card networks.
    pub supported_cards: Vec<CardType>,
}

/// Payment service bound into the gateway.
#[async_trait]
pub trait PaymentService: Send + Sync + 'static {
    /// Charge a payment source.
    async fn charge(&self, request: ChargeRequest, deadline: Deadline) -> Result<Charge>;

    /// Refund (part of) an earlier charge.
    async fn refund(&self, request: RefundRequest, deadline: Deadline) -> Result<Refund>;

    /// Card networks accepted by the backend.
    async fn supported_cards(&self) -> Result<SupportedCardsResponse>;

    /// Which backend is active.
    async fn provider_info(&self) -> Result<ProviderInfoResponse>;
}

/// [`PaymentService`] backed by the process's [`PaymentProvider`].
#[derive(Debug)]
pub struct ProviderPaymentService {
    provider: Arc<PaymentProvider>,
    retry: RetryPolicy,
}

impl ProviderPaymentService {
    /// Serve payments through `provider`, retrying transport failures per `retry`.
    #[must_use]
    pub fn new(provider: Arc<PaymentProvider>, retry: RetryPolicy) -> Self {
        Self { provider, retry }
    }
}

#[async_trait]
impl PaymentService for ProviderPaymentService {
    async fn charge(&self, request: ChargeRequest, deadline: Deadline) -> Result<Charge> {
        let mut request = request;
        // A retried charge must not be captured twice.
        if request.idempotency_key.is_none() {
            request.idempotency_key = Some(Uuid::new_v4().to_string());
        }

        let charge = with_retry(&self.retry, "payments.charge", || {
            self.provider.charge(&request, deadline)
        })
        .await?;

        info!(
            provider = %charge.provider,
            charge = %charge.id,
            amount = charge.amount,
            currency = %charge.currency,
            "Charge created"
        );
        Ok(charge)
    }

    async fn refund(&self, request: RefundRequest, deadline: Deadline) -> Result<Refund> {
        let mut request = request;
        // Every attempt carries the same key, so a retry after a lost
        // response replays the refund instead of issuing a second one.
        if request.idempotency_key.is_none() {
            request.idempotency_key = Some(Uuid::new_v4().to_string());
        }

        let refund = with_retry(&self.retry, "payments.refund", || {
            self.provider.refund(&request, deadline)
        })
        .await?;

        info!(
            charge = %refund.charge_id,
            refund = %refund.id,
            amount = refund.amount,
            "Refund issued"
        );
        Ok(refund)
    }

    async fn supported_cards(&self) -> Result<SupportedCardsResponse> {
        Ok(SupportedCardsResponse {
            cards: self.provider.supported_cards().to_vec(),
        })
    }

    async fn provider_info(&self) -> Result<ProviderInfoResponse> {
        Ok(ProviderInfoResponse {
            provider: self.provider.provider_id().to_string(),
            supported_cards: self.provider.supported_cards().to_vec(),
        })
    }
}

/// Attach the payment service's routes to `router`.
pub fn register_on_transport(router: Router, service: Arc<dyn PaymentService>) -> Router {
    let routes = Router::new()
        .route(&DESCRIPTOR.path("Charge"), post(charge))
        .route(&DESCRIPTOR.path("Refund"), post(refund))
        .route(&DESCRIPTOR.path("SupportedCards"), post(supported_cards))
        .route(&DESCRIPTOR.path("ProviderInfo"), post(provider_info))
        .with_state(service);
    router.merge(routes)
}

async fn charge(
    State(service): State<Arc<dyn PaymentService>>,
    Extension(deadline): Extension<Deadline>,
    Json(request): Json<ChargeRequest>,
) -> Result<Json<Charge>> {
    service.charge(request, deadline).await.map(Json)
}

async fn refund(
    State(service): State<Arc<dyn PaymentService>>,
    Extension(deadline): Extension<Deadline>,
    Json(request): Json<RefundRequest>,
) -> Result<Json<Refund>> {
    service.refund(request, deadline).await.map(Json)
}

async fn supported_cards(
    State(service): State<Arc<dyn PaymentService>>,
) -> Result<Json<SupportedCardsResponse>> {
    service.supported_cards().await.map(Json)
}

async fn provider_info(
    State(service): State<Arc<dyn PaymentService>>,
) -> Result<Json<ProviderInfoResponse>> {
    service.provider_info().await.map(Json)
}
