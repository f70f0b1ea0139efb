//! `orders.OrderService`: RPC surface of the order service.
//!
//! Order semantics live in whatever implementation gets bound to the slot;
//! this module only fixes the method set, its read/write split and the
//! transport routes.

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::classifier::ServiceDescriptor;
use crate::Result;

/// Read/write declaration for the order service.
pub static DESCRIPTOR: ServiceDescriptor =
    ServiceDescriptor::new("orders.OrderService", &["Get", "List"], &["New", "Cancel"]);

/// Order lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Created, not yet paid.
    Pending,
    /// Payment captured.
    Paid,
    /// Cancelled before fulfilment.
    Cancelled,
}

/// One line of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    /// Product identifier.
    pub product_id: String,
    /// Units ordered.
    pub quantity: u32,
}

/// An order as returned by the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Order identifier.
    pub id: String,
    /// Ordered lines.
    pub lines: Vec<OrderLine>,
    /// Total in minor currency units.
    pub amount: u64,
    /// ISO-4217 currency code.
    pub currency: String,
    /// Current state.
    pub status: OrderStatus,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// `New` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrderRequest {
    /// Lines to order.
    pub lines: Vec<OrderLine>,
    /// ISO-4217 currency code.
    pub currency: String,
}

/// `Get` and `Cancel` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderIdRequest {
    /// Order identifier.
    pub id: String,
}

/// `List` request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ListOrdersRequest {
    /// Maximum orders to return (0 = implementation default).
    pub limit: u32,
    /// Opaque continuation token from a previous page.
    pub page_token: Option<String>,
}

/// `List` response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListOrdersResponse {
    /// Orders in this page.
    pub orders: Vec<Order>,
    /// Token for the next page, if any.
    pub next_page_token: Option<String>,
}

/// Order service implementation bound into the gateway.
#[async_trait]
pub trait OrderService: Send + Sync + 'static {
    /// Create an order.
    async fn new_order(&self, request: NewOrderRequest) -> Result<Order>;

    /// Fetch one order.
    async fn get(&self, request: OrderIdRequest) -> Result<Order>;

    /// List orders.
    async fn list(&self, request: ListOrdersRequest) -> Result<ListOrdersResponse>;

    /// Cancel an order.
    async fn cancel(&self, request: OrderIdRequest) -> Result<Order>;
}

/// Attach the order service's routes to `router`.
pub fn register_on_transport(router: Router, service: Arc<dyn OrderService>) -> Router {
    let routes = Router::new()
        .route(&DESCRIPTOR.path("New"), post(new_order))
        .route(&DESCRIPTOR.path("Get"), post(get))
        .route(&DESCRIPTOR.path("List"), post(list))
        .route(&DESCRIPTOR.path("Cancel"), post(cancel))
        .with_state(service);
    router.merge(routes)
}

async fn new_order(
    State(service): State<Arc<dyn OrderService>>,
    Json(request): Json<NewOrderRequest>,
) -> Result<Json<Order>> {
    service.new_order(request).await.map(Json)
}

async fn get(
    State(service): State<Arc<dyn OrderService>>,
    Json(request): Json<OrderIdRequest>,
) -> Result<Json<Order>> {
    service.get(request).await.map(Json)
}

async fn list(
    State(service): State<Arc<dyn OrderService>>,
    Json(request): Json<ListOrdersRequest>,
) -> Result<Json<ListOrdersResponse>> {
    service.list(request).await.map(Json)
}

async fn cancel(
    State(service): State<Arc<dyn OrderService>>,
    Json(request): Json<OrderIdRequest>,
) -> Result<Json<Order>> {
    service.cancel(request).await.map(Json)
}
