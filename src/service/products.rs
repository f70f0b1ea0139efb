//! `products.ProductService`: RPC surface of the product catalogue.

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use super::classifier::ServiceDescriptor;
use crate::Result;

/// Read/write declaration for the product service.
pub static DESCRIPTOR: ServiceDescriptor = ServiceDescriptor::new(
    "products.ProductService",
    &["Get", "List", "Search"],
    &["New", "Update", "Delete"],
);

/// A catalogue entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    /// Product identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Unit price in minor currency units.
    pub price: u64,
    /// ISO-4217 currency code.
    pub currency: String,
}

/// `New` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProductRequest {
    /// Display name.
    pub name: String,
    /// Unit price in minor currency units.
    pub price: u64,
    /// ISO-4217 currency code.
    pub currency: String,
}

/// `Update` request; absent fields stay unchanged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateProductRequest {
    /// Product identifier.
    pub id: String,
    /// New display name.
    #[serde(default)]
    pub name: Option<String>,
    /// New unit price.
    #[serde(default)]
    pub price: Option<u64>,
}

/// `Get` and `Delete` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductIdRequest {
    /// Product identifier.
    pub id: String,
}

/// `List` and `Search` request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProductQuery {
    /// Free-text query (`Search` only).
    pub query: Option<String>,
    /// Maximum products to return.
    pub limit: u32,
}

/// `List` and `Search` response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductList {
    /// Matching products.
    pub products: Vec<Product>,
}

/// `Delete` response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeleteProductResponse {
    /// Whether a product was removed.
    pub deleted: bool,
}

/// Product service implementation bound into the gateway.
#[async_trait]
pub trait ProductService: Send + Sync + 'static {
    /// Fetch one product.
    async fn get(&self, request: ProductIdRequest) -> Result<Product>;

    /// List products.
    async fn list(&self, request: ProductQuery) -> Result<ProductList>;

    /// Full-text search.
    async fn search(&self, request: ProductQuery) -> Result<ProductList>;

    /// Create a product.
    async fn new_product(&self, request: NewProductRequest) -> Result<Product>;

    /// Update a product.
    async fn update(&self, request: UpdateProductRequest) -> Result<Product>;

    /// Delete a product.
    async fn delete(&self, request: ProductIdRequest) -> Result<DeleteProductResponse>;
}

/// Attach the product service's routes to `router`.
pub fn register_on_transport(router: Router, service: Arc<dyn ProductService>) -> Router {
    let routes = Router::new()
        .route(&DESCRIPTOR.path("Get"), post(get))
        .route(&DESCRIPTOR.path("List"), post(list))
        .route(&DESCRIPTOR.path("Search"), post(search))
        .route(&DESCRIPTOR.path("New"), post(new_product))
        .route(&DESCRIPTOR.path("Update"), post(update))
        .route(&DESCRIPTOR.path("Delete"), post(delete))
        .with_state(service);
    router.merge(routes)
}

async fn get(
    State(service): State<Arc<dyn ProductService>>,
    Json(request): Json<ProductIdRequest>,
) -> Result<Json<Product>> {
    service.get(request).await.map(Json)
}

async fn list(
    State(service): State<Arc<dyn ProductService>>,
    Json(request): Json<ProductQuery>,
) -> Result<Json<ProductList>> {
    service.list(request).await.map(Json)
}

async fn search(
    State(service): State<Arc<dyn ProductService>>,
    Json(request): Json<ProductQuery>,
) -> Result<Json<ProductList>> {
    service.search(request).await.map(Json)
}

async fn new_product(
    State(service): State<Arc<dyn ProductService>>,
    Json(request): Json<NewProductRequest>,
) -> Result<Json<Product>> {
    service.new_product(request).await.map(Json)
}

async fn update(
    State(service): State<Arc<dyn ProductService>>,
    Json(request): Json<UpdateProductRequest>,
) -> Result<Json<Product>> {
    service.update(request).await.map(Json)
}

async fn delete(
    State(service): State<Arc<dyn ProductService>>,
    Json(request): Json<ProductIdRequest>,
) -> Result<Json<DeleteProductResponse>> {
    service.delete(request).await.map(Json)
}
