//! Business services fronted by the gateway.
//!
//! Each service kind has one slot in the [`ServiceRegistry`]. A slot is
//! bound exactly once during startup; binding it again is a startup defect
//! and reported as `Error::ServiceAlreadyRegistered`. Using a slot that was
//! never bound is reported as `Error::ServiceUnbound`.
//!
//! Every service module also carries a static [`ServiceDescriptor`] naming
//! its read and write methods, which is what the authorizer classifies
//! against.

pub mod classifier;
pub mod orders;
pub mod payments;
pub mod products;

use std::fmt;
use std::sync::Arc;

use axum::Router;
use tracing::info;

pub use classifier::{MethodClass, MethodName, MethodPattern, ServiceDescriptor};
pub use orders::OrderService;
pub use payments::PaymentService;
pub use products::ProductService;

use crate::{Error, Result};

/// The services the gateway knows how to front.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ServiceKind {
    /// `orders.OrderService`
    Orders,
    /// `payments.PaymentService`
    Payments,
    /// `products.ProductService`
    Products,
}

impl ServiceKind {
    /// Every kind, in registration order.
    pub const ALL: [Self; 3] = [Self::Orders, Self::Payments, Self::Products];

    /// Static read/write declaration of this service.
    #[must_use]
    pub fn descriptor(self) -> &'static ServiceDescriptor {
        match self {
            Self::Orders => &orders::DESCRIPTOR,
            Self::Payments => &payments::DESCRIPTOR,
            Self::Products => &products::DESCRIPTOR,
        }
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.descriptor().service)
    }
}

/// Holds at most one implementation of a service.
pub struct ServiceSlot<S: ?Sized> {
    kind: ServiceKind,
    service: Option<Arc<S>>,
}

impl<S: ?Sized> ServiceSlot<S> {
    /// An unbound slot.
    #[must_use]
    pub fn new(kind: ServiceKind) -> Self {
        Self {
            kind,
            service: None,
        }
    }

    /// Bind the implementation.
    ///
    /// # Errors
    ///
    /// Returns `Error::ServiceAlreadyRegistered` if the slot is already bound;
    /// the existing binding is kept.
    pub fn bind(&mut self, service: Arc<S>) -> Result<()> {
        if self.service.is_some() {
            return Err(Error::ServiceAlreadyRegistered(self.kind));
        }
        self.service = Some(service);
        Ok(())
    }

    /// The bound implementation.
    ///
    /// # Errors
    ///
    /// Returns `Error::ServiceUnbound` if nothing was bound.
    pub fn get(&self) -> Result<&Arc<S>> {
        self.service
            .as_ref()
            .ok_or(Error::ServiceUnbound(self.kind))
    }

    /// Whether an implementation is bound.
    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.service.is_some()
    }
}

impl<S: ?Sized> fmt::Debug for ServiceSlot<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceSlot")
            .field("kind", &self.kind)
            .field("bound", &self.is_bound())
            .finish()
    }
}

/// One slot per service kind.
#[derive(Debug)]
pub struct ServiceRegistry {
    orders: ServiceSlot<dyn OrderService>,
    payments: ServiceSlot<dyn PaymentService>,
    products: ServiceSlot<dyn ProductService>,
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceRegistry {
    /// All slots unbound.
    #[must_use]
    pub fn new() -> Self {
        Self {
            orders: ServiceSlot::new(ServiceKind::Orders),
            payments: ServiceSlot::new(ServiceKind::Payments),
            products: ServiceSlot::new(ServiceKind::Products),
        }
    }

    /// Bind the order service.
    ///
    /// # Errors
    ///
    /// `Error::ServiceAlreadyRegistered` on a second call.
    pub fn register_orders(&mut self, service: Arc<dyn OrderService>) -> Result<()> {
        self.orders.bind(service)
    }

    /// Bind the payment service.
    ///
    /// # Errors
    ///
    /// `Error::ServiceAlreadyRegistered` on a second call.
    pub fn register_payments(&mut self, service: Arc<dyn PaymentService>) -> Result<()> {
        self.payments.bind(service)
    }

    /// Bind the product service.
    ///
    /// # Errors
    ///
    /// `Error::ServiceAlreadyRegistered` on a second call.
    pub fn register_products(&mut self, service: Arc<dyn ProductService>) -> Result<()> {
        self.products.bind(service)
    }

    /// The bound order service.
    ///
    /// # Errors
    ///
    /// `Error::ServiceUnbound` if none was registered.
    pub fn orders(&self) -> Result<&Arc<dyn OrderService>> {
        self.orders.get()
    }

    /// The bound payment service.
    ///
    /// # Errors
    ///
    /// `Error::ServiceUnbound` if none was registered.
    pub fn payments(&self) -> Result<&Arc<dyn PaymentService>> {
        self.payments.get()
    }

    /// The bound product service.
    ///
    /// # Errors
    ///
    /// `Error::ServiceUnbound` if none was registered.
    pub fn products(&self) -> Result<&Arc<dyn ProductService>> {
        self.products.get()
    }

    /// Kinds that have an implementation bound.
    #[must_use]
    pub fn bound_kinds(&self) -> Vec<ServiceKind> {
        let bound = [
            self.orders.is_bound(),
            self.payments.is_bound(),
            self.products.is_bound(),
        ];
        ServiceKind::ALL
            .into_iter()
            .zip(bound)
            .filter_map(|(kind, bound)| bound.then_some(kind))
            .collect()
    }

    /// Descriptors of the bound services.
    #[must_use]
    pub fn descriptors(&self) -> Vec<&'static ServiceDescriptor> {
        self.bound_kinds()
            .into_iter()
            .map(ServiceKind::descriptor)
            .collect()
    }

    /// Mount the routes of every bound service on `router`.
    ///
    /// Call once: mounting the same service twice makes axum panic on the
    /// overlapping routes.
    pub fn register_on_transport(&self, router: Router) -> Router {
        let mut router = router;
        if let Ok(service) = self.orders() {
            router = orders::register_on_transport(router, Arc::clone(service));
        }
        if let Ok(service) = self.payments() {
            router = payments::register_on_transport(router, Arc::clone(service));
        }
        if let Ok(service) = self.products() {
            router = products::register_on_transport(router, Arc::clone(service));
        }
        info!(services = ?self.bound_kinds(), "Service routes mounted");
        router
    }
}
