//! Gateway server: one transport endpoint in front of every bound service.
//!
//! ```text
//! TLS accept (PeerCertAcceptor)  → ConnectionPeer { serial }
//!   → authorize_middleware       → serial → Client → Authorizer → 403 | Deadline
//!   → service routes             → POST /<package>.<Service>/<Method>
//! ```

mod authorizer;
mod deadline;
mod middleware;

pub use authorizer::{Authorizer, Decision, DenyReason};
pub use deadline::{Deadline, GRPC_TIMEOUT, parse_grpc_timeout};
pub use middleware::{AuthState, authorize_middleware};

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::http::Uri;
use axum::middleware::from_fn_with_state;
use axum_server::Handle;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::client::ClientRegistry;
use crate::config::{Config, ServerConfig};
use crate::failsafe::RetryPolicy;
use crate::mtls::{MtlsConfig, PeerCertAcceptor, build_tls_config};
use crate::payment::PaymentProvider;
use crate::service::payments::ProviderPaymentService;
use crate::service::{MethodName, ServiceKind, ServiceRegistry};
use crate::{Error, Result};

/// How long in-flight requests get to finish after a shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// The assembled gateway: clients, bound services and the authorizer built
/// over them.
#[derive(Debug)]
pub struct Gateway {
    clients: Arc<ClientRegistry>,
    services: Arc<ServiceRegistry>,
    authorizer: Arc<Authorizer>,
    default_deadline: Duration,
}

impl Gateway {
    /// Assemble from already-populated registries.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if a bound service's method declaration is
    /// inconsistent.
    pub fn new(
        clients: ClientRegistry,
        services: ServiceRegistry,
        default_deadline: Duration,
    ) -> Result<Self> {
        let authorizer = Authorizer::new(services.descriptors())?;
        info!(
            clients = clients.len(),
            services = ?services.bound_kinds(),
            "Gateway assembled"
        );
        Ok(Self {
            clients: Arc::new(clients),
            services: Arc::new(services),
            authorizer: Arc::new(authorizer),
            default_deadline,
        })
    }

    /// Build clients and the services the configuration can provide.
    ///
    /// Only the payment service is backed by configuration; order and
    /// product implementations are bound by embedders through
    /// [`Gateway::new`].
    ///
    /// # Errors
    ///
    /// Returns the first startup defect: malformed or duplicate clients,
    /// missing payment credentials, or a double registration.
    pub fn from_config(config: &Config) -> Result<Self> {
        let clients = ClientRegistry::from_config(&config.clients)?;
        let mut services = ServiceRegistry::new();

        if config.payments.enabled {
            let provider = PaymentProvider::from_config(&config.payments.provider)?;
            let retry = RetryPolicy::new(&config.payments.retry);
            services.register_payments(Arc::new(ProviderPaymentService::new(
                Arc::new(provider),
                retry,
            )))?;
        }

        Self::new(clients, services, config.server.default_deadline)
    }

    /// The decision engine.
    #[must_use]
    pub fn authorizer(&self) -> &Authorizer {
        &self.authorizer
    }

    /// The client table.
    #[must_use]
    pub fn clients(&self) -> &ClientRegistry {
        &self.clients
    }

    /// The bound services.
    #[must_use]
    pub fn services(&self) -> &ServiceRegistry {
        &self.services
    }

    /// HTTP router with every bound service behind the authorizer.
    pub fn router(&self) -> Router {
        let state = Arc::new(AuthState {
            clients: Arc::clone(&self.clients),
            authorizer: Arc::clone(&self.authorizer),
            default_deadline: self.default_deadline,
        });
        let bound = self.services.bound_kinds();

        self.services
            .register_on_transport(Router::new())
            .fallback(move |uri: Uri| {
                let bound = bound.clone();
                async move { unrouted(&uri, &bound) }
            })
            .layer(from_fn_with_state(state, authorize_middleware))
            .layer(TraceLayer::new_for_http())
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// Listen until SIGINT/SIGTERM.
    ///
    /// With mTLS enabled, connections are TLS-terminated and tagged with the
    /// peer serial; otherwise the listener is plain TCP and every caller is
    /// anonymous.
    ///
    /// # Errors
    ///
    /// Returns an error if TLS material cannot be loaded or the address
    /// cannot be bound.
    pub async fn serve(&self, server: &ServerConfig, mtls: &MtlsConfig) -> Result<()> {
        let addr: SocketAddr = format!("{}:{}", server.host, server.port)
            .parse()
            .map_err(|e| Error::Config(format!("Invalid listen address: {e}")))?;
        let app = self.router();

        if mtls.enabled {
            let tls = build_tls_config(mtls)?;
            let handle: Handle<SocketAddr> = Handle::new();
            let shutdown = handle.clone();
            tokio::spawn(async move {
                shutdown_signal().await;
                shutdown.graceful_shutdown(Some(SHUTDOWN_GRACE));
            });

            info!(%addr, require_client_cert = mtls.require_client_cert, "Listening (mTLS)");
            axum_server::bind(addr)
                .acceptor(PeerCertAcceptor::new(tls))
                .handle(handle)
                .serve(app.into_make_service())
                .await?;
        } else {
            let listener = TcpListener::bind(addr).await?;
            info!(%addr, "Listening (plain TCP, all callers anonymous)");
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await?;
        }

        info!("Gateway stopped");
        Ok(())
    }
}

/// Response for an authorized request that matched no route.
fn unrouted(uri: &Uri, bound: &[ServiceKind]) -> Error {
    let path = uri.path();
    let unbound = MethodName::parse(path).and_then(|name| {
        ServiceKind::ALL
            .into_iter()
            .find(|kind| kind.descriptor().service == name.service && !bound.contains(kind))
    });
    match unbound {
        Some(kind) => Error::ServiceUnbound(kind),
        None => Error::NotFound(format!("Unknown method {path}")),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}
