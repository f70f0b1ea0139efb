//! Authorization enforcement for every inbound call.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{debug, warn};

use super::authorizer::{Authorizer, Decision};
use super::deadline::Deadline;
use crate::Error;
use crate::client::ClientRegistry;
use crate::mtls::{ConnectionPeer, attach_identity, extract_identity, resolve_identity};

/// Shared state of [`authorize_middleware`].
#[derive(Debug)]
pub struct AuthState {
    /// Known clients.
    pub clients: Arc<ClientRegistry>,
    /// Decision engine.
    pub authorizer: Arc<Authorizer>,
    /// Deadline for requests without `grpc-timeout`.
    pub default_deadline: Duration,
}

/// Resolve the caller, decide, and either reject with `PERMISSION_DENIED`
/// or pass the request on with a [`Deadline`] attached.
pub async fn authorize_middleware(
    State(state): State<Arc<AuthState>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let serial = request
        .extensions()
        .get::<ConnectionPeer>()
        .and_then(|peer| peer.serial.clone());

    if let Some(serial) = serial {
        if !attach_identity(request.extensions_mut(), &state.clients, &serial) {
            debug!(
                identity = %extract_identity(&serial),
                "Certificate serial not registered, caller is anonymous"
            );
        }
    }

    let path = request.uri().path().to_owned();
    let decision = state
        .authorizer
        .authorize(&path, resolve_identity(request.extensions()));

    if let Decision::Deny(reason) = decision {
        let identity = resolve_identity(request.extensions())
            .map_or_else(|| "anonymous".to_owned(), |c| c.identity.to_string());
        warn!(client = %identity, method = %path, %reason, "Request denied");
        return Error::PermissionDenied(format!("{path}: {reason}")).into_response();
    }

    let deadline = Deadline::from_headers(request.headers(), state.default_deadline);
    request.extensions_mut().insert(deadline);
    next.run(request).await
}
