/// HTTP surface of the service.
///
/// The routing layer is thin: handlers decode the JSON models, call into
/// the PGP manager or the public-key store, and convert errors to the JSON
/// envelope. All state lives in one [`AppState`] threaded through the
/// router; tests build fresh instances instead of touching globals.
pub mod agent;
pub mod envelope;
pub mod gpg_routes;
pub mod hkp_routes;
pub mod keyring_routes;
pub mod sks_routes;

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::config::Config;
use crate::context::RequestContext;
use crate::manager::PgpManager;
use crate::pks::PublicKeyStore;
use crate::tokens::TokenManager;

/// Shared application state available to all handlers.
pub struct AppState {
    pub pgp: Arc<PgpManager>,
    pub pks: Arc<PublicKeyStore>,
    pub tokens: Arc<dyn TokenManager>,
    pub config: Config,
    /// Transport for the agent proxy, with a bounded idle pool.
    pub proxy_client: reqwest::Client,
}

/// Pulls the request context out of the incoming headers. A caller-supplied
/// `X-Request-ID` is honored for log correlation, and an `X-Request-Timeout`
/// (seconds) becomes the context deadline.
impl<S: Send + Sync> FromRequestParts<S> for RequestContext {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let mut ctx = parts
            .headers
            .get("X-Request-ID")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| Uuid::parse_str(v).ok())
            .map(RequestContext::with_request_id)
            .unwrap_or_default();

        let timeout = parts
            .headers
            .get("X-Request-Timeout")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|secs| *secs > 0);
        if let Some(secs) = timeout {
            ctx = ctx.deadline_in(std::time::Duration::from_secs(secs));
        }
        Ok(ctx)
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// GET /health
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Build the Axum application with all routes and middleware.
pub fn build_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // The agent routes stay outside the CORS layer: preflight OPTIONS
    // requests must reach the proxy and be answered by the downstream,
    // not by the middleware.
    Router::new()
        .route("/health", get(health))
        .merge(gpg_routes::routes())
        .merge(sks_routes::routes())
        .merge(hkp_routes::routes())
        .merge(keyring_routes::routes())
        .layer(cors)
        .merge(agent::routes())
        .with_state(Arc::new(state))
        .layer(TraceLayer::new_for_http())
}

/// Start the HTTP server. The caller is expected to have finished the
/// startup key scan before this point, so no request can observe a
/// half-populated key-ring.
pub async fn serve(state: AppState, addr: &str) -> crate::error::Result<()> {
    let app = build_app(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(crate::error::SignerError::Io)?;

    tracing::info!("Remote signer is now listening at {addr}");

    axum::serve(listener, app)
        .await
        .map_err(crate::error::SignerError::Io)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(request: Request<()>) -> RequestContext {
        let (mut parts, _) = request.into_parts();
        RequestContext::from_request_parts(&mut parts, &())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_context_honors_request_id_and_timeout_headers() {
        let id = Uuid::new_v4();
        let ctx = extract(
            Request::builder()
                .header("X-Request-ID", id.to_string())
                .header("X-Request-Timeout", "30")
                .body(())
                .unwrap(),
        )
        .await;

        assert_eq!(ctx.request_id(), id);
        let remaining = ctx.remaining().expect("deadline should be set");
        assert!(remaining <= std::time::Duration::from_secs(30));
        assert!(remaining > std::time::Duration::from_secs(25));
    }

    #[tokio::test]
    async fn test_context_defaults_without_headers() {
        let ctx = extract(Request::builder().body(()).unwrap()).await;
        assert!(ctx.remaining().is_none());
        assert!(ctx.check().is_ok());
    }

    #[tokio::test]
    async fn test_context_ignores_garbage_headers() {
        let ctx = extract(
            Request::builder()
                .header("X-Request-ID", "not-a-uuid")
                .header("X-Request-Timeout", "soon")
                .body(())
                .unwrap(),
        )
        .await;
        assert!(ctx.remaining().is_none());
        assert!(ctx.check().is_ok());
    }
}
