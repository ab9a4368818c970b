/// HKP keyserver subset: `/pks/lookup` and `/pks/add`, so standard OpenPGP
/// tooling can talk to the service directly.
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Router};
use serde::Deserialize;

use super::AppState;
use crate::context::RequestContext;

#[derive(Debug, Deserialize)]
struct LookupQuery {
    #[serde(default)]
    op: String,
    #[serde(default)]
    search: String,
}

/// GET /pks/lookup?op=get&search=0x<fp>
async fn lookup(
    ctx: RequestContext,
    State(state): State<Arc<AppState>>,
    Query(query): Query<LookupQuery>,
) -> Response {
    if query.op != "get" {
        return (
            StatusCode::NOT_IMPLEMENTED,
            "unsupported operation; only op=get is available",
        )
            .into_response();
    }

    let fingerprint = query
        .search
        .trim_start_matches("0x")
        .trim_start_matches("0X");
    if fingerprint.is_empty() {
        return (StatusCode::BAD_REQUEST, "no search term provided").into_response();
    }

    let key = state.pgp.get_public_key_ascii(&ctx, fingerprint).await;
    if key.is_empty() {
        return (StatusCode::NOT_FOUND, "no keys found").into_response();
    }

    ([(header::CONTENT_TYPE, "application/pgp-keys")], key).into_response()
}

#[derive(Debug, Deserialize)]
struct AddForm {
    #[serde(default)]
    keytext: String,
}

/// POST /pks/add with the armored key in the `keytext` form field.
async fn add(State(state): State<Arc<AppState>>, Form(form): Form<AddForm>) -> Response {
    let status = state.pks.add(&form.keytext).await;
    if status != "OK" {
        return (StatusCode::BAD_REQUEST, status).into_response();
    }
    (StatusCode::OK, "OK").into_response()
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/pks/lookup", get(lookup))
        .route("/pks/add", post(add))
}
