/// /sks endpoints: key lookup and keyserver search backed by the
/// public-key store.
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use super::envelope::{invalid_field, not_found, reject, ApiError};
use super::AppState;
use crate::context::RequestContext;
use crate::pks::GpgKeyRecord;

const DEFAULT_PAGE_START: i64 = 0;
const DEFAULT_PAGE_END: i64 = 100;

#[derive(Debug, Deserialize)]
struct GetKeyQuery {
    #[serde(rename = "fingerPrint", default)]
    fingerprint: String,
}

/// GET /sks/getKey?fingerPrint= — armored public key.
async fn get_key(
    ctx: RequestContext,
    State(state): State<Arc<AppState>>,
    Query(query): Query<GetKeyQuery>,
) -> Result<String, ApiError> {
    if query.fingerprint.is_empty() {
        return Err(invalid_field("fingerPrint", "you should provide a fingerPrint"));
    }

    let key = state.pgp.get_public_key_ascii(&ctx, &query.fingerprint).await;
    if key.is_empty() {
        return Err(not_found(
            "fingerPrint",
            &format!("Key with fingerPrint {} was not found", query.fingerprint),
        ));
    }
    Ok(key)
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    #[serde(default)]
    name: String,
    #[serde(rename = "fingerPrint", default)]
    fingerprint: String,
    #[serde(default)]
    email: String,
    #[serde(rename = "valueData", default)]
    value_data: String,
    #[serde(rename = "pageStart")]
    page_start: Option<i64>,
    #[serde(rename = "pageEnd")]
    page_end: Option<i64>,
}

impl SearchQuery {
    fn window(&self) -> (i64, i64) {
        (
            self.page_start.unwrap_or(DEFAULT_PAGE_START),
            self.page_end.unwrap_or(DEFAULT_PAGE_END),
        )
    }
}

/// GET /sks/searchByName
async fn search_by_name(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<GpgKeyRecord>>, ApiError> {
    if query.name.is_empty() {
        return Err(invalid_field("name", "you should provide a name"));
    }
    let (start, end) = query.window();
    state
        .pks
        .search_by_name(&query.name, start, end)
        .await
        .map(Json)
        .map_err(|e| reject("name", e))
}

/// GET /sks/searchByFingerPrint
async fn search_by_fingerprint(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<GpgKeyRecord>>, ApiError> {
    if query.fingerprint.is_empty() {
        return Err(invalid_field("fingerPrint", "you should provide a fingerPrint"));
    }
    let (start, end) = query.window();
    state
        .pks
        .search_by_fingerprint(&query.fingerprint, start, end)
        .await
        .map(Json)
        .map_err(|e| reject("fingerPrint", e))
}

/// GET /sks/searchByEmail
async fn search_by_email(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<GpgKeyRecord>>, ApiError> {
    if query.email.is_empty() {
        return Err(invalid_field("email", "you should provide a email"));
    }
    let (start, end) = query.window();
    state
        .pks
        .search_by_email(&query.email, start, end)
        .await
        .map(Json)
        .map_err(|e| reject("email", e))
}

/// GET /sks/search — any-field match.
async fn search(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<GpgKeyRecord>>, ApiError> {
    if query.value_data.is_empty() {
        return Err(invalid_field("valueData", "you should provide a valueData"));
    }
    let (start, end) = query.window();
    state
        .pks
        .search(&query.value_data, start, end)
        .await
        .map(Json)
        .map_err(|e| reject("valueData", e))
}

#[derive(Debug, Deserialize)]
struct AddKeyRequest {
    #[serde(rename = "PublicKey")]
    public_key: String,
}

/// POST /sks/addKey
async fn add_key(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AddKeyRequest>,
) -> Result<&'static str, ApiError> {
    let status = state.pks.add(&req.public_key).await;
    if status != "OK" {
        return Err(invalid_field(
            "PublicKey",
            "Invalid Public Key specified. Check if its in ASCII Armored Format",
        ));
    }
    Ok("OK")
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/sks/getKey", get(get_key))
        .route("/sks/searchByName", get(search_by_name))
        .route("/sks/searchByFingerPrint", get(search_by_fingerprint))
        .route("/sks/searchByEmail", get(search_by_email))
        .route("/sks/search", get(search))
        .route("/sks/addKey", post(add_key))
}
