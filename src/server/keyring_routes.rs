/// /keyring maintenance endpoints: cache inspection and private-key
/// installation.
use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use super::envelope::{reject, ApiError};
use super::AppState;
use crate::context::RequestContext;
use crate::keys::fingerprint_from_key;

#[derive(Debug, Serialize)]
struct CachedKeyInfo {
    #[serde(rename = "FingerPrint")]
    fingerprint: String,
    #[serde(rename = "Identifier")]
    identifier: String,
    #[serde(rename = "ContainsPrivateKey")]
    contains_private_key: bool,
}

/// GET /keyring/cachedKeys
async fn cached_keys(State(state): State<Arc<AppState>>) -> Json<Vec<CachedKeyInfo>> {
    let keys = state
        .pgp
        .keyring()
        .get_cached_keys()
        .into_iter()
        .map(|entity| CachedKeyInfo {
            fingerprint: entity.fp16(),
            identifier: entity.identifier.clone(),
            contains_private_key: entity.is_unlocked(),
        })
        .collect();
    Json(keys)
}

/// GET /keyring/privateKeys — fp16 of every loaded private key, locked or
/// unlocked.
async fn private_keys(State(state): State<Arc<AppState>>) -> Json<Vec<String>> {
    let mut fps = state.pgp.locked_fingerprints();
    for entity in state.pgp.keyring().private_entities() {
        let fp = entity.fp16();
        if !fps.contains(&fp) {
            fps.push(fp);
        }
    }
    fps.sort();
    Json(fps)
}

#[derive(Debug, Deserialize)]
struct AddPrivateKeyRequest {
    #[serde(rename = "AsciiArmoredKey")]
    ascii_armored_key: String,
    #[serde(rename = "SaveToDisk", default)]
    save_to_disk: bool,
}

/// POST /keyring/addPrivateKey — installs a private key, optionally
/// persisting it wrapped under the master key.
async fn add_private_key(
    ctx: RequestContext,
    State(state): State<Arc<AppState>>,
    Json(req): Json<AddPrivateKeyRequest>,
) -> Result<&'static str, ApiError> {
    state
        .pgp
        .load_key(&ctx, &req.ascii_armored_key)
        .map_err(|e| reject("AsciiArmoredKey", e))?;

    if req.save_to_disk {
        let fp16 = fingerprint_from_key(&req.ascii_armored_key)
            .map_err(|e| reject("AsciiArmoredKey", e))?;
        state
            .pgp
            .save_key(&ctx, &fp16, &req.ascii_armored_key)
            .await
            .map_err(|e| reject("AsciiArmoredKey", e))?;
    }
    Ok("OK")
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/keyring/cachedKeys", get(cached_keys))
        .route("/keyring/privateKeys", get(private_keys))
        .route("/keyring/addPrivateKey", post(add_private_key))
}
