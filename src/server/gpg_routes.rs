/// /gpg endpoints: generate, unlock, sign, verify, encrypt, decrypt.
///
/// Field names mirror the wire contract of the original service
/// (PascalCase). Signature endpoints exist in two flavors: standard armor
/// and the compact Quanto form.
use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

use super::envelope::{invalid_field, reject, ApiError};
use super::AppState;
use crate::context::RequestContext;
use crate::manager::DEFAULT_HASH;
use crate::quanto;

#[derive(Debug, Deserialize)]
struct GenerateKeyRequest {
    #[serde(rename = "Identifier")]
    identifier: String,
    #[serde(rename = "Password")]
    password: String,
    #[serde(rename = "Bits")]
    bits: u32,
}

/// POST /gpg/generateKey — returns the armored private key.
async fn generate_key(
    ctx: RequestContext,
    State(state): State<Arc<AppState>>,
    Json(req): Json<GenerateKeyRequest>,
) -> Result<String, ApiError> {
    state
        .pgp
        .generate_key(&ctx, &req.identifier, &req.password, req.bits)
        .map_err(|e| reject("Bits", e))
}

#[derive(Debug, Deserialize)]
struct UnlockKeyRequest {
    #[serde(rename = "FingerPrint")]
    fingerprint: String,
    #[serde(rename = "Password")]
    password: String,
}

/// POST /gpg/unlockKey
async fn unlock_key(
    ctx: RequestContext,
    State(state): State<Arc<AppState>>,
    Json(req): Json<UnlockKeyRequest>,
) -> Result<&'static str, ApiError> {
    state
        .pgp
        .unlock_key(&ctx, &req.fingerprint, &req.password)
        .map(|_| "OK")
        .map_err(|e| reject("Password", e))
}

#[derive(Debug, Deserialize)]
struct SignRequest {
    #[serde(rename = "FingerPrint")]
    fingerprint: String,
    #[serde(rename = "Base64Data")]
    base64_data: String,
}

fn decode_payload(base64_data: &str) -> Result<Vec<u8>, ApiError> {
    BASE64
        .decode(base64_data.trim())
        .map_err(|_| invalid_field("Base64Data", "payload is not valid base64"))
}

/// POST /gpg/sign — detached armored signature over the payload.
async fn sign(
    ctx: RequestContext,
    State(state): State<Arc<AppState>>,
    Json(req): Json<SignRequest>,
) -> Result<String, ApiError> {
    let data = decode_payload(&req.base64_data)?;
    state
        .pgp
        .sign_data(&ctx, &req.fingerprint, &data, DEFAULT_HASH)
        .map_err(|e| reject("FingerPrint", e))
}

/// POST /gpg/signQuanto — same signature in the compact form.
async fn sign_quanto(
    ctx: RequestContext,
    State(state): State<Arc<AppState>>,
    Json(req): Json<SignRequest>,
) -> Result<String, ApiError> {
    let data = decode_payload(&req.base64_data)?;
    let armored = state
        .pgp
        .sign_data(&ctx, &req.fingerprint, &data, DEFAULT_HASH)
        .map_err(|e| reject("FingerPrint", e))?;
    Ok(quanto::armored_to_quanto(
        &armored,
        &req.fingerprint.to_uppercase(),
        "SHA512",
    ))
}

#[derive(Debug, Deserialize)]
struct VerifyRequest {
    #[serde(rename = "Base64Data")]
    base64_data: String,
    #[serde(rename = "Signature")]
    signature: String,
}

async fn verify_common(
    ctx: RequestContext,
    state: Arc<AppState>,
    req: VerifyRequest,
) -> Result<&'static str, ApiError> {
    let data = decode_payload(&req.base64_data)?;
    let valid = state
        .pgp
        .verify_signature(&ctx, &data, &req.signature)
        .await
        .map_err(|e| reject("Signature", e))?;
    if !valid {
        return Err(invalid_field("Signature", "The provided signature is invalid"));
    }
    Ok("OK")
}

/// POST /gpg/verifySignature
async fn verify_signature(
    ctx: RequestContext,
    State(state): State<Arc<AppState>>,
    Json(req): Json<VerifyRequest>,
) -> Result<&'static str, ApiError> {
    verify_common(ctx, state, req).await
}

/// POST /gpg/verifySignatureQuanto — accepts the Quanto form; the manager
/// converts before parsing.
async fn verify_signature_quanto(
    ctx: RequestContext,
    State(state): State<Arc<AppState>>,
    Json(req): Json<VerifyRequest>,
) -> Result<&'static str, ApiError> {
    verify_common(ctx, state, req).await
}

#[derive(Debug, Deserialize)]
struct EncryptRequest {
    #[serde(rename = "FingerPrint")]
    fingerprint: String,
    #[serde(rename = "Base64Data")]
    base64_data: String,
    #[serde(rename = "Filename", default)]
    filename: String,
    #[serde(rename = "DataOnly", default)]
    data_only: bool,
}

/// POST /gpg/encrypt — armored message, or raw-binary base64 when DataOnly.
async fn encrypt(
    ctx: RequestContext,
    State(state): State<Arc<AppState>>,
    Json(req): Json<EncryptRequest>,
) -> Result<String, ApiError> {
    let data = decode_payload(&req.base64_data)?;
    state
        .pgp
        .encrypt(&ctx, &req.filename, &req.fingerprint, &data, req.data_only)
        .await
        .map_err(|e| reject("FingerPrint", e))
}

#[derive(Debug, Deserialize)]
struct DecryptRequest {
    #[serde(rename = "AsciiArmoredData")]
    ascii_armored_data: String,
    #[serde(rename = "DataOnly", default)]
    data_only: bool,
}

#[derive(Debug, Serialize)]
struct DecryptResponse {
    #[serde(rename = "FingerPrint")]
    fingerprint: String,
    #[serde(rename = "Base64Data")]
    base64_data: String,
    #[serde(rename = "Filename")]
    filename: String,
}

/// POST /gpg/decrypt
async fn decrypt(
    ctx: RequestContext,
    State(state): State<Arc<AppState>>,
    Json(req): Json<DecryptRequest>,
) -> Result<Json<DecryptResponse>, ApiError> {
    let decrypted = state
        .pgp
        .decrypt(&ctx, &req.ascii_armored_data, req.data_only)
        .map_err(|e| reject("AsciiArmoredData", e))?;
    Ok(Json(DecryptResponse {
        fingerprint: decrypted.fingerprint,
        base64_data: decrypted.base64_data,
        filename: decrypted.filename,
    }))
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/gpg/generateKey", post(generate_key))
        .route("/gpg/unlockKey", post(unlock_key))
        .route("/gpg/sign", post(sign))
        .route("/gpg/signQuanto", post(sign_quanto))
        .route("/gpg/verifySignature", post(verify_signature))
        .route("/gpg/verifySignatureQuanto", post(verify_signature_quanto))
        .route("/gpg/encrypt", post(encrypt))
        .route("/gpg/decrypt", post(decrypt))
}
