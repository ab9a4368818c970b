/// Agent proxy: stamps authenticated JSON requests with uniqueness fields,
/// signs the exact bytes that are forwarded, and relays the downstream
/// response verbatim.
use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::Router;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::envelope::reject;
use super::AppState;
use crate::context::RequestContext;
use crate::error::{Result, SignerError};
use crate::manager::DEFAULT_HASH;
use crate::quanto;

const MAX_UUID_TRIES: usize = 5;
const AGENT_TIMEOUT: Duration = Duration::from_secs(60);
const MAX_BODY_BYTES: usize = 8 * 1024 * 1024;
const POWERED_BY: &str = "RemoteSigner Agent";

/// Headers never copied towards the downstream service.
const SKIPPED_REQUEST_HEADERS: &[&str] = &["proxytoken", "host", "content-length"];
/// Hop-by-hop headers never copied back to the client.
const SKIPPED_RESPONSE_HEADERS: &[&str] = &["connection", "transfer-encoding", "content-length"];

/// A fresh 128-bit random identifier. Entropy draws can fail, so the
/// attempt is retried a bounded number of times.
fn generate_unique_id() -> Result<Uuid> {
    use rand::RngCore;

    for attempt in 0..MAX_UUID_TRIES {
        let mut bytes = [0u8; 16];
        match rand::rngs::OsRng.try_fill_bytes(&mut bytes) {
            Ok(()) => return Ok(uuid::Builder::from_random_bytes(bytes).into_uuid()),
            Err(e) => warn!(attempt, error = %e, "Error drawing uniqueness entropy, trying again"),
        }
    }
    Err(SignerError::UuidExhausted)
}

/// Stamps `_timeUniqueId` and `_timestamp` into the request object.
fn inject_uniqueness_fields(body: &mut Map<String, Value>) -> Result<()> {
    let unique = generate_unique_id()?;
    let timestamp = chrono::Utc::now().timestamp_millis();
    debug!(unique_id = %unique, timestamp, "Request uniqueness injected");

    body.insert("_timeUniqueId".to_string(), Value::String(unique.to_string()));
    body.insert("_timestamp".to_string(), Value::from(timestamp));
    Ok(())
}

fn forwarded_headers(headers: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::new();
    for (name, value) in headers {
        if SKIPPED_REQUEST_HEADERS.contains(&name.as_str()) {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}

async fn proxy(
    ctx: RequestContext,
    State(state): State<Arc<AppState>>,
    req: Request,
) -> Response {
    let (parts, body) = req.into_parts();

    let target_url = parts
        .headers
        .get("serverUrl")
        .and_then(|v| v.to_str().ok())
        .unwrap_or(&state.config.agent_target_url)
        .to_string();

    // OPTIONS passes through unsigned, headers copied like any other
    // request.
    if parts.method == Method::OPTIONS {
        let request = state
            .proxy_client
            .request(Method::OPTIONS, &target_url)
            .headers(forwarded_headers(&parts.headers))
            .header("X-Powered-By", POWERED_BY)
            .timeout(ctx.remaining().unwrap_or(AGENT_TIMEOUT));
        return forward(request).await;
    }

    let mut fingerprint = state.config.agent_key_fingerprint.clone();

    if !state.config.agent_bypass_login {
        let token = parts
            .headers
            .get("proxyToken")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if token.is_empty() {
            return reject(
                "proxyToken",
                SignerError::PermissionDenied("Please check if your proxyToken is valid".into()),
            )
            .into_response();
        }

        match state.tokens.verify(token) {
            Ok(claims) => {
                if let Some(fp) = claims.fingerprint {
                    fingerprint = fp;
                }
            }
            Err(_) => {
                return reject(
                    "proxyToken",
                    SignerError::PermissionDenied(
                        "Please check if your proxyToken is valid".into(),
                    ),
                )
                .into_response();
            }
        }
    }

    let body_bytes = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => return reject("body", SignerError::InvalidBody(e.to_string())).into_response(),
    };

    let mut json_body: Map<String, Value> = match serde_json::from_slice(&body_bytes) {
        Ok(map) => map,
        Err(e) => return reject("body", SignerError::InvalidBody(e.to_string())).into_response(),
    };

    if let Err(e) = inject_uniqueness_fields(&mut json_body) {
        return reject("body", e).into_response();
    }

    // The signature covers exactly the bytes that go on the wire.
    let signed_body = match serde_json::to_vec(&json_body) {
        Ok(bytes) => bytes,
        Err(e) => {
            return reject("body", SignerError::Serialization(e.to_string())).into_response()
        }
    };

    info!(fingerprint = %fingerprint, target = %target_url, "Signing proxied request");
    let signature = match state
        .pgp
        .sign_data(&ctx, &fingerprint, &signed_body, DEFAULT_HASH)
    {
        Ok(sig) => sig,
        Err(e) => return reject("signature", e).into_response(),
    };
    let quanto_sig =
        quanto::armored_to_quanto(&signature, &fingerprint.to_uppercase(), "SHA512");

    let request = state
        .proxy_client
        .request(parts.method.clone(), &target_url)
        .headers(forwarded_headers(&parts.headers))
        .header("signature", quanto_sig)
        .header("X-Powered-By", POWERED_BY)
        .timeout(ctx.remaining().unwrap_or(AGENT_TIMEOUT))
        .body(signed_body);

    forward(request).await
}

/// Sends the request downstream and streams the response back.
async fn forward(request: reqwest::RequestBuilder) -> Response {
    let resp = match request.send().await {
        Ok(resp) => resp,
        Err(e) => {
            return reject(
                "serverUrl",
                SignerError::RemoteKeyserverFailure(e.to_string()),
            )
            .into_response()
        }
    };

    let status = StatusCode::from_u16(resp.status().as_u16())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut headers = HeaderMap::new();
    for (name, value) in resp.headers() {
        if SKIPPED_RESPONSE_HEADERS.contains(&name.as_str()) {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }

    let mut response = Response::new(Body::from_stream(resp.bytes_stream()));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/agent", any(proxy))
        .route("/agent/{*path}", any(proxy))
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex;

    use axum::http::Request as HttpRequest;
    use tower::ServiceExt;

    use crate::config::Config;
    use crate::manager::PgpManager;
    use crate::pks::PublicKeyStore;
    use crate::server::build_app;
    use crate::storage::void::VoidBackend;
    use crate::tokens::JwtTokenManager;

    fn test_config(bypass: bool, target: &str, fingerprint: &str) -> Config {
        Config {
            private_key_folder: "./keys".into(),
            key_prefix: String::new(),
            http_port: 0,
            max_keyring_cache: 1000,
            master_key_path: None,
            master_key_password_path: None,
            master_key_base64: false,
            keys_base64: false,
            sks_server: None,
            enable_database_sks: false,
            database_url: String::new(),
            single_key_mode: false,
            single_key_path: None,
            single_key_password: None,
            agent_target_url: target.to_string(),
            agent_key_fingerprint: fingerprint.to_string(),
            agent_bypass_login: bypass,
            agent_token_secret: "test-secret".into(),
            readonly_keypath: false,
            vault_storage: false,
            vault_address: String::new(),
            vault_root_token: String::new(),
            vault_path_prefix: String::new(),
        }
    }

    fn test_app(bypass: bool, target: &str, fingerprint: &str, pgp: Arc<PgpManager>) -> axum::Router {
        build_app(AppState {
            pgp,
            pks: Arc::new(PublicKeyStore::new(None, None)),
            tokens: Arc::new(JwtTokenManager::new("test-secret")),
            config: test_config(bypass, target, fingerprint),
            proxy_client: reqwest::Client::new(),
        })
    }

    fn empty_manager() -> Arc<PgpManager> {
        Arc::new(PgpManager::new(Arc::new(VoidBackend), None, None, 1000, false))
    }

    type Captured = Arc<Mutex<Option<(HeaderMap, Vec<u8>)>>>;

    /// Spawns a local downstream that records the headers and body of the
    /// one request it serves.
    async fn capture_downstream() -> (Captured, String) {
        let captured: Captured = Arc::new(Mutex::new(None));
        let sink = captured.clone();
        let downstream = axum::Router::new().route(
            "/",
            axum::routing::any(move |req: Request| {
                let sink = sink.clone();
                async move {
                    let (parts, body) = req.into_parts();
                    let bytes = to_bytes(body, MAX_BODY_BYTES).await.unwrap();
                    *sink.lock().unwrap() = Some((parts.headers, bytes.to_vec()));
                    "downstream ok"
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let target = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            axum::serve(listener, downstream).await.unwrap();
        });
        (captured, target)
    }

    #[tokio::test]
    async fn test_proxy_without_token_is_denied() {
        let app = test_app(false, "http://127.0.0.1:1", "", empty_manager());

        let response = app
            .oneshot(
                HttpRequest::builder()
                    .method("POST")
                    .uri("/agent")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"foo": 1}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = to_bytes(response.into_body(), MAX_BODY_BYTES).await.unwrap();
        let envelope: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(envelope["ErrorCode"], "PERMISSION_DENIED");
        assert_eq!(envelope["ErrorField"], "proxyToken");
    }

    #[tokio::test]
    async fn test_proxy_passes_options_through_with_headers() {
        let (captured, target) = capture_downstream().await;

        // No token and no bypass: OPTIONS must still go through, headers
        // intact and unsigned.
        let app = test_app(false, &target, "", empty_manager());
        let response = app
            .oneshot(
                HttpRequest::builder()
                    .method("OPTIONS")
                    .uri("/agent")
                    .header("Access-Control-Request-Method", "POST")
                    .header("Origin", "http://example.com")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);

        let (headers, _) = captured.lock().unwrap().take().expect("downstream hit");
        assert_eq!(headers.get("Access-Control-Request-Method").unwrap(), "POST");
        assert_eq!(headers.get("Origin").unwrap(), "http://example.com");
        assert_eq!(headers.get("X-Powered-By").unwrap(), POWERED_BY);
        assert!(headers.get("signature").is_none());
    }

    #[tokio::test]
    async fn test_proxy_signs_and_forwards() {
        let (captured, target) = capture_downstream().await;

        // A real unlocked signing key.
        let pgp = empty_manager();
        let ctx = RequestContext::background();
        let armored = pgp
            .generate_key(&ctx, "Agent", "123456", crate::manager::MIN_KEY_BITS)
            .unwrap();
        pgp.load_key(&ctx, &armored).unwrap();
        let fp16 = crate::keys::fingerprint_from_key(&armored).unwrap();
        pgp.unlock_key(&ctx, &fp16, "123456").unwrap();

        let app = test_app(true, &target, &fp16, pgp.clone());

        let response = app
            .oneshot(
                HttpRequest::builder()
                    .method("POST")
                    .uri("/agent")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"foo": 1}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), MAX_BODY_BYTES).await.unwrap();
        assert_eq!(&body[..], b"downstream ok");

        let (headers, forwarded) = captured.lock().unwrap().take().expect("downstream hit");

        // The downstream object is the original plus the uniqueness fields.
        let json: serde_json::Value = serde_json::from_slice(&forwarded).unwrap();
        assert_eq!(json["foo"], 1);
        assert_eq!(json["_timeUniqueId"].as_str().unwrap().len(), 36);
        assert!(json["_timestamp"].as_i64().unwrap() > 0);

        assert_eq!(headers.get("X-Powered-By").unwrap(), POWERED_BY);
        assert!(headers.get("proxyToken").is_none());

        // The stamped signature is a Quanto string that verifies against
        // the exact forwarded bytes.
        let quanto_sig = headers.get("signature").unwrap().to_str().unwrap();
        assert!(quanto_sig.starts_with(&format!("{fp16}_SHA512_")));
        let valid = pgp
            .verify_signature(&ctx, &forwarded, quanto_sig)
            .await
            .unwrap();
        assert!(valid);
    }

    #[test]
    fn test_inject_uniqueness_fields() {
        let mut body: Map<String, Value> =
            serde_json::from_str(r#"{"foo": 1, "bar": "baz"}"#).unwrap();
        inject_uniqueness_fields(&mut body).unwrap();

        // Original fields survive.
        assert_eq!(body["foo"], Value::from(1));
        assert_eq!(body["bar"], Value::from("baz"));

        // A 36-char UUID and a positive millisecond timestamp.
        let unique = body["_timeUniqueId"].as_str().unwrap();
        assert_eq!(unique.len(), 36);
        assert!(Uuid::parse_str(unique).is_ok());
        assert!(body["_timestamp"].as_i64().unwrap() > 0);
    }

    #[test]
    fn test_unique_ids_are_distinct() {
        let a = generate_unique_id().unwrap();
        let b = generate_unique_id().unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_forwarded_headers_strip_proxy_token() {
        let mut headers = HeaderMap::new();
        headers.insert("proxyToken", "secret".parse().unwrap());
        headers.insert("content-type", "application/json".parse().unwrap());
        headers.insert("host", "example.com".parse().unwrap());
        headers.insert("x-custom", "kept".parse().unwrap());

        let out = forwarded_headers(&headers);
        assert!(out.get("proxyToken").is_none());
        assert!(out.get("host").is_none());
        assert_eq!(out.get("content-type").unwrap(), "application/json");
        assert_eq!(out.get("x-custom").unwrap(), "kept");
    }
}
