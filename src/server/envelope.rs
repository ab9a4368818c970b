/// JSON error envelope returned by every endpoint, and the mapping from the
/// internal error taxonomy to HTTP status codes.
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::error::SignerError;

pub const ERROR_INVALID_FIELD_DATA: &str = "INVALID_FIELD_DATA";
pub const ERROR_NOT_FOUND: &str = "NOT_FOUND";
pub const ERROR_PERMISSION_DENIED: &str = "PERMISSION_DENIED";
pub const ERROR_INTERNAL_SERVER_ERROR: &str = "INTERNAL_SERVER_ERROR";

#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    #[serde(rename = "ErrorCode")]
    pub error_code: &'static str,
    #[serde(rename = "ErrorField")]
    pub error_field: String,
    #[serde(rename = "Message")]
    pub message: String,
    #[serde(rename = "StackTrace", skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,
}

pub type ApiError = (StatusCode, Json<ErrorEnvelope>);

/// Converts an internal error into the HTTP envelope for `field`.
pub fn reject(field: &str, err: SignerError) -> ApiError {
    let (status, code) = match &err {
        SignerError::InvalidBody(_)
        | SignerError::InvalidSignatureFormat(_)
        | SignerError::InvalidKeyMaterial(_)
        | SignerError::InvalidFieldData { .. }
        | SignerError::KeyNotUnlocked(_)
        | SignerError::KeyTooWeak(_, _) => (StatusCode::BAD_REQUEST, ERROR_INVALID_FIELD_DATA),

        SignerError::PermissionDenied(_) | SignerError::BadPassphrase(_) => {
            (StatusCode::FORBIDDEN, ERROR_PERMISSION_DENIED)
        }

        SignerError::KeyNotFound(_)
        | SignerError::NotFound(_)
        | SignerError::UnknownSigner(_)
        | SignerError::NoPrivateKeyForRecipient(_) => (StatusCode::NOT_FOUND, ERROR_NOT_FOUND),

        SignerError::RemoteKeyserverFailure(_) => {
            (StatusCode::BAD_GATEWAY, ERROR_INTERNAL_SERVER_ERROR)
        }
        SignerError::Timeout => (StatusCode::GATEWAY_TIMEOUT, ERROR_INTERNAL_SERVER_ERROR),

        _ => (
            StatusCode::INTERNAL_SERVER_ERROR,
            ERROR_INTERNAL_SERVER_ERROR,
        ),
    };

    let stack_trace = cfg!(debug_assertions).then(|| format!("{err:?}"));

    (
        status,
        Json(ErrorEnvelope {
            error_code: code,
            error_field: field.to_string(),
            message: err.to_string(),
            stack_trace,
        }),
    )
}

pub fn invalid_field(field: &str, message: &str) -> ApiError {
    reject(
        field,
        SignerError::InvalidFieldData {
            field: field.to_string(),
            message: message.to_string(),
        },
    )
}

pub fn not_found(field: &str, message: &str) -> ApiError {
    reject(field, SignerError::NotFound(message.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_taxonomy_mapping() {
        let (status, body) = reject("Password", SignerError::BadPassphrase("ABCD".into()));
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body.error_code, ERROR_PERMISSION_DENIED);
        assert_eq!(body.error_field, "Password");

        let (status, body) = reject("FingerPrint", SignerError::KeyNotFound("ABCD".into()));
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body.error_code, ERROR_NOT_FOUND);

        let (status, _) = reject("Bits", SignerError::KeyTooWeak(1024, 2048));
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = reject(
            "server",
            SignerError::RemoteKeyserverFailure("boom".into()),
        );
        assert_eq!(status, StatusCode::BAD_GATEWAY);

        let (status, _) = reject("ctx", SignerError::Timeout);
        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    }
}
