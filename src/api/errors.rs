use crate::StoreError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt::Display;
use tracing::{debug, error};

impl StoreError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            StoreError::NotFound(_) => StatusCode::NOT_FOUND,
            StoreError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            StoreError::Corrupt { .. } | StoreError::StorageUnavailable(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// Errors render as `{"error": message}` with the mapped status code
impl IntoResponse for StoreError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        } else {
            debug!("Request rejected ({}): {}", status, self);
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Malformed request bodies are the caller's fault
pub(crate) fn bad_request(err: impl Display) -> StoreError {
    StoreError::InvalidInput(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (StoreError::NotFound("batch x".into()), StatusCode::NOT_FOUND),
            (StoreError::InvalidInput("bad".into()), StatusCode::BAD_REQUEST),
            (
                StoreError::Corrupt {
                    id: "x".into(),
                    reason: "eof".into(),
                },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                StoreError::StorageUnavailable(io::Error::new(
                    io::ErrorKind::PermissionDenied,
                    "denied",
                )),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }
}
