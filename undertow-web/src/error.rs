//! HTTP error responses

use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::{error, warn};
use undertow_core::{RangeError, UndertowError};

/// Failure of a request before any response bytes were sent.
///
/// Every variant renders as `{"error": <message>}`. Backend causes are
/// logged here and never reach the caller.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Undertow(#[from] UndertowError),

    #[error("Range not satisfiable: {reason}")]
    RangeNotSatisfiable { reason: RangeError, file_length: u64 },

    #[error("Failed to build response: {0}")]
    Response(#[from] axum::http::Error),
}

impl ApiError {
    /// Status code sent to the caller.
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Undertow(e) => match e {
                UndertowError::Link(_) | UndertowError::NoMediaFile { .. } => {
                    StatusCode::BAD_REQUEST
                }
                UndertowError::FileNotFound { .. } => StatusCode::NOT_FOUND,
                UndertowError::Range(_) => StatusCode::RANGE_NOT_SATISFIABLE,
                UndertowError::ResourceTimeout { .. }
                | UndertowError::Swarm(_)
                | UndertowError::CloudFetch { .. }
                | UndertowError::Configuration { .. }
                | UndertowError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::RangeNotSatisfiable { .. } => StatusCode::RANGE_NOT_SATISFIABLE,
            ApiError::Response(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::Undertow(e) => e.user_message(),
            ApiError::RangeNotSatisfiable { reason, .. } => reason.to_string(),
            ApiError::Response(_) => "Failed to stream the file.".to_string(),
        }
    }
}

impl From<undertow_core::LinkError> for ApiError {
    fn from(e: undertow_core::LinkError) -> Self {
        ApiError::Undertow(e.into())
    }
}

impl From<undertow_core::SwarmError> for ApiError {
    fn from(e: undertow_core::SwarmError) -> Self {
        ApiError::Undertow(e.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        } else {
            warn!("Rejected request: {}", self);
        }

        let mut response = (status, Json(json!({ "error": self.message() }))).into_response();

        if let ApiError::RangeNotSatisfiable { file_length, .. } = &self {
            if let Ok(value) = HeaderValue::from_str(&format!("bytes */{file_length}")) {
                response.headers_mut().insert(header::CONTENT_RANGE, value);
            }
        }

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use undertow_core::{LinkError, SwarmError};

    #[test]
    fn test_client_errors_map_to_4xx() {
        assert_eq!(
            ApiError::from(LinkError::Missing).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(UndertowError::NoMediaFile {
                resource: "pack".to_string(),
                suffix: ".mp4".to_string(),
            })
            .status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(UndertowError::FileNotFound {
                name: "movie.mp4".to_string()
            })
            .status(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn test_backend_errors_map_to_500() {
        let timeout = ApiError::from(UndertowError::ResourceTimeout {
            identifier: "magnet:?xt=urn:btih:abc".to_string(),
        });
        assert_eq!(timeout.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            timeout.message(),
            "Torrent loading timed out. Please try again."
        );

        let backend = ApiError::from(SwarmError::Backend {
            reason: "tracker unreachable".to_string(),
        });
        assert_eq!(backend.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(backend.message(), "Failed to process the torrent.");
    }

    #[test]
    fn test_unsatisfiable_range_carries_length() {
        let response = ApiError::RangeNotSatisfiable {
            reason: RangeError::Malformed {
                header: "bytes=abc".to_string(),
            },
            file_length: 1000,
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(
            response.headers().get(header::CONTENT_RANGE).unwrap(),
            "bytes */1000"
        );
    }
}
