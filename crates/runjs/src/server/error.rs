//! HTTP error responses

use std::time::Duration;

use axum::extract::rejection::JsonRejection;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;

use crate::config::ConfigError;
use crate::runner::RunError;

pub const RATE_LIMITED_ERROR: &str = "Too many requests";
pub const RATE_LIMITED_MESSAGE: &str = "Please try again later";

/// Errors returned by the API
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("too many requests, retry after {}s", retry_after.as_secs())]
    RateLimited { retry_after: Duration },
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
        }
    }
}

/// JSON error body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match self {
            ApiError::BadRequest(error) => {
                (status, Json(ErrorResponse { error, message: None })).into_response()
            }
            ApiError::RateLimited { retry_after } => {
                let body = ErrorResponse {
                    error: RATE_LIMITED_ERROR.to_string(),
                    message: Some(RATE_LIMITED_MESSAGE.to_string()),
                };
                let seconds = HeaderValue::from(retry_after.as_secs().max(1));
                (status, [(header::RETRY_AFTER, seconds)], Json(body)).into_response()
            }
        }
    }
}

impl From<RunError> for ApiError {
    fn from(err: RunError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<ConfigError> for ApiError {
    fn from(err: ConfigError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use http_body_util::BodyExt;

    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_bad_request_body() {
        let response = ApiError::BadRequest("boom".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let json = body_json(response).await;
        assert_eq!(json, serde_json::json!({ "error": "boom" }));
    }

    #[tokio::test]
    async fn test_rate_limited_response() {
        let response = ApiError::RateLimited {
            retry_after: Duration::from_secs(60),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "60");

        let json = body_json(response).await;
        assert_eq!(json["error"], "Too many requests");
        assert_eq!(json["message"], "Please try again later");
    }
}
