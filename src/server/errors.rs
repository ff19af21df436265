//! Error-to-response mapping for the HTTP surface.
//!
//! Clients get a stable, generic `{"error": ...}` body per failure class;
//! the specific cause is logged server-side only. The 429 and 402 gateway
//! statuses pass through so a frontend can show "slow down" and "out of
//! credits" differently.

use crate::error::{GatewayError, IndexError, StoreError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

/// A request-scoped failure, convertible into an HTTP response.
pub enum AppError {
    /// The request body failed validation. The message is client-facing.
    BadRequest(String),
    /// A run could not be prepared.
    Index(IndexError),
    /// A direct gateway call (the `/detect` path) failed.
    Gateway(GatewayError),
    /// The store failed outside of run preparation.
    Store(StoreError),
}

impl From<IndexError> for AppError {
    fn from(err: IndexError) -> Self {
        AppError::Index(err)
    }
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        AppError::Gateway(err)
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::Store(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Index(err) => {
                error!("index error: {err:?}");
                match err {
                    IndexError::MissingApiKey => (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "AI service not configured".to_string(),
                    ),
                    _ => (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Failed to start indexing".to_string(),
                    ),
                }
            }
            AppError::Gateway(err) => {
                error!("gateway error: {err:?}");
                match err {
                    GatewayError::RateLimited => (
                        StatusCode::TOO_MANY_REQUESTS,
                        "Rate limit exceeded, please try again later".to_string(),
                    ),
                    GatewayError::CreditsExhausted => (
                        StatusCode::PAYMENT_REQUIRED,
                        "AI credits exhausted".to_string(),
                    ),
                    _ => (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "AI analysis failed".to_string(),
                    ),
                }
            }
            AppError::Store(err) => {
                error!("store error: {err:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({ "error": message }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: AppError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn gateway_statuses_pass_through() {
        assert_eq!(
            status_of(AppError::Gateway(GatewayError::RateLimited)),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            status_of(AppError::Gateway(GatewayError::CreditsExhausted)),
            StatusCode::PAYMENT_REQUIRED
        );
        assert_eq!(
            status_of(AppError::Gateway(GatewayError::Api {
                status: 503,
                detail: "upstream".into()
            })),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn missing_key_is_an_opaque_500() {
        let resp = AppError::Index(IndexError::MissingApiKey).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn validation_failures_are_400() {
        assert_eq!(
            status_of(AppError::BadRequest("book_id is required".into())),
            StatusCode::BAD_REQUEST
        );
    }
}
