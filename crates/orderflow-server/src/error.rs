//! HTTP rendering of `OrderFlowError`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use orderflow_core::error::OrderFlowError;
use serde_json::json;

#[derive(Debug)]
pub struct AppError(pub OrderFlowError);

impl From<OrderFlowError> for AppError {
    fn from(e: OrderFlowError) -> Self {
        Self(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let message = match &self.0 {
            OrderFlowError::Internal(e) => {
                tracing::error!(error = ?e, "internal error");
                "internal server error".to_string()
            }
            other => {
                tracing::debug!(kind = other.kind(), status = %status, "request rejected: {other}");
                other.to_string()
            }
        };

        let mut body = json!({
            "success": false,
            "error": message,
            "kind": self.0.kind(),
        });
        if let OrderFlowError::AiExtractionFailed {
            excerpt: Some(excerpt),
            ..
        } = &self.0
        {
            body["excerpt"] = json!(excerpt);
        }

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_follows_error_kind() {
        let resp = AppError(OrderFlowError::OrderLocked("OC-2025-00001".into())).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = AppError(OrderFlowError::NoValidItems { rows: 3 }).into_response();
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let resp = AppError(OrderFlowError::Internal(anyhow::anyhow!("pool closed"))).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
