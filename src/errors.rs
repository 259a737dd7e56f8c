use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;

/// Error body returned to API clients.
///
/// Every user-visible failure is `{error, details?}`; the request either
/// fully succeeded or the client is told it did not.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Human-readable error description
    #[schema(example = "Order not found")]
    pub error: String,
    /// Additional detail for operator diagnosis
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Provider-specific diagnostics attached to a payment gateway failure.
///
/// Passed through unmodified so the client can display what the provider
/// reported.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GatewayErrorDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sea_orm::error::DbErr),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Missing required fields: {0}")]
    MissingFields(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid payment signature")]
    InvalidSignature,

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Payment gateway error: {message}")]
    Gateway {
        message: String,
        details: GatewayErrorDetails,
    },

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl ServiceError {
    /// Single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::ValidationError(_)
            | Self::MissingFields(_)
            | Self::Conflict(_)
            | Self::InvalidSignature => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::DatabaseError(_)
            | Self::Configuration(_)
            | Self::Gateway { .. }
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message suitable for the response body. Persistence errors keep the
    /// underlying detail so an operator can diagnose them from the client
    /// report; configuration errors stay generic.
    fn response_parts(&self) -> (String, Option<String>) {
        match self {
            Self::DatabaseError(err) => ("Database error".to_string(), Some(err.to_string())),
            Self::Configuration(_) => ("Service configuration error".to_string(), None),
            Self::Internal(detail) => ("Internal server error".to_string(), Some(detail.clone())),
            Self::Gateway { message, .. } => (message.clone(), None),
            other => (other.to_string(), None),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Gateway failures carry the provider's own status and error code
        // alongside the standard body.
        if let Self::Gateway { message, details } = &self {
            let body = json!({
                "error": message,
                "details": details.description,
                "statusCode": details.status_code,
                "gatewayErrorCode": details.code,
                "gatewayErrorDescription": details.description,
            });
            return (status, Json(body)).into_response();
        }

        let (error, details) = self.response_parts();
        (status, Json(ErrorResponse { error, details })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[test]
    fn status_code_mapping() {
        assert_eq!(
            ServiceError::ValidationError("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::MissingFields("orderId".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::InvalidSignature.status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::Conflict("already paid".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::NotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServiceError::Unauthorized("no token".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ServiceError::Configuration("secret unset".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ServiceError::Internal("boom".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn persistence_errors_keep_detail_for_diagnosis() {
        let err = ServiceError::DatabaseError(sea_orm::error::DbErr::Custom(
            "connection refused".into(),
        ));
        let (error, details) = err.response_parts();
        assert_eq!(error, "Database error");
        assert!(details.unwrap().contains("connection refused"));
    }

    #[test]
    fn configuration_errors_hide_detail() {
        let err = ServiceError::Configuration("RAZORPAY-style secret missing".into());
        let (error, details) = err.response_parts();
        assert_eq!(error, "Service configuration error");
        assert!(details.is_none());
    }

    #[tokio::test]
    async fn gateway_error_body_passes_provider_fields_through() {
        let err = ServiceError::Gateway {
            message: "Failed to create gateway order".into(),
            details: GatewayErrorDetails {
                status_code: Some(400),
                code: Some("BAD_REQUEST_ERROR".into()),
                description: Some("amount exceeds maximum".into()),
            },
        };
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let payload: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(payload["statusCode"], 400);
        assert_eq!(payload["gatewayErrorCode"], "BAD_REQUEST_ERROR");
        assert_eq!(payload["gatewayErrorDescription"], "amount exceeds maximum");
    }
}
