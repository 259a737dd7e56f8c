use axum::{extract::State, response::Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::handlers::AppState;
use crate::services::payments::PaymentVerificationRequest;

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GatewaySessionRequest {
    pub order_id: Option<Uuid>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GatewaySessionResponse {
    pub success: bool,
    pub gateway_order_id: String,
    pub amount: i64,
    pub currency: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPaymentBody {
    pub order_id: Option<Uuid>,
    pub gateway_order_id: Option<String>,
    pub gateway_payment_id: Option<String>,
    pub gateway_signature: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedOrderSummary {
    pub id: Uuid,
    pub order_number: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct VerifyPaymentResponse {
    pub success: bool,
    pub order: VerifiedOrderSummary,
}

/// Open a gateway transaction for an unpaid order
#[utoipa::path(
    post,
    path = "/api/v1/payments/gateway/session",
    request_body = GatewaySessionRequest,
    responses(
        (status = 200, description = "Gateway transaction opened", body = GatewaySessionResponse),
        (status = 400, description = "Wrong payment method or already paid", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "Gateway or configuration failure", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn create_gateway_session(
    State(state): State<AppState>,
    Json(request): Json<GatewaySessionRequest>,
) -> Result<Json<GatewaySessionResponse>, ServiceError> {
    let order_id = request
        .order_id
        .ok_or_else(|| ServiceError::MissingFields("orderId".to_string()))?;

    let session = state
        .services
        .payments
        .initiate_gateway_payment(order_id)
        .await?;

    Ok(Json(GatewaySessionResponse {
        success: true,
        gateway_order_id: session.gateway_order_id,
        amount: session.amount_minor,
        currency: session.currency,
    }))
}

/// Confirm a gateway payment from its signed callback
#[utoipa::path(
    post,
    path = "/api/v1/payments/verify",
    request_body = VerifyPaymentBody,
    responses(
        (status = 200, description = "Payment verified and order confirmed", body = VerifyPaymentResponse),
        (status = 400, description = "Missing fields or invalid signature", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "Persistence or configuration failure", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn verify_payment(
    State(state): State<AppState>,
    Json(body): Json<VerifyPaymentBody>,
) -> Result<Json<VerifyPaymentResponse>, ServiceError> {
    let order = state
        .services
        .payments
        .confirm_gateway_payment(PaymentVerificationRequest {
            order_id: body.order_id,
            gateway_order_id: body.gateway_order_id,
            gateway_payment_id: body.gateway_payment_id,
            gateway_signature: body.gateway_signature,
        })
        .await?;

    Ok(Json(VerifyPaymentResponse {
        success: true,
        order: VerifiedOrderSummary {
            id: order.id,
            order_number: order.order_number,
        },
    }))
}
