use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::entities::order::PaymentMethod;
use crate::errors::ServiceError;
use crate::handlers::AppState;
use crate::services::orders::{CreateOrderCommand, OrderItemSpec, OrderWithItems};

/// One purchased line as submitted by the storefront client.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderIntakeItem {
    pub product_id: Option<String>,
    pub name: Option<String>,
    pub image: Option<String>,
    pub size: Option<String>,
    pub quantity: Option<i32>,
    pub price: Option<Decimal>,
}

/// Order intake payload. Fields are optional at the wire level so that
/// missing values produce a structured validation error rather than a
/// deserialization rejection.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderIntakeRequest {
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
    pub customer_phone: Option<String>,
    pub shipping_address: Option<String>,
    pub shipping_city: Option<String>,
    pub shipping_state: Option<String>,
    pub shipping_pincode: Option<String>,
    pub shipping_country: Option<String>,
    pub payment_method: Option<String>,
    pub items: Option<Vec<OrderIntakeItem>>,
    pub subtotal: Option<Decimal>,
    pub tax: Option<Decimal>,
    pub shipping_cost: Option<Decimal>,
    pub total_amount: Option<Decimal>,
    pub special_instructions: Option<String>,
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreatedOrderSummary {
    pub id: Uuid,
    pub order_number: String,
    pub status: String,
    pub payment_method: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CreateOrderResponse {
    pub success: bool,
    pub order: CreatedOrderSummary,
}

/// Create an order from a storefront checkout
#[utoipa::path(
    post,
    path = "/api/v1/orders",
    request_body = OrderIntakeRequest,
    responses(
        (status = 201, description = "Order created", body = CreateOrderResponse),
        (status = 400, description = "Validation failed", body = crate::errors::ErrorResponse),
        (status = 500, description = "Persistence failure", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn create_order(
    State(state): State<AppState>,
    Json(request): Json<OrderIntakeRequest>,
) -> Result<(StatusCode, Json<CreateOrderResponse>), ServiceError> {
    let command = intake_to_command(request, &state)?;
    let created = state.services.orders.create_order(command).await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateOrderResponse {
            success: true,
            order: CreatedOrderSummary {
                id: created.order.id,
                order_number: created.order.order_number,
                status: created.order.status,
                payment_method: created.order.payment_method,
            },
        }),
    ))
}

/// Get one order with its items
#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order with items"),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ServiceError> {
    let found = state.services.orders.get_order(id).await?;
    Ok(Json(json!({
        "success": true,
        "order": order_payload(&found)?,
    })))
}

/// All orders owned by the authenticated caller, newest first
#[utoipa::path(
    get,
    path = "/api/v1/orders/mine",
    responses(
        (status = 200, description = "Orders with nested items"),
        (status = 401, description = "Missing or invalid token", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn my_orders(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<Value>, ServiceError> {
    let orders = state
        .services
        .orders
        .list_orders_for_user(user.user_id)
        .await?;

    let payloads = orders
        .iter()
        .map(order_payload)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(json!({
        "success": true,
        "orders": payloads,
    })))
}

fn order_payload(found: &OrderWithItems) -> Result<Value, ServiceError> {
    let mut order = serde_json::to_value(&found.order)
        .map_err(|e| ServiceError::Internal(format!("Failed to serialize order: {}", e)))?;
    let items = serde_json::to_value(&found.items)
        .map_err(|e| ServiceError::Internal(format!("Failed to serialize items: {}", e)))?;
    order["items"] = items;
    Ok(order)
}

fn intake_to_command(
    request: OrderIntakeRequest,
    state: &AppState,
) -> Result<CreateOrderCommand, ServiceError> {
    let payment_method_raw = request
        .payment_method
        .ok_or_else(|| ServiceError::MissingFields("paymentMethod".to_string()))?;
    let payment_method = PaymentMethod::parse(&payment_method_raw)
        .ok_or_else(|| ServiceError::ValidationError("Invalid payment method".to_string()))?;

    let items_raw = request
        .items
        .ok_or_else(|| ServiceError::MissingFields("items".to_string()))?;
    let mut items = Vec::with_capacity(items_raw.len());
    for (index, item) in items_raw.into_iter().enumerate() {
        let spec = OrderItemSpec {
            product_id: item.product_id.ok_or_else(|| {
                ServiceError::ValidationError(format!("items[{}].productId is required", index))
            })?,
            name: item.name.ok_or_else(|| {
                ServiceError::ValidationError(format!("items[{}].name is required", index))
            })?,
            image: item.image,
            size: item.size.unwrap_or_default(),
            quantity: item.quantity.ok_or_else(|| {
                ServiceError::ValidationError(format!("items[{}].quantity is required", index))
            })?,
            price: item.price.ok_or_else(|| {
                ServiceError::ValidationError(format!("items[{}].price is required", index))
            })?,
        };
        items.push(spec);
    }

    let total_amount = request
        .total_amount
        .ok_or_else(|| ServiceError::MissingFields("totalAmount".to_string()))?;

    Ok(CreateOrderCommand {
        customer_name: request.customer_name.unwrap_or_default(),
        customer_email: request.customer_email.unwrap_or_default(),
        customer_phone: request.customer_phone.unwrap_or_default(),
        shipping_address: request.shipping_address.unwrap_or_default(),
        shipping_city: request.shipping_city.unwrap_or_default(),
        shipping_state: request.shipping_state.unwrap_or_default(),
        shipping_pincode: request.shipping_pincode.unwrap_or_default(),
        shipping_country: request
            .shipping_country
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| state.config.default_country.clone()),
        payment_method,
        items,
        subtotal: request.subtotal.unwrap_or(Decimal::ZERO),
        tax: request.tax.unwrap_or(Decimal::ZERO),
        shipping_cost: request.shipping_cost.unwrap_or(Decimal::ZERO),
        total_amount,
        special_instructions: request.special_instructions,
        user_id: request.user_id,
    })
}
