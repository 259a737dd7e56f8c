use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::errors::ErrorResponse;
use crate::handlers;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Storefront API",
        version = "0.1.0",
        description = "Order capture and payment settlement for an online storefront: order intake, gateway payment sessions, signed payment verification, and order listing."
    ),
    paths(
        handlers::orders::create_order,
        handlers::orders::get_order,
        handlers::orders::my_orders,
        handlers::payments::create_gateway_session,
        handlers::payments::verify_payment,
    ),
    components(schemas(
        ErrorResponse,
        handlers::orders::OrderIntakeRequest,
        handlers::orders::OrderIntakeItem,
        handlers::orders::CreateOrderResponse,
        handlers::orders::CreatedOrderSummary,
        handlers::payments::GatewaySessionRequest,
        handlers::payments::GatewaySessionResponse,
        handlers::payments::VerifyPaymentBody,
        handlers::payments::VerifyPaymentResponse,
        handlers::payments::VerifiedOrderSummary,
    )),
    tags(
        (name = "Orders", description = "Order intake and retrieval"),
        (name = "Payments", description = "Gateway payment settlement")
    )
)]
pub struct ApiDoc;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDoc::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}
