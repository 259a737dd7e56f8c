//! Gateway payment settlement: opening remote transactions and confirming
//! signed settlement proofs.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    entities::order::{self, OrderStatus, PaymentStatus},
    errors::ServiceError,
    events::{Event, EventSender},
    gateway::{signature::verify_payment_signature, PaymentGateway},
    notifications::NotificationDispatcher,
    services::orders::confirmation_email,
    store::{OrderPatch, OrderStore},
};

/// A remote gateway transaction opened for an order.
#[derive(Debug, Clone)]
pub struct GatewaySession {
    pub gateway_order_id: String,
    pub amount_minor: i64,
    pub currency: String,
}

/// Transient verification request; consumed once and discarded.
#[derive(Debug, Clone, Default)]
pub struct PaymentVerificationRequest {
    pub order_id: Option<Uuid>,
    pub gateway_order_id: Option<String>,
    pub gateway_payment_id: Option<String>,
    pub gateway_signature: Option<String>,
}

/// Service for initiating and confirming gateway payments.
#[derive(Clone)]
pub struct PaymentService {
    store: Arc<dyn OrderStore>,
    gateway: Option<Arc<dyn PaymentGateway>>,
    dispatcher: Arc<NotificationDispatcher>,
    signature_secret: Option<String>,
    currency: String,
    event_sender: Option<Arc<EventSender>>,
}

impl PaymentService {
    pub fn new(
        store: Arc<dyn OrderStore>,
        gateway: Option<Arc<dyn PaymentGateway>>,
        dispatcher: Arc<NotificationDispatcher>,
        signature_secret: Option<String>,
        currency: String,
        event_sender: Option<Arc<EventSender>>,
    ) -> Self {
        Self {
            store,
            gateway,
            dispatcher,
            signature_secret,
            currency,
            event_sender,
        }
    }

    /// Opens a gateway transaction for an unpaid gateway order.
    ///
    /// The returned gateway order id is persisted onto the order
    /// best-effort: the payment can proceed even when that write fails, so
    /// the failure is logged without failing the response.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn initiate_gateway_payment(
        &self,
        order_id: Uuid,
    ) -> Result<GatewaySession, ServiceError> {
        let gateway = self.gateway.as_ref().ok_or_else(|| {
            ServiceError::Configuration("Payment gateway is not configured".to_string())
        })?;

        let order = self
            .store
            .get_order(order_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        if !order.is_gateway_order() {
            return Err(ServiceError::ValidationError(
                "Order is not set for gateway payment".to_string(),
            ));
        }
        if order.is_paid() {
            return Err(ServiceError::Conflict("Order is already paid".to_string()));
        }

        let amount_minor = to_minor_units(order.total_amount)?;

        let gateway_order = gateway
            .open_transaction(
                amount_minor,
                &self.currency,
                &order.order_number,
                json!({ "orderId": order.id }),
            )
            .await?;

        if let Err(e) = self
            .store
            .update_order(
                order.id,
                OrderPatch {
                    gateway_order_id: Some(gateway_order.id.clone()),
                    ..Default::default()
                },
            )
            .await
        {
            warn!(
                order_id = %order.id,
                gateway_order_id = %gateway_order.id,
                error = %e,
                "Failed to save gateway order id; payment can still proceed"
            );
        }

        if let Some(event_sender) = &self.event_sender {
            if let Err(e) = event_sender
                .send(Event::PaymentSessionOpened {
                    order_id: order.id,
                    gateway_order_id: gateway_order.id.clone(),
                })
                .await
            {
                warn!(error = %e, order_id = %order.id, "Failed to send payment session event");
            }
        }

        Ok(GatewaySession {
            gateway_order_id: gateway_order.id,
            amount_minor: gateway_order.amount,
            currency: gateway_order.currency,
        })
    }

    /// Confirms a gateway payment from its signed callback payload.
    ///
    /// Nothing upstream of signature verification may mark an order paid;
    /// this update is the single source of truth for settlement. The
    /// confirmation email is dispatched after the state change commits and
    /// never fails the caller.
    #[instrument(skip(self, request))]
    pub async fn confirm_gateway_payment(
        &self,
        request: PaymentVerificationRequest,
    ) -> Result<order::Model, ServiceError> {
        let (order_id, gateway_order_id, gateway_payment_id, gateway_signature) = match (
            request.order_id,
            request.gateway_order_id,
            request.gateway_payment_id,
            request.gateway_signature,
        ) {
            (Some(order_id), Some(goid), Some(gpid), Some(sig))
                if !goid.is_empty() && !gpid.is_empty() && !sig.is_empty() =>
            {
                (order_id, goid, gpid, sig)
            }
            _ => {
                return Err(ServiceError::MissingFields(
                    "orderId, gatewayOrderId, gatewayPaymentId, gatewaySignature".to_string(),
                ))
            }
        };

        let secret = self.signature_secret.as_deref().ok_or_else(|| {
            ServiceError::Configuration("Payment signature secret is not configured".to_string())
        })?;

        if !verify_payment_signature(
            &gateway_order_id,
            &gateway_payment_id,
            secret,
            &gateway_signature,
        ) {
            warn!(
                order_id = %order_id,
                gateway_order_id = %gateway_order_id,
                "Payment signature mismatch"
            );
            return Err(ServiceError::InvalidSignature);
        }

        let order = self
            .store
            .get_order(order_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let updated = self
            .store
            .update_order(
                order.id,
                OrderPatch {
                    status: Some(OrderStatus::Confirmed.as_str().to_string()),
                    payment_status: Some(PaymentStatus::Completed.as_str().to_string()),
                    gateway_order_id: Some(gateway_order_id),
                    gateway_payment_id: Some(gateway_payment_id),
                    gateway_signature: Some(gateway_signature),
                },
            )
            .await
            .map_err(|e| {
                // The gateway considers the payment settled regardless, so
                // this failure mode is surfaced distinctly.
                ServiceError::Internal(format!("Failed to update order after payment: {}", e))
            })?;

        info!(order_id = %updated.id, order_number = %updated.order_number, "Payment confirmed");

        if let Some(event_sender) = &self.event_sender {
            if let Err(e) = event_sender.send(Event::PaymentCompleted(updated.id)).await {
                warn!(error = %e, order_id = %updated.id, "Failed to send payment completed event");
            }
            if let Err(e) = event_sender
                .send(Event::OrderConfirmed {
                    order_id: updated.id,
                    order_number: updated.order_number.clone(),
                })
                .await
            {
                warn!(error = %e, order_id = %updated.id, "Failed to send order confirmed event");
            }
        }

        // Re-read the lines for the confirmation email; the payment result
        // stands even when this fails.
        match self.store.list_order_items(updated.id).await {
            Ok(items) => {
                self.dispatcher
                    .dispatch_detached(confirmation_email(&updated, &items));
            }
            Err(e) => {
                warn!(
                    order_id = %updated.id,
                    error = %e,
                    "Could not load items for confirmation email; skipping dispatch"
                );
            }
        }

        Ok(updated)
    }
}

/// Converts a decimal amount to integer minor currency units (e.g. paise),
/// rounding to the nearest unit.
fn to_minor_units(amount: Decimal) -> Result<i64, ServiceError> {
    (amount * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .ok_or_else(|| {
            ServiceError::Internal(format!("Amount {} not representable in minor units", amount))
        })
}
