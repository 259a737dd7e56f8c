//! Order intake and lifecycle orchestration.

use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    entities::order::{self, OrderStatus, PaymentMethod, PaymentStatus},
    entities::order_item,
    errors::ServiceError,
    events::{Event, EventSender},
    notifications::{
        EmailLineItem, EmailShippingAddress, NotificationDispatcher, OrderConfirmationEmail,
    },
    store::{NewOrder, NewOrderItem, OrderStore},
};

/// One line of an order intake.
#[derive(Debug, Clone)]
pub struct OrderItemSpec {
    pub product_id: String,
    pub name: String,
    pub image: Option<String>,
    pub size: String,
    pub quantity: i32,
    pub price: Decimal,
}

/// Validated intake for a new order. The caller-supplied total is the
/// authoritative charge amount and is not recomputed here.
#[derive(Debug, Clone)]
pub struct CreateOrderCommand {
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: String,
    pub shipping_address: String,
    pub shipping_city: String,
    pub shipping_state: String,
    pub shipping_pincode: String,
    pub shipping_country: String,
    pub payment_method: PaymentMethod,
    pub items: Vec<OrderItemSpec>,
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub shipping_cost: Decimal,
    pub total_amount: Decimal,
    pub special_instructions: Option<String>,
    pub user_id: Option<Uuid>,
}

/// An order together with its lines.
#[derive(Debug, Clone)]
pub struct OrderWithItems {
    pub order: order::Model,
    pub items: Vec<order_item::Model>,
}

/// Service for order intake, retrieval, and listing.
#[derive(Clone)]
pub struct OrderService {
    store: Arc<dyn OrderStore>,
    dispatcher: Arc<NotificationDispatcher>,
    event_sender: Option<Arc<EventSender>>,
}

impl OrderService {
    pub fn new(
        store: Arc<dyn OrderStore>,
        dispatcher: Arc<NotificationDispatcher>,
        event_sender: Option<Arc<EventSender>>,
    ) -> Self {
        Self {
            store,
            dispatcher,
            event_sender,
        }
    }

    /// Creates an order and its items.
    ///
    /// The two writes are independent store calls; when item persistence
    /// fails the just-created order is deleted again so no orphaned order
    /// stays queryable. Cash-on-delivery orders are confirmed immediately
    /// and their confirmation email is dispatched without blocking the
    /// caller.
    #[instrument(skip(self, command), fields(customer_email = %command.customer_email, payment_method = command.payment_method.as_str()))]
    pub async fn create_order(
        &self,
        command: CreateOrderCommand,
    ) -> Result<OrderWithItems, ServiceError> {
        validate_intake(&command)?;

        let order_number = match self.store.next_order_number().await {
            Ok(Some(number)) => number,
            Ok(None) => {
                warn!("Order number generator unavailable; using timestamp fallback");
                fallback_order_number()
            }
            Err(e) => {
                warn!(error = %e, "Order number generator failed; using timestamp fallback");
                fallback_order_number()
            }
        };

        // COD orders need no settlement step and are confirmed at intake.
        let (status, payment_status) = match command.payment_method {
            PaymentMethod::CashOnDelivery => (OrderStatus::Confirmed, PaymentStatus::Completed),
            PaymentMethod::Gateway => (OrderStatus::PendingPayment, PaymentStatus::Pending),
        };

        let order = self
            .store
            .create_order(NewOrder {
                order_number,
                user_id: command.user_id,
                status: status.as_str().to_string(),
                payment_method: command.payment_method.as_str().to_string(),
                payment_status: payment_status.as_str().to_string(),
                customer_name: command.customer_name,
                customer_email: command.customer_email,
                customer_phone: command.customer_phone,
                shipping_address: command.shipping_address,
                shipping_city: command.shipping_city,
                shipping_state: command.shipping_state,
                shipping_pincode: command.shipping_pincode,
                shipping_country: command.shipping_country,
                subtotal: command.subtotal,
                tax: command.tax,
                shipping_cost: command.shipping_cost,
                total_amount: command.total_amount,
                special_instructions: command.special_instructions,
            })
            .await?;

        let new_items: Vec<NewOrderItem> = command
            .items
            .iter()
            .map(|item| NewOrderItem {
                order_id: order.id,
                product_id: item.product_id.clone(),
                product_name: item.name.clone(),
                product_image: item.image.clone(),
                size: item.size.clone(),
                quantity: item.quantity,
                unit_price: item.price,
                total_price: item.price * Decimal::from(item.quantity),
            })
            .collect();

        let items = match self.store.create_order_items(new_items).await {
            Ok(items) => items,
            Err(items_err) => {
                // Compensating delete: the order must not remain queryable
                // without its lines. Best-effort; a failed delete is logged
                // for operator retry.
                error!(order_id = %order.id, error = %items_err, "Item persistence failed; rolling back order");
                if let Err(delete_err) = self.store.delete_order(order.id).await {
                    error!(
                        order_id = %order.id,
                        error = %delete_err,
                        "Compensating order delete failed; order requires manual cleanup"
                    );
                }
                return Err(ServiceError::Internal(format!(
                    "Failed to create order items: {}",
                    items_err
                )));
            }
        };

        info!(order_id = %order.id, order_number = %order.order_number, "Order created");

        if let Some(event_sender) = &self.event_sender {
            if let Err(e) = event_sender.send(Event::OrderCreated(order.id)).await {
                warn!(error = %e, order_id = %order.id, "Failed to send order created event");
            }
        }

        // Prepaid orders get their confirmation after payment settles.
        if command.payment_method == PaymentMethod::CashOnDelivery {
            self.dispatcher
                .dispatch_detached(confirmation_email(&order, &items));
        }

        Ok(OrderWithItems { order, items })
    }

    /// Fetches one order with its items.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn get_order(&self, order_id: Uuid) -> Result<OrderWithItems, ServiceError> {
        let order = self
            .store
            .get_order(order_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;
        let items = self.store.list_order_items(order.id).await?;
        Ok(OrderWithItems { order, items })
    }

    /// All orders owned by the given user with their items, newest first.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn list_orders_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<OrderWithItems>, ServiceError> {
        let orders = self.store.list_orders_for_user(user_id).await?;
        let mut result = Vec::with_capacity(orders.len());
        for order in orders {
            let items = self.store.list_order_items(order.id).await?;
            result.push(OrderWithItems { order, items });
        }
        Ok(result)
    }
}

fn validate_intake(command: &CreateOrderCommand) -> Result<(), ServiceError> {
    let required = [
        ("customerName", &command.customer_name),
        ("customerEmail", &command.customer_email),
        ("customerPhone", &command.customer_phone),
        ("shippingAddress", &command.shipping_address),
        ("shippingCity", &command.shipping_city),
        ("shippingState", &command.shipping_state),
        ("shippingPincode", &command.shipping_pincode),
    ];
    let missing: Vec<&str> = required
        .iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| *name)
        .collect();
    if !missing.is_empty() {
        return Err(ServiceError::MissingFields(missing.join(", ")));
    }

    if command.items.is_empty() {
        return Err(ServiceError::ValidationError(
            "Order must contain at least one item".to_string(),
        ));
    }
    for item in &command.items {
        if item.quantity <= 0 {
            return Err(ServiceError::ValidationError(format!(
                "Item {} has non-positive quantity",
                item.product_id
            )));
        }
        if item.price < Decimal::ZERO {
            return Err(ServiceError::ValidationError(format!(
                "Item {} has negative price",
                item.product_id
            )));
        }
    }

    if command.total_amount <= Decimal::ZERO {
        return Err(ServiceError::ValidationError(
            "Total amount must be positive".to_string(),
        ));
    }

    Ok(())
}

/// Timestamp-derived order number used when the store's generator is
/// unavailable. Accepts a small collision risk in exchange for not failing
/// the intake.
fn fallback_order_number() -> String {
    let millis = Utc::now().timestamp_millis();
    format!("ORD-{}", millis % 10_000_000_000)
}

/// Builds the confirmation email payload for an order and its items.
pub(crate) fn confirmation_email(
    order: &order::Model,
    items: &[order_item::Model],
) -> OrderConfirmationEmail {
    OrderConfirmationEmail {
        order_number: order.order_number.clone(),
        customer_name: order.customer_name.clone(),
        customer_email: order.customer_email.clone(),
        order_date: order.created_at.format("%-d %B %Y").to_string(),
        items: items
            .iter()
            .map(|item| EmailLineItem {
                name: item.product_name.clone(),
                image: item.product_image.clone(),
                size: item.size.clone(),
                quantity: item.quantity,
                unit_price: item.unit_price,
                total_price: item.total_price,
            })
            .collect(),
        subtotal: order.subtotal,
        tax: order.tax,
        shipping_cost: order.shipping_cost,
        total_amount: order.total_amount,
        payment_method: order.payment_method.clone(),
        shipping_address: EmailShippingAddress {
            address: order.shipping_address.clone(),
            city: order.shipping_city.clone(),
            state: order.shipping_state.clone(),
            pincode: order.shipping_pincode.clone(),
            country: order.shipping_country.clone(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::store::MockOrderStore;
    use mockall::predicate::eq;
    use rust_decimal_macros::dec;

    fn dispatcher() -> Arc<NotificationDispatcher> {
        Arc::new(NotificationDispatcher::new(
            None,
            &AppConfig::for_tests(),
        ))
    }

    fn sample_command(method: PaymentMethod) -> CreateOrderCommand {
        CreateOrderCommand {
            customer_name: "Asha Rao".into(),
            customer_email: "asha@example.com".into(),
            customer_phone: "+919800000000".into(),
            shipping_address: "12 MG Road".into(),
            shipping_city: "Bengaluru".into(),
            shipping_state: "Karnataka".into(),
            shipping_pincode: "560001".into(),
            shipping_country: "India".into(),
            payment_method: method,
            items: vec![OrderItemSpec {
                product_id: "prod-1".into(),
                name: "Handcrafted Wall Clock".into(),
                image: None,
                size: "12in".into(),
                quantity: 2,
                price: dec!(100),
            }],
            subtotal: dec!(200),
            tax: dec!(0),
            shipping_cost: dec!(0),
            total_amount: dec!(200),
            special_instructions: None,
            user_id: None,
        }
    }

    fn stored_order(new_order: &NewOrder) -> order::Model {
        order::Model {
            id: Uuid::new_v4(),
            order_number: new_order.order_number.clone(),
            user_id: new_order.user_id,
            status: new_order.status.clone(),
            payment_method: new_order.payment_method.clone(),
            payment_status: new_order.payment_status.clone(),
            customer_name: new_order.customer_name.clone(),
            customer_email: new_order.customer_email.clone(),
            customer_phone: new_order.customer_phone.clone(),
            shipping_address: new_order.shipping_address.clone(),
            shipping_city: new_order.shipping_city.clone(),
            shipping_state: new_order.shipping_state.clone(),
            shipping_pincode: new_order.shipping_pincode.clone(),
            shipping_country: new_order.shipping_country.clone(),
            subtotal: new_order.subtotal,
            tax: new_order.tax,
            shipping_cost: new_order.shipping_cost,
            total_amount: new_order.total_amount,
            special_instructions: new_order.special_instructions.clone(),
            gateway_order_id: None,
            gateway_payment_id: None,
            gateway_signature: None,
            created_at: Utc::now(),
        }
    }

    fn stored_items(items: &[NewOrderItem]) -> Vec<order_item::Model> {
        items
            .iter()
            .map(|item| order_item::Model {
                id: Uuid::new_v4(),
                order_id: item.order_id,
                product_id: item.product_id.clone(),
                product_name: item.product_name.clone(),
                product_image: item.product_image.clone(),
                size: item.size.clone(),
                quantity: item.quantity,
                unit_price: item.unit_price,
                total_price: item.total_price,
                created_at: Utc::now(),
            })
            .collect()
    }

    #[tokio::test]
    async fn cod_intake_is_confirmed_and_completed() {
        let mut store = MockOrderStore::new();
        store
            .expect_next_order_number()
            .returning(|| Ok(Some("ORD-00000001".into())));
        store
            .expect_create_order()
            .returning(|new_order| Ok(stored_order(&new_order)));
        store
            .expect_create_order_items()
            .returning(|items| Ok(stored_items(&items)));

        let service = OrderService::new(Arc::new(store), dispatcher(), None);
        let created = service
            .create_order(sample_command(PaymentMethod::CashOnDelivery))
            .await
            .unwrap();

        assert_eq!(created.order.status, "confirmed");
        assert_eq!(created.order.payment_status, "completed");
        assert_eq!(created.order.order_number, "ORD-00000001");
        assert_eq!(created.order.total_amount, dec!(200));
        assert_eq!(created.items.len(), 1);
        assert_eq!(created.items[0].total_price, dec!(200));
    }

    #[tokio::test]
    async fn gateway_intake_is_pending() {
        let mut store = MockOrderStore::new();
        store
            .expect_next_order_number()
            .returning(|| Ok(Some("ORD-00000002".into())));
        store
            .expect_create_order()
            .returning(|new_order| Ok(stored_order(&new_order)));
        store
            .expect_create_order_items()
            .returning(|items| Ok(stored_items(&items)));

        let service = OrderService::new(Arc::new(store), dispatcher(), None);
        let created = service
            .create_order(sample_command(PaymentMethod::Gateway))
            .await
            .unwrap();

        assert_eq!(created.order.status, "pending_payment");
        assert_eq!(created.order.payment_status, "pending");
    }

    #[tokio::test]
    async fn item_failure_triggers_compensating_delete() {
        let mut store = MockOrderStore::new();
        let order_id = std::sync::Arc::new(std::sync::Mutex::new(None));
        let captured = order_id.clone();
        store
            .expect_next_order_number()
            .returning(|| Ok(Some("ORD-00000003".into())));
        store.expect_create_order().returning(move |new_order| {
            let model = stored_order(&new_order);
            *captured.lock().unwrap() = Some(model.id);
            Ok(model)
        });
        store.expect_create_order_items().returning(|_| {
            Err(ServiceError::DatabaseError(sea_orm::DbErr::Custom(
                "disk full".into(),
            )))
        });
        let deleted = std::sync::Arc::new(std::sync::Mutex::new(None));
        let deleted_capture = deleted.clone();
        store
            .expect_delete_order()
            .times(1)
            .returning(move |id| {
                *deleted_capture.lock().unwrap() = Some(id);
                Ok(())
            });

        let service = OrderService::new(Arc::new(store), dispatcher(), None);
        let result = service
            .create_order(sample_command(PaymentMethod::CashOnDelivery))
            .await;

        assert!(result.is_err());
        assert_eq!(
            *deleted.lock().unwrap(),
            *order_id.lock().unwrap(),
            "compensating delete must target the created order"
        );
    }

    #[tokio::test]
    async fn compensating_delete_failure_is_swallowed() {
        let mut store = MockOrderStore::new();
        store
            .expect_next_order_number()
            .returning(|| Ok(Some("ORD-00000004".into())));
        store
            .expect_create_order()
            .returning(|new_order| Ok(stored_order(&new_order)));
        store.expect_create_order_items().returning(|_| {
            Err(ServiceError::DatabaseError(sea_orm::DbErr::Custom(
                "disk full".into(),
            )))
        });
        store.expect_delete_order().times(1).returning(|_| {
            Err(ServiceError::DatabaseError(sea_orm::DbErr::Custom(
                "still down".into(),
            )))
        });

        let service = OrderService::new(Arc::new(store), dispatcher(), None);
        let result = service
            .create_order(sample_command(PaymentMethod::CashOnDelivery))
            .await;

        // The item-persistence error is surfaced, not the delete failure.
        match result {
            Err(ServiceError::Internal(msg)) => assert!(msg.contains("order items")),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn generator_outage_falls_back_to_timestamp_number() {
        let mut store = MockOrderStore::new();
        store.expect_next_order_number().returning(|| Ok(None));
        store
            .expect_create_order()
            .returning(|new_order| Ok(stored_order(&new_order)));
        store
            .expect_create_order_items()
            .returning(|items| Ok(stored_items(&items)));

        let service = OrderService::new(Arc::new(store), dispatcher(), None);
        let created = service
            .create_order(sample_command(PaymentMethod::Gateway))
            .await
            .unwrap();

        assert!(created.order.order_number.starts_with("ORD-"));
        let suffix = &created.order.order_number[4..];
        assert!(suffix.chars().all(|c| c.is_ascii_digit()));
    }

    #[tokio::test]
    async fn empty_items_rejected() {
        let store = MockOrderStore::new();
        let service = OrderService::new(Arc::new(store), dispatcher(), None);
        let mut command = sample_command(PaymentMethod::CashOnDelivery);
        command.items.clear();

        let result = service.create_order(command).await;
        assert!(matches!(result, Err(ServiceError::ValidationError(_))));
    }

    #[tokio::test]
    async fn missing_customer_fields_rejected() {
        let store = MockOrderStore::new();
        let service = OrderService::new(Arc::new(store), dispatcher(), None);
        let mut command = sample_command(PaymentMethod::CashOnDelivery);
        command.customer_phone = "  ".into();

        match service.create_order(command).await {
            Err(ServiceError::MissingFields(fields)) => {
                assert!(fields.contains("customerPhone"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn get_order_unknown_id_is_not_found() {
        let mut store = MockOrderStore::new();
        let missing = Uuid::new_v4();
        store
            .expect_get_order()
            .with(eq(missing))
            .returning(|_| Ok(None));

        let service = OrderService::new(Arc::new(store), dispatcher(), None);
        assert!(matches!(
            service.get_order(missing).await,
            Err(ServiceError::NotFound(_))
        ));
    }
}
