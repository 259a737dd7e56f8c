//! Narrow record-oriented interface over the order data store.
//!
//! Callers must not assume any transactional guarantee across calls: order
//! and order-item creation are independent writes, and cross-entity
//! consistency is the caller's responsibility (compensating delete).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use std::sync::Arc;
use tracing::{error, instrument};
use uuid::Uuid;

use crate::entities::{order, order_counter, order_item};
use crate::errors::ServiceError;

/// Fields for a new order record; ids and timestamps are assigned by the
/// store.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub order_number: String,
    pub user_id: Option<Uuid>,
    pub status: String,
    pub payment_method: String,
    pub payment_status: String,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: String,
    pub shipping_address: String,
    pub shipping_city: String,
    pub shipping_state: String,
    pub shipping_pincode: String,
    pub shipping_country: String,
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub shipping_cost: Decimal,
    pub total_amount: Decimal,
    pub special_instructions: Option<String>,
}

/// Fields for one new order line.
#[derive(Debug, Clone)]
pub struct NewOrderItem {
    pub order_id: Uuid,
    pub product_id: String,
    pub product_name: String,
    pub product_image: Option<String>,
    pub size: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub total_price: Decimal,
}

/// Partial update applied to an existing order. Unset fields are left
/// untouched; the total amount is deliberately not patchable.
#[derive(Debug, Clone, Default)]
pub struct OrderPatch {
    pub status: Option<String>,
    pub payment_status: Option<String>,
    pub gateway_order_id: Option<String>,
    pub gateway_payment_id: Option<String>,
    pub gateway_signature: Option<String>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn create_order(&self, order: NewOrder) -> Result<order::Model, ServiceError>;

    async fn delete_order(&self, id: Uuid) -> Result<(), ServiceError>;

    async fn create_order_items(
        &self,
        items: Vec<NewOrderItem>,
    ) -> Result<Vec<order_item::Model>, ServiceError>;

    async fn get_order(&self, id: Uuid) -> Result<Option<order::Model>, ServiceError>;

    async fn update_order(&self, id: Uuid, patch: OrderPatch)
        -> Result<order::Model, ServiceError>;

    async fn list_order_items(&self, order_id: Uuid)
        -> Result<Vec<order_item::Model>, ServiceError>;

    async fn list_orders_for_user(&self, user_id: Uuid)
        -> Result<Vec<order::Model>, ServiceError>;

    /// Next value from the server-side order-number sequence, or `None`
    /// when the generator is unavailable and the caller should fall back.
    async fn next_order_number(&self) -> Result<Option<String>, ServiceError>;
}

/// SeaORM-backed store implementation.
#[derive(Clone)]
pub struct SeaOrmOrderStore {
    db: Arc<DatabaseConnection>,
}

impl SeaOrmOrderStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl OrderStore for SeaOrmOrderStore {
    #[instrument(skip(self, new_order), fields(order_number = %new_order.order_number))]
    async fn create_order(&self, new_order: NewOrder) -> Result<order::Model, ServiceError> {
        let now: DateTime<Utc> = Utc::now();
        let active = order::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_number: Set(new_order.order_number),
            user_id: Set(new_order.user_id),
            status: Set(new_order.status),
            payment_method: Set(new_order.payment_method),
            payment_status: Set(new_order.payment_status),
            customer_name: Set(new_order.customer_name),
            customer_email: Set(new_order.customer_email),
            customer_phone: Set(new_order.customer_phone),
            shipping_address: Set(new_order.shipping_address),
            shipping_city: Set(new_order.shipping_city),
            shipping_state: Set(new_order.shipping_state),
            shipping_pincode: Set(new_order.shipping_pincode),
            shipping_country: Set(new_order.shipping_country),
            subtotal: Set(new_order.subtotal),
            tax: Set(new_order.tax),
            shipping_cost: Set(new_order.shipping_cost),
            total_amount: Set(new_order.total_amount),
            special_instructions: Set(new_order.special_instructions),
            gateway_order_id: Set(None),
            gateway_payment_id: Set(None),
            gateway_signature: Set(None),
            created_at: Set(now),
        };

        let model = active.insert(&*self.db).await.map_err(|e| {
            error!(error = %e, "Failed to insert order");
            ServiceError::DatabaseError(e)
        })?;
        Ok(model)
    }

    #[instrument(skip(self), fields(order_id = %id))]
    async fn delete_order(&self, id: Uuid) -> Result<(), ServiceError> {
        order::Entity::delete_by_id(id)
            .exec(&*self.db)
            .await
            .map_err(|e| {
                error!(error = %e, order_id = %id, "Failed to delete order");
                ServiceError::DatabaseError(e)
            })?;
        Ok(())
    }

    #[instrument(skip(self, items))]
    async fn create_order_items(
        &self,
        items: Vec<NewOrderItem>,
    ) -> Result<Vec<order_item::Model>, ServiceError> {
        if items.is_empty() {
            return Ok(Vec::new());
        }
        let order_id = items[0].order_id;
        let now: DateTime<Utc> = Utc::now();

        let models: Vec<order_item::ActiveModel> = items
            .into_iter()
            .map(|item| order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(item.order_id),
                product_id: Set(item.product_id),
                product_name: Set(item.product_name),
                product_image: Set(item.product_image),
                size: Set(item.size),
                quantity: Set(item.quantity),
                unit_price: Set(item.unit_price),
                total_price: Set(item.total_price),
                created_at: Set(now),
            })
            .collect();

        order_item::Entity::insert_many(models)
            .exec(&*self.db)
            .await
            .map_err(|e| {
                error!(error = %e, order_id = %order_id, "Failed to insert order items");
                ServiceError::DatabaseError(e)
            })?;

        self.list_order_items(order_id).await
    }

    async fn get_order(&self, id: Uuid) -> Result<Option<order::Model>, ServiceError> {
        order::Entity::find_by_id(id)
            .one(&*self.db)
            .await
            .map_err(|e| {
                error!(error = %e, order_id = %id, "Failed to fetch order");
                ServiceError::DatabaseError(e)
            })
    }

    #[instrument(skip(self, patch), fields(order_id = %id))]
    async fn update_order(
        &self,
        id: Uuid,
        patch: OrderPatch,
    ) -> Result<order::Model, ServiceError> {
        let existing = self
            .get_order(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", id)))?;

        let mut active: order::ActiveModel = existing.into();
        if let Some(status) = patch.status {
            active.status = Set(status);
        }
        if let Some(payment_status) = patch.payment_status {
            active.payment_status = Set(payment_status);
        }
        if let Some(gateway_order_id) = patch.gateway_order_id {
            active.gateway_order_id = Set(Some(gateway_order_id));
        }
        if let Some(gateway_payment_id) = patch.gateway_payment_id {
            active.gateway_payment_id = Set(Some(gateway_payment_id));
        }
        if let Some(gateway_signature) = patch.gateway_signature {
            active.gateway_signature = Set(Some(gateway_signature));
        }

        active.update(&*self.db).await.map_err(|e| {
            error!(error = %e, order_id = %id, "Failed to update order");
            ServiceError::DatabaseError(e)
        })
    }

    async fn list_order_items(
        &self,
        order_id: Uuid,
    ) -> Result<Vec<order_item::Model>, ServiceError> {
        order_item::Entity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .order_by_asc(order_item::Column::CreatedAt)
            .all(&*self.db)
            .await
            .map_err(|e| {
                error!(error = %e, order_id = %order_id, "Failed to list order items");
                ServiceError::DatabaseError(e)
            })
    }

    async fn list_orders_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<order::Model>, ServiceError> {
        order::Entity::find()
            .filter(order::Column::UserId.eq(user_id))
            .order_by_desc(order::Column::CreatedAt)
            .all(&*self.db)
            .await
            .map_err(|e| {
                error!(error = %e, user_id = %user_id, "Failed to list orders for user");
                ServiceError::DatabaseError(e)
            })
    }

    #[instrument(skip(self))]
    async fn next_order_number(&self) -> Result<Option<String>, ServiceError> {
        let txn = match self.db.begin().await {
            Ok(txn) => txn,
            Err(e) => {
                error!(error = %e, "Order number generator unavailable (begin)");
                return Ok(None);
            }
        };

        let updated = order_counter::Entity::update_many()
            .col_expr(
                order_counter::Column::LastValue,
                Expr::col(order_counter::Column::LastValue).add(1),
            )
            .filter(order_counter::Column::Id.eq(1))
            .exec(&txn)
            .await;

        let updated = match updated {
            Ok(result) => result,
            Err(e) => {
                error!(error = %e, "Order number generator unavailable (update)");
                return Ok(None);
            }
        };
        if updated.rows_affected == 0 {
            error!("Order number counter row missing");
            return Ok(None);
        }

        let counter = match order_counter::Entity::find_by_id(1).one(&txn).await {
            Ok(Some(counter)) => counter,
            Ok(None) => {
                error!("Order number counter row missing after update");
                return Ok(None);
            }
            Err(e) => {
                error!(error = %e, "Order number generator unavailable (read)");
                return Ok(None);
            }
        };

        if let Err(e) = txn.commit().await {
            error!(error = %e, "Order number generator unavailable (commit)");
            return Ok(None);
        }

        Ok(Some(format!("ORD-{:08}", counter.last_value)))
    }
}
