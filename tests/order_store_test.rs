//! SeaORM store adapter tests against in-memory SQLite.

mod common;

use common::test_db;
use rust_decimal_macros::dec;
use std::sync::Arc;
use storefront_api::store::{NewOrder, NewOrderItem, OrderPatch, OrderStore, SeaOrmOrderStore};
use uuid::Uuid;

fn new_order(order_number: &str, user_id: Option<Uuid>) -> NewOrder {
    NewOrder {
        order_number: order_number.to_string(),
        user_id,
        status: "pending_payment".into(),
        payment_method: "gateway".into(),
        payment_status: "pending".into(),
        customer_name: "Asha Rao".into(),
        customer_email: "asha@example.com".into(),
        customer_phone: "+919800000000".into(),
        shipping_address: "12 MG Road".into(),
        shipping_city: "Bengaluru".into(),
        shipping_state: "Karnataka".into(),
        shipping_pincode: "560001".into(),
        shipping_country: "India".into(),
        subtotal: dec!(100),
        tax: dec!(0),
        shipping_cost: dec!(0),
        total_amount: dec!(100),
        special_instructions: None,
    }
}

fn new_item(order_id: Uuid, product_id: &str) -> NewOrderItem {
    NewOrderItem {
        order_id,
        product_id: product_id.to_string(),
        product_name: "Handcrafted Wall Clock".into(),
        product_image: None,
        size: "12in".into(),
        quantity: 1,
        unit_price: dec!(100),
        total_price: dec!(100),
    }
}

#[tokio::test]
async fn order_numbers_are_sequential_and_unique() {
    let store = SeaOrmOrderStore::new(Arc::new(test_db().await));

    let first = store.next_order_number().await.unwrap().unwrap();
    let second = store.next_order_number().await.unwrap().unwrap();
    let third = store.next_order_number().await.unwrap().unwrap();

    assert_eq!(first, "ORD-00000001");
    assert_eq!(second, "ORD-00000002");
    assert_eq!(third, "ORD-00000003");
}

#[tokio::test]
async fn create_get_and_delete_round_trip() {
    let store = SeaOrmOrderStore::new(Arc::new(test_db().await));

    let created = store.create_order(new_order("ORD-00000010", None)).await.unwrap();
    assert_eq!(created.order_number, "ORD-00000010");
    assert_eq!(created.total_amount, dec!(100));

    let fetched = store.get_order(created.id).await.unwrap().unwrap();
    assert_eq!(fetched.id, created.id);

    store.delete_order(created.id).await.unwrap();
    assert!(store.get_order(created.id).await.unwrap().is_none());
}

#[tokio::test]
async fn items_are_created_in_a_batch_and_listed_by_order() {
    let store = SeaOrmOrderStore::new(Arc::new(test_db().await));
    let order = store.create_order(new_order("ORD-00000011", None)).await.unwrap();

    let items = store
        .create_order_items(vec![
            new_item(order.id, "prod-1"),
            new_item(order.id, "prod-2"),
        ])
        .await
        .unwrap();
    assert_eq!(items.len(), 2);

    let listed = store.list_order_items(order.id).await.unwrap();
    assert_eq!(listed.len(), 2);
    let product_ids: Vec<&str> = listed.iter().map(|i| i.product_id.as_str()).collect();
    assert!(product_ids.contains(&"prod-1"));
    assert!(product_ids.contains(&"prod-2"));
}

#[tokio::test]
async fn update_patch_touches_only_set_fields() {
    let store = SeaOrmOrderStore::new(Arc::new(test_db().await));
    let order = store.create_order(new_order("ORD-00000012", None)).await.unwrap();

    let updated = store
        .update_order(
            order.id,
            OrderPatch {
                gateway_order_id: Some("gw_1".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.gateway_order_id.as_deref(), Some("gw_1"));
    assert_eq!(updated.status, "pending_payment");
    assert_eq!(updated.payment_status, "pending");
    assert_eq!(updated.total_amount, dec!(100));

    let updated = store
        .update_order(
            order.id,
            OrderPatch {
                status: Some("confirmed".into()),
                payment_status: Some("completed".into()),
                gateway_payment_id: Some("pay_1".into()),
                gateway_signature: Some("sig_1".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.status, "confirmed");
    assert_eq!(updated.payment_status, "completed");
    assert_eq!(updated.gateway_order_id.as_deref(), Some("gw_1"));
    assert_eq!(updated.gateway_signature.as_deref(), Some("sig_1"));
}

#[tokio::test]
async fn update_unknown_order_is_not_found() {
    let store = SeaOrmOrderStore::new(Arc::new(test_db().await));
    let result = store
        .update_order(Uuid::new_v4(), OrderPatch::default())
        .await;
    assert!(matches!(
        result,
        Err(storefront_api::errors::ServiceError::NotFound(_))
    ));
}

#[tokio::test]
async fn user_listing_is_scoped_and_newest_first() {
    let store = SeaOrmOrderStore::new(Arc::new(test_db().await));
    let user = Uuid::new_v4();

    store
        .create_order(new_order("ORD-00000013", Some(user)))
        .await
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    store
        .create_order(new_order("ORD-00000014", Some(user)))
        .await
        .unwrap();
    store.create_order(new_order("ORD-00000015", None)).await.unwrap();

    let orders = store.list_orders_for_user(user).await.unwrap();
    assert_eq!(orders.len(), 2);
    assert_eq!(orders[0].order_number, "ORD-00000014");
    assert_eq!(orders[1].order_number, "ORD-00000013");
}
