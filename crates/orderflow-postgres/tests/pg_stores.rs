//! Store-level integration tests against a real PostgreSQL database.
//!
//! Run with: DATABASE_URL="postgresql:///orderflow_test" cargo test -p orderflow-postgres -- --ignored

use chrono::{Duration, Utc};
use orderflow_core::codes::{format_code, CodeKind};
use orderflow_core::error::OrderFlowError;
use orderflow_core::model::*;
use orderflow_core::ports::*;
use orderflow_core::status::*;
use orderflow_postgres::{migrate, PgStores};
use rust_decimal::Decimal;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

async fn pool() -> PgPool {
    let database_url =
        std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for integration tests");
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("failed to connect to test database");
    migrate(&pool).await.expect("migrations failed");
    pool
}

async fn seed_client(stores: &PgStores) -> Client {
    let client = Client {
        id: Uuid::new_v4(),
        name: "Ferreteria Sol".into(),
        tax_id: format!("NIT-{}", Uuid::new_v4()),
        email: None,
        phone: None,
        address: None,
        created_at: Utc::now(),
    };
    stores.clients.create(&client).await.unwrap();
    client
}

fn purchase_order(client_id: Uuid, code: String) -> PurchaseOrder {
    let items = vec![
        LineItem::new("T-1", "Tornillo", 2, Decimal::new(250, 0), None).unwrap(),
        LineItem::new("X-9", "Caja", 1, Decimal::new(995, 1), None).unwrap(),
    ];
    let now = Utc::now();
    PurchaseOrder {
        id: Uuid::new_v4(),
        code,
        client_id,
        total: order_total(&items).unwrap(),
        currency: "COP".into(),
        status: PurchaseOrderStatus::Received,
        origin: OrderOrigin::Manual,
        notes: None,
        archive_id: None,
        created_by: Uuid::new_v4(),
        items,
        created_at: now,
        updated_at: now,
    }
}

fn unique_year() -> i32 {
    3000 + (Uuid::new_v4().as_u128() % 5000) as i32
}

#[tokio::test]
#[ignore] // requires DATABASE_URL
async fn sequence_seeds_from_existing_codes() {
    let stores = PgStores::new(pool().await);
    let client = seed_client(&stores).await;
    let year = unique_year();
    for seq in 1..=4 {
        let order = purchase_order(client.id, format_code(CodeKind::PurchaseOrder, year, seq));
        stores.purchase_orders.create(&order).await.unwrap();
    }
    let next = stores.codes.next_value(CodeKind::PurchaseOrder, year).await.unwrap();
    assert_eq!(format_code(CodeKind::PurchaseOrder, year, next), format!("OC-{year}-00005"));
    assert_eq!(stores.codes.next_value(CodeKind::PurchaseOrder, year).await.unwrap(), 6);
}

#[tokio::test]
#[ignore]
async fn order_roundtrip_and_duplicate_code() {
    let stores = PgStores::new(pool().await);
    let client = seed_client(&stores).await;
    let code = format_code(CodeKind::PurchaseOrder, unique_year(), 1);
    let order = purchase_order(client.id, code.clone());
    stores.purchase_orders.create(&order).await.unwrap();

    let loaded = stores.purchase_orders.get(order.id).await.unwrap().unwrap();
    assert_eq!(loaded.items, order.items);
    assert_eq!(loaded.total, order.total);
    assert!(stores.purchase_orders.code_exists(&code).await.unwrap());

    let err = stores
        .purchase_orders
        .create(&purchase_order(client.id, code))
        .await
        .unwrap_err();
    assert!(matches!(err, OrderFlowError::DuplicateCode(_)));
}

#[tokio::test]
#[ignore]
async fn status_update_is_compare_and_set() {
    let stores = PgStores::new(pool().await);
    let client = seed_client(&stores).await;
    let order = purchase_order(client.id, format_code(CodeKind::PurchaseOrder, unique_year(), 1));
    stores.purchase_orders.create(&order).await.unwrap();

    let updated = stores
        .purchase_orders
        .update_status(order.id, PurchaseOrderStatus::Received, PurchaseOrderStatus::Processing)
        .await
        .unwrap();
    assert_eq!(updated.status, PurchaseOrderStatus::Processing);

    let err = stores
        .purchase_orders
        .update_status(order.id, PurchaseOrderStatus::Received, PurchaseOrderStatus::Voided)
        .await
        .unwrap_err();
    assert!(matches!(err, OrderFlowError::Conflict(_)));
}

#[tokio::test]
#[ignore]
async fn one_shipment_per_sales_order_and_event_overwrites_status() {
    let stores = PgStores::new(pool().await);
    let client = seed_client(&stores).await;
    let year = unique_year();
    let now = Utc::now();
    let sales_order = SalesOrder {
        id: Uuid::new_v4(),
        code: format_code(CodeKind::SalesOrder, year, 1),
        client_id: client.id,
        purchase_order_id: None,
        total: Decimal::new(500, 0),
        currency: "COP".into(),
        status: SalesOrderStatus::Dispatching,
        notes: None,
        created_by: Uuid::new_v4(),
        items: vec![LineItem::new("T-1", "Tornillo", 2, Decimal::new(250, 0), None).unwrap()],
        created_at: now,
        updated_at: now,
    };
    stores.sales_orders.create(&sales_order).await.unwrap();

    let shipment_id = Uuid::new_v4();
    let shipment = |id: Uuid, seq: i64| Shipment {
        id,
        code: format_code(CodeKind::Shipment, year, seq),
        sales_order_id: sales_order.id,
        client_id: client.id,
        carrier: "DHL".into(),
        status: ShipmentStatus::Preparing,
        departure_date: None,
        estimated_arrival: None,
        events: vec![ShipmentEvent {
            id: Uuid::new_v4(),
            shipment_id: id,
            occurred_at: now,
            location: "Bodega".into(),
            status: ShipmentStatus::Preparing,
            comment: None,
            created_at: now,
        }],
        created_at: now,
        updated_at: now,
    };
    stores.shipments.create(&shipment(shipment_id, 1)).await.unwrap();
    let err = stores
        .shipments
        .create(&shipment(Uuid::new_v4(), 2))
        .await
        .unwrap_err();
    assert!(matches!(err, OrderFlowError::Conflict(_)));

    let delivered = ShipmentEvent {
        id: Uuid::new_v4(),
        shipment_id,
        occurred_at: now + Duration::hours(1),
        location: "Medellín".into(),
        status: ShipmentStatus::Delivered,
        comment: None,
        created_at: Utc::now(),
    };
    let updated = stores.shipments.append_event(&delivered).await.unwrap();
    assert_eq!(updated.status, ShipmentStatus::Delivered);
    assert_eq!(updated.events.len(), 2);
    assert_eq!(updated.client_id, client.id);

    let backdated = ShipmentEvent {
        id: Uuid::new_v4(),
        occurred_at: now - Duration::days(1),
        status: ShipmentStatus::OnHold,
        ..delivered
    };
    let updated = stores.shipments.append_event(&backdated).await.unwrap();
    assert_eq!(updated.status, ShipmentStatus::OnHold);
    assert_eq!(updated.events[0].status, ShipmentStatus::OnHold);
    assert_eq!(updated.events.len(), 3);
}

#[tokio::test]
#[ignore]
async fn master_data_update_filter_and_referenced_delete() {
    let stores = PgStores::new(pool().await);
    let client = seed_client(&stores).await;

    let tag = Uuid::new_v4().simple().to_string();
    let product = |sku: String, active: bool| Product {
        id: Uuid::new_v4(),
        sku,
        name: format!("Caja {tag}"),
        description: None,
        unit_price: Decimal::new(1250, 2),
        active,
        created_at: Utc::now(),
    };
    let linked = product(format!("L-{tag}"), true);
    let retired = product(format!("R-{tag}"), false);
    stores.products.create(&linked).await.unwrap();
    stores.products.create(&retired).await.unwrap();

    let filter = ProductFilter {
        search: Some(tag.to_uppercase()),
        active: Some(true),
        ..Default::default()
    };
    let listed = stores.products.list(&filter).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, linked.id);

    let dup = Product { sku: linked.sku.clone(), ..retired.clone() };
    assert!(matches!(
        stores.products.update(&dup).await.unwrap_err(),
        OrderFlowError::Conflict(_)
    ));

    let mut order = purchase_order(client.id, format!("OC-T-{tag}"));
    order.items[0].product_id = Some(linked.id);
    stores.purchase_orders.create(&order).await.unwrap();

    assert!(matches!(
        stores.products.delete(linked.id).await.unwrap_err(),
        OrderFlowError::Conflict(_)
    ));
    assert!(matches!(
        stores.clients.delete(client.id).await.unwrap_err(),
        OrderFlowError::Conflict(_)
    ));
    stores.products.delete(retired.id).await.unwrap();
    assert!(matches!(
        stores.products.delete(retired.id).await.unwrap_err(),
        OrderFlowError::NotFound(_)
    ));

    let renamed = Client { name: "Ferreteria Luna".into(), ..client.clone() };
    stores.clients.update(&renamed).await.unwrap();
    assert_eq!(
        stores.clients.get(client.id).await.unwrap().unwrap().name,
        "Ferreteria Luna"
    );
}
