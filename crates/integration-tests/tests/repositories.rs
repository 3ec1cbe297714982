//! Cross-repository behavior on the scripted driver.
//!
//! These tests go through the public repository API only and check the
//! guarantees every repository shares: connections are always released,
//! composite writes are all-or-nothing, cancellation rolls back, and
//! storage failures keep their class.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use mercato_core::{
    AddressId, CountryId, CurrencyCode, OrderId, OrderStatus, Price, ProductId, UserId,
};
use mercato_db::models::{NewAddress, NewOrder, NewOrderLine};
use mercato_db::repositories::{AddressRepository, CountryRepository, OrderRepository, Page};
use mercato_db::row::{Row, columns};
use mercato_db::testing::{Event, Failure, ScriptedDatabase};
use mercato_db::{CancelSignal, RepositoryError, Value};

fn order_with_lines(count: i32) -> NewOrder {
    NewOrder {
        user_id: UserId::generate(),
        address_id: AddressId::generate(),
        currency: CurrencyCode::EUR,
        lines: (1..=count)
            .map(|product| NewOrderLine {
                product_id: ProductId::new(product),
                quantity: 1,
                unit_price: Price::from_cents(500, CurrencyCode::EUR),
            })
            .collect(),
    }
}

fn script_order_id(db: &ScriptedDatabase) {
    db.respond(
        "nextval",
        vec![Row::new(columns(["id"]), vec![Value::Int(77)])],
    );
}

fn acquires_and_closes_balance(events: &[Event]) -> bool {
    let acquired = events.iter().filter(|e| **e == Event::Acquire).count();
    let closed = events.iter().filter(|e| **e == Event::Close).count();
    acquired == closed
}

#[tokio::test]
async fn test_address_and_link_are_one_write() {
    let db = ScriptedDatabase::new();
    db.fail_on("INSERT INTO shop.user_address", Failure::Conflict);

    let err = AddressRepository::new(&db)
        .create_for_user(
            UserId::generate(),
            NewAddress {
                street: "Via Roma 1".to_owned(),
                city: "Torino".to_owned(),
                region: Some("TO".to_owned()),
                zip: "10121".to_owned(),
                country_id: CountryId::new(3),
            },
            true,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, RepositoryError::Conflict(_)));
    assert!(db.committed_matching("shop.address").is_empty());

    let events = db.events();
    assert!(events.contains(&Event::Rollback));
    assert!(!events.contains(&Event::Commit));
    assert!(acquires_and_closes_balance(&events));
}

#[tokio::test]
async fn test_cancel_mid_order_rolls_back() {
    let db = ScriptedDatabase::new();
    script_order_id(&db);
    let cancel = CancelSignal::new();
    db.cancel_after("INSERT INTO shop.orders", cancel.clone());

    let err = OrderRepository::new(&db)
        .with_cancel(cancel)
        .create(order_with_lines(3))
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
    assert!(db.committed().is_empty());

    let events = db.events();
    let line_inserts = events
        .iter()
        .filter(|e| matches!(e, Event::Execute(sql) if sql.contains("shop.order_line")))
        .count();
    assert_eq!(line_inserts, 0);
    assert!(events.contains(&Event::Rollback));
    assert!(acquires_and_closes_balance(&events));
}

#[tokio::test]
async fn test_cancelled_before_start_does_nothing() {
    let db = ScriptedDatabase::new();
    let cancel = CancelSignal::new();
    cancel.cancel();

    let err = CountryRepository::new(&db)
        .with_cancel(cancel)
        .list(Page::default())
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
    assert!(db.events().is_empty());
}

#[tokio::test]
async fn test_reads_release_their_connection() {
    let db = ScriptedDatabase::new();
    let countries = CountryRepository::new(&db);
    let orders = OrderRepository::new(&db);

    countries.list(Page::default()).await.unwrap();
    assert!(orders.get(OrderId::new(1)).await.unwrap().is_none());
    assert!(countries.get(CountryId::new(1)).await.unwrap().is_none());

    let events = db.events();
    assert_eq!(events.last(), Some(&Event::Close));
    assert!(acquires_and_closes_balance(&events));
}

#[tokio::test]
async fn test_storage_failures_keep_their_class() {
    let db = ScriptedDatabase::new();
    db.fail_acquire(Failure::Unavailable);

    let read = OrderRepository::new(&db).get(OrderId::new(1)).await.unwrap_err();
    assert!(read.is_unavailable());

    let write = OrderRepository::new(&db)
        .update_status(OrderId::new(1), OrderStatus::Delivered)
        .await
        .unwrap_err();
    assert!(write.is_unavailable());
    assert!(write.is_retryable());
}

#[tokio::test]
async fn test_failed_commit_publishes_nothing() {
    let db = ScriptedDatabase::new();
    script_order_id(&db);
    db.fail_commit(Failure::Unavailable);

    let err = OrderRepository::new(&db)
        .create(order_with_lines(2))
        .await
        .unwrap_err();

    assert!(err.is_unavailable());
    assert!(db.committed().is_empty());
    assert!(db.events().contains(&Event::Rollback));
}
