//! End-to-end tests against PostgreSQL.
//!
//! Every test returns early when `TEST_DATABASE_URL` is unset.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use mercato_core::{CurrencyCode, OrderStatus, PaymentMethod, PaymentStatus, Price, UserId};
use mercato_db::models::{NewOrder, NewOrderLine, NewPayment, NewPaymentProvider, NewPaymentSystem};
use mercato_db::repositories::{
    AddressRepository, OrderRepository, Page, PaymentProviderRepository, PaymentRepository,
    UserPaymentSystemRepository, UserRepository,
};
use mercato_db::RepositoryError;
use mercato_integration_tests::{
    new_address, postgres, test_country, test_products, test_user, unique,
};

async fn count(db: &mercato_db::PgDatabase, sql: &str, value: &str) -> i64 {
    sqlx::query_scalar(sql)
        .bind(value)
        .fetch_one(db.pool())
        .await
        .unwrap()
}

#[tokio::test]
async fn test_failed_link_leaves_no_address() {
    let Some(db) = postgres().await else { return };
    let country = test_country(&db).await;
    let street = format!("Nowhere {}", unique());

    // The junction insert violates its foreign key: the user does not exist.
    let err = AddressRepository::new(&db)
        .create_for_user(UserId::generate(), new_address(country, &street), true)
        .await
        .unwrap_err();

    assert!(matches!(err, RepositoryError::Conflict(_)));
    let stored = count(&db, "SELECT count(*) FROM shop.address WHERE street = $1", &street).await;
    assert_eq!(stored, 0);
}

#[tokio::test]
async fn test_user_round_trip() {
    let Some(db) = postgres().await else { return };
    let country = test_country(&db).await;
    let user = test_user(&db, Some(new_address(country, "Main Street 1"))).await;

    let addresses = AddressRepository::new(&db);
    addresses
        .create_for_user(user.id, new_address(country, "Second Street 2"), false)
        .await
        .unwrap();

    let loaded = UserRepository::new(&db).get(user.id).await.unwrap().unwrap();
    assert_eq!(loaded.username, user.username);
    assert_eq!(loaded.addresses.len(), 2);
    let default = loaded.default_address().unwrap();
    assert_eq!(default.street, "Main Street 1");
    assert_eq!(default.country.as_ref().unwrap().iso2, "ZZ");

    let by_email = UserRepository::new(&db)
        .get_by_email(&user.email)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(by_email.id, user.id);
}

#[tokio::test]
async fn test_replace_address_keeps_default_and_old_row() {
    let Some(db) = postgres().await else { return };
    let country = test_country(&db).await;
    let user = test_user(&db, Some(new_address(country, "Old Road 1"))).await;
    let old = user.addresses[0].address.id;

    let replaced = AddressRepository::new(&db)
        .replace_for_user(user.id, old, new_address(country, "New Road 2"))
        .await
        .unwrap();
    assert!(replaced.is_default);

    let linked = AddressRepository::new(&db)
        .list_for_user(user.id, Page::default())
        .await
        .unwrap();
    assert_eq!(linked.len(), 1);
    assert_eq!(linked[0].address.id, replaced.address.id);
    assert!(AddressRepository::new(&db).get(old).await.unwrap().is_some());
}

#[tokio::test]
async fn test_order_lifecycle() {
    let Some(db) = postgres().await else { return };
    let country = test_country(&db).await;
    let user = test_user(&db, Some(new_address(country, "Order Lane 3"))).await;
    let (_, products) = test_products(&db, &[1250, 500]).await;

    let orders = OrderRepository::new(&db);
    let placed = orders
        .create(NewOrder {
            user_id: user.id,
            address_id: user.addresses[0].address.id,
            currency: CurrencyCode::EUR,
            lines: vec![
                NewOrderLine {
                    product_id: products[0].id,
                    quantity: 2,
                    unit_price: products[0].price,
                },
                NewOrderLine {
                    product_id: products[1].id,
                    quantity: 1,
                    unit_price: products[1].price,
                },
            ],
        })
        .await
        .unwrap();
    assert_eq!(placed.total, Price::from_cents(3000, CurrencyCode::EUR));

    let provider = PaymentProviderRepository::new(&db)
        .create(NewPaymentProvider {
            name: format!("provider-{}", unique()),
            active: true,
        })
        .await
        .unwrap();
    let system = UserPaymentSystemRepository::new(&db)
        .create(NewPaymentSystem {
            user_id: user.id,
            provider_id: provider.id,
            reference: format!("tok_{}", unique()),
            is_default: true,
        })
        .await
        .unwrap();
    let payments = PaymentRepository::new(&db);
    let payment = payments
        .create(NewPayment {
            order_id: placed.id,
            payment_system_id: system.id,
            amount: placed.total,
            method: PaymentMethod::Card,
        })
        .await
        .unwrap();
    payments
        .update_status(payment.id, PaymentStatus::Completed)
        .await
        .unwrap();

    orders.update_status(placed.id, OrderStatus::Shipped).await.unwrap();

    let loaded = orders.get(placed.id).await.unwrap().unwrap();
    assert_eq!(loaded.status, OrderStatus::Shipped);
    assert!(loaded.shipped_at.is_some());
    assert_eq!(loaded.lines.len(), 2);
    assert!(loaded.lines.iter().all(|l| l.product.is_some()));
    assert_eq!(loaded.payments.len(), 1);
    assert_eq!(loaded.payments[0].status, PaymentStatus::Completed);
    assert!(loaded.payments[0].paid_at.is_some());

    let listed = orders.list_for_user(user.id, Page::new(1, 0)).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].lines.len(), 2);

    let by_provider = PaymentProviderRepository::new(&db)
        .get(provider.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(by_provider.payments.len(), 1);

    let by_system = UserPaymentSystemRepository::new(&db)
        .get(system.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(by_system.payments.len(), 1);
    assert_eq!(by_system.payments[0].id, payment.id);
}

#[tokio::test]
async fn test_order_for_unknown_product_stores_nothing() {
    let Some(db) = postgres().await else { return };
    let country = test_country(&db).await;
    let user = test_user(&db, Some(new_address(country, "Ghost Avenue 4"))).await;

    let err = OrderRepository::new(&db)
        .create(NewOrder {
            user_id: user.id,
            address_id: user.addresses[0].address.id,
            currency: CurrencyCode::EUR,
            lines: vec![NewOrderLine {
                product_id: mercato_core::ProductId::new(i32::MAX),
                quantity: 1,
                unit_price: Price::from_cents(100, CurrencyCode::EUR),
            }],
        })
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::Conflict(_)));

    let listed = OrderRepository::new(&db)
        .list_for_user(user.id, Page::default())
        .await
        .unwrap();
    assert!(listed.is_empty());
}

#[tokio::test]
async fn test_delete_user_removes_unshared_addresses() {
    let Some(db) = postgres().await else { return };
    let country = test_country(&db).await;
    let street = format!("Farewell {}", unique());
    let user = test_user(&db, Some(new_address(country, &street))).await;

    UserRepository::new(&db).delete(user.id).await.unwrap();

    assert!(UserRepository::new(&db).get(user.id).await.unwrap().is_none());
    let stored = count(&db, "SELECT count(*) FROM shop.address WHERE street = $1", &street).await;
    assert_eq!(stored, 0);

    let again = UserRepository::new(&db).delete(user.id).await.unwrap_err();
    assert!(matches!(again, RepositoryError::NotFound));
}
