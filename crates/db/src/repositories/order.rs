//! Order repository.
//!
//! An order row joins its lines (each with its product) and its payments in
//! one query. Lines and payments are independent collections, so the join
//! emits `lines × payments` rows per order; hydration folds them back.

use chrono::{DateTime, Utc};
use mercato_core::{OrderId, OrderStatus, UserId};
use tracing::{info, instrument};

use super::{Page, reserve_id};
use crate::cancel::CancelSignal;
use crate::connection::{Database, Statement};
use crate::error::RepositoryError;
use crate::hydrate::{Key, Shape, group_at, uuid_key};
use crate::models::{NewOrder, Order, OrderLine, Payment, Product};
use crate::read::{fetch_all, fetch_optional};
use crate::row::{FieldGroup, HydrateError};
use crate::unit_of_work::{Expect, UnitOfWork};

const SELECT_TREE: &str = r"
SELECT o.id, o.user_id, o.address_id, o.total, o.currency, o.status, o.created_at,
       o.shipped_at, o.delivered_at, o.returned_at, o.cancelled_at,
       l.order_id, l.product_id, l.quantity, l.unit_price,
       p.id, p.category_id, p.code, p.name, p.price, p.currency, p.stock,
       pay.id, pay.order_id, pay.payment_system_id, pay.amount, pay.currency, pay.method,
       pay.status, pay.created_at, pay.paid_at, pay.refunded_at
";

const JOIN_CHILDREN: &str = r"
LEFT JOIN shop.order_line l ON l.order_id = o.id
LEFT JOIN shop.product p ON p.id = l.product_id
LEFT JOIN shop.payment pay ON pay.order_id = o.id
";

const INSERT_ORDER: &str = r"
INSERT INTO shop.orders (id, user_id, address_id, total, currency, status, created_at)
VALUES ($1, $2, $3, $4, $5, $6, $7)
";

const INSERT_LINE: &str = r"
INSERT INTO shop.order_line (order_id, product_id, quantity, unit_price)
VALUES ($1, $2, $3, $4)
";

const DELETE_PAYMENTS: &str = "DELETE FROM shop.payment WHERE order_id = $1";
const DELETE_LINES: &str = "DELETE FROM shop.order_line WHERE order_id = $1";
const DELETE_ORDER: &str = "DELETE FROM shop.orders WHERE id = $1";

fn get_sql() -> String {
    format!(
        "{SELECT_TREE}FROM shop.orders o{JOIN_CHILDREN}WHERE o.id = $1\n\
         ORDER BY l.product_id, pay.created_at, pay.id"
    )
}

fn list_for_user_sql() -> String {
    format!(
        "WITH page AS (\n\
         SELECT id, created_at FROM shop.orders WHERE user_id = $1\n\
         ORDER BY created_at DESC, id DESC LIMIT $2 OFFSET $3\n\
         ){SELECT_TREE}FROM page\n\
         JOIN shop.orders o ON o.id = page.id{JOIN_CHILDREN}\
         ORDER BY o.created_at DESC, o.id DESC, l.product_id, pay.created_at, pay.id"
    )
}

/// SQL that sets a status together with its paired timestamp, if any.
fn status_sql(status: OrderStatus) -> String {
    status.timestamp_column().map_or_else(
        || "UPDATE shop.orders SET status = $1 WHERE id = $2".to_owned(),
        |column| format!("UPDATE shop.orders SET status = $1, {column} = $2 WHERE id = $3"),
    )
}

fn line_key(group: &FieldGroup<'_>) -> Result<Option<Key>, HydrateError> {
    let order: Option<i64> = group.get("order_id")?;
    let product: Option<i64> = group.get("product_id")?;
    Ok(order.zip(product).map(|(o, p)| Key::pair(o, p)))
}

fn attach_line(order: &mut Order, groups: &[FieldGroup<'_>]) -> Result<(), HydrateError> {
    let mut line = OrderLine::from_group(group_at(groups, 1, "lines")?, order.total.currency_code)?;
    let product = group_at(groups, 2, "lines")?;
    if !product.is_null("id") {
        line.product = Some(Product::from_group(product)?);
    }
    order.lines.push(line);
    Ok(())
}

fn payment_key(group: &FieldGroup<'_>) -> Result<Option<Key>, HydrateError> {
    uuid_key(group, "id")
}

fn attach_payment(order: &mut Order, groups: &[FieldGroup<'_>]) -> Result<(), HydrateError> {
    order
        .payments
        .push(Payment::from_group(group_at(groups, 3, "payments")?)?);
    Ok(())
}

fn order_shape() -> Shape<Order> {
    Shape::joined("order", &["order_id", "id", "id"])
        .nest("lines", 1, line_key, attach_line)
        .nest("payments", 3, payment_key, attach_payment)
}

/// Repository for orders.
pub struct OrderRepository<'a, D: Database> {
    db: &'a D,
    cancel: CancelSignal,
}

impl<'a, D: Database> OrderRepository<'a, D> {
    /// Create a new order repository.
    #[must_use]
    pub fn new(db: &'a D) -> Self {
        Self {
            db,
            cancel: CancelSignal::never(),
        }
    }

    /// Abort operations when `cancel` fires.
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    /// Get an order with its lines, their products, and its payments.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the query fails or a row does not decode.
    #[instrument(skip(self), fields(order_id = %id))]
    pub async fn get(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let stmt = Statement::new(get_sql()).bind(id);
        fetch_optional(self.db, &self.cancel, &stmt, &order_shape()).await
    }

    /// List a user's orders, newest first, each fully loaded.
    ///
    /// The page applies to orders, not to joined rows.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the query fails or a row does not decode.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn list_for_user(
        &self,
        user_id: UserId,
        page: Page,
    ) -> Result<Vec<Order>, RepositoryError> {
        let stmt = Statement::new(list_for_user_sql())
            .bind(user_id)
            .bind(page.limit)
            .bind(page.offset);
        fetch_all(self.db, &self.cancel, &stmt, &order_shape()).await
    }

    /// Place an order: the header and every line in one transaction.
    ///
    /// The order id is reserved from its sequence first. New orders start
    /// as [`OrderStatus::Pending`] with a total summed from the lines.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the order has no lines, a line
    /// is priced in another currency, or a referenced row does not exist.
    #[instrument(skip(self, order), fields(user_id = %order.user_id, lines = order.lines.len()))]
    pub async fn create(&self, order: NewOrder) -> Result<Order, RepositoryError> {
        if order.lines.is_empty() {
            return Err(RepositoryError::Conflict("order has no lines".to_owned()));
        }
        let total = order.total().ok_or_else(|| {
            RepositoryError::Conflict(format!(
                "order lines must all be priced in {}",
                order.currency.as_str()
            ))
        })?;

        let id = OrderId::new(reserve_id(self.db, &self.cancel, "shop.orders_id_seq").await?);
        let created_at = Utc::now();

        let header = Statement::new(INSERT_ORDER)
            .bind(id)
            .bind(order.user_id)
            .bind(order.address_id)
            .bind(total.amount)
            .bind(total.currency_code.as_str())
            .bind(OrderStatus::Pending.as_str())
            .bind(created_at);
        let lines = order.lines.iter().map(|line| {
            Statement::new(INSERT_LINE)
                .bind(id)
                .bind(line.product_id)
                .bind(line.quantity)
                .bind(line.unit_price.amount)
        });

        UnitOfWork::new("create_order")
            .then(header)
            .then_all(lines)
            .run(self.db, &self.cancel)
            .await?;

        info!(order_id = %id, total = %total.amount, "order placed");

        Ok(Order {
            id,
            user_id: order.user_id,
            address_id: order.address_id,
            total,
            status: OrderStatus::Pending,
            created_at,
            shipped_at: None,
            delivered_at: None,
            returned_at: None,
            cancelled_at: None,
            lines: order
                .lines
                .into_iter()
                .map(|line| OrderLine {
                    order_id: id,
                    product_id: line.product_id,
                    quantity: line.quantity,
                    unit_price: line.unit_price,
                    product: None,
                })
                .collect(),
            payments: Vec::new(),
        })
    }

    /// Move an order to `status`, writing the paired timestamp (such as
    /// `shipped_at`) in the same statement.
    ///
    /// Whether the transition is allowed is the caller's decision. Returns
    /// the time recorded.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the order does not exist.
    #[instrument(skip(self), fields(order_id = %id, status = status.as_str()))]
    pub async fn update_status(
        &self,
        id: OrderId,
        status: OrderStatus,
    ) -> Result<DateTime<Utc>, RepositoryError> {
        let at = Utc::now();
        let mut stmt = Statement::new(status_sql(status)).bind(status.as_str());
        if status.timestamp_column().is_some() {
            stmt = stmt.bind(at);
        }
        stmt = stmt.bind(id);

        UnitOfWork::new("update_order_status")
            .then_expect(stmt, Expect::Exactly(1))
            .run(self.db, &self.cancel)
            .await?;

        info!(order_id = %id, status = status.as_str(), "order status changed");
        Ok(at)
    }

    /// Delete an order with its payments and lines.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the order does not exist.
    #[instrument(skip(self), fields(order_id = %id))]
    pub async fn delete(&self, id: OrderId) -> Result<(), RepositoryError> {
        UnitOfWork::new("delete_order")
            .then(Statement::new(DELETE_PAYMENTS).bind(id))
            .then(Statement::new(DELETE_LINES).bind(id))
            .then_expect(Statement::new(DELETE_ORDER).bind(id), Expect::Exactly(1))
            .run(self.db, &self.cancel)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use chrono::TimeZone;
    use mercato_core::{
        AddressId, CurrencyCode, PaymentId, PaymentSystemId, Price, ProductId,
    };
    use rust_decimal::Decimal;
    use uuid::Uuid;

    use super::*;
    use crate::models::NewOrderLine;
    use crate::row::{Row, columns};
    use crate::testing::{Event, Failure, ScriptedDatabase};
    use crate::value::{Param, Value};

    const USER: Uuid = Uuid::from_u128(10);
    const PAYMENT: Uuid = Uuid::from_u128(9);

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn tree_columns() -> Vec<&'static str> {
        vec![
            "id", "user_id", "address_id", "total", "currency", "status", "created_at",
            "shipped_at", "delivered_at", "returned_at", "cancelled_at",
            "order_id", "product_id", "quantity", "unit_price",
            "id", "category_id", "code", "name", "price", "currency", "stock",
            "id", "order_id", "payment_system_id", "amount", "currency", "method",
            "status", "created_at", "paid_at", "refunded_at",
        ]
    }

    /// One joined row of order 1 with total 10.
    fn row(line: Option<(i64, i64)>, payment: Option<Uuid>) -> Row {
        row_with_status("pending", line, payment)
    }

    fn row_with_status(status: &str, line: Option<(i64, i64)>, payment: Option<Uuid>) -> Row {
        let mut values = vec![
            Value::Int(1),
            Value::Uuid(USER),
            Value::Uuid(Uuid::from_u128(20)),
            Value::Decimal(Decimal::from(10)),
            Value::Text("EUR".to_owned()),
            Value::Text(status.to_owned()),
            Value::Timestamp(at()),
            Value::Null,
            Value::Null,
            Value::Null,
            Value::Null,
        ];
        match line {
            Some((product, quantity)) => values.extend([
                Value::Int(1),
                Value::Int(product),
                Value::Int(quantity),
                Value::Decimal(Decimal::new(250, 2)),
                Value::Int(product),
                Value::Int(3),
                Value::Text(format!("SKU-{product}")),
                Value::Text(format!("Product {product}")),
                Value::Decimal(Decimal::new(250, 2)),
                Value::Text("EUR".to_owned()),
                Value::Int(40),
            ]),
            None => values.extend(vec![Value::Null; 11]),
        }
        match payment {
            Some(id) => values.extend([
                Value::Uuid(id),
                Value::Int(1),
                Value::Uuid(Uuid::from_u128(30)),
                Value::Decimal(Decimal::from(10)),
                Value::Text("EUR".to_owned()),
                Value::Text("card".to_owned()),
                Value::Text("completed".to_owned()),
                Value::Timestamp(at()),
                Value::Timestamp(at()),
                Value::Null,
            ]),
            None => values.extend(vec![Value::Null; 10]),
        }
        Row::new(columns(tree_columns()), values)
    }

    #[tokio::test]
    async fn test_lines_and_payments_fold_independently() {
        const A: i64 = 1;
        const B: i64 = 2;
        let db = ScriptedDatabase::new();
        db.respond(
            "FROM shop.orders o",
            vec![
                row(Some((A, 2)), None),
                row(Some((B, 1)), None),
                row(Some((A, 2)), Some(PAYMENT)),
            ],
        );

        let order = OrderRepository::new(&db)
            .get(OrderId::new(1))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(order.id, OrderId::new(1));
        let lines: Vec<(ProductId, i32)> = order
            .lines
            .iter()
            .map(|l| (l.product_id, l.quantity))
            .collect();
        assert_eq!(lines, vec![(ProductId::new(1), 2), (ProductId::new(2), 1)]);
        assert_eq!(order.payments.len(), 1);
        assert_eq!(order.payments[0].id, PaymentId::new(PAYMENT));
        assert_eq!(order.lines[0].product.as_ref().unwrap().code, "SKU-1");
        assert_eq!(
            order.lines[1].unit_price,
            Price::from_cents(250, CurrencyCode::EUR)
        );
    }

    #[tokio::test]
    async fn test_order_without_lines_or_payments() {
        let db = ScriptedDatabase::new();
        db.respond("FROM shop.orders o", vec![row(None, None)]);

        let order = OrderRepository::new(&db)
            .get(OrderId::new(1))
            .await
            .unwrap()
            .unwrap();
        assert!(order.lines.is_empty());
        assert!(order.payments.is_empty());
    }

    #[tokio::test]
    async fn test_missing_order_is_none() {
        let db = ScriptedDatabase::new();
        let order = OrderRepository::new(&db).get(OrderId::new(5)).await.unwrap();
        assert!(order.is_none());
    }

    #[tokio::test]
    async fn test_unknown_status_is_corruption() {
        let db = ScriptedDatabase::new();
        db.respond("FROM shop.orders o", vec![row_with_status("lost", None, None)]);

        let err = OrderRepository::new(&db)
            .get(OrderId::new(1))
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::DataCorruption(_)));
    }

    fn new_order(lines: Vec<NewOrderLine>) -> NewOrder {
        NewOrder {
            user_id: UserId::new(USER),
            address_id: AddressId::generate(),
            currency: CurrencyCode::EUR,
            lines,
        }
    }

    fn new_line(product: i32, quantity: i32, cents: i64) -> NewOrderLine {
        NewOrderLine {
            product_id: ProductId::new(product),
            quantity,
            unit_price: Price::from_cents(cents, CurrencyCode::EUR),
        }
    }

    fn script_sequence(db: &ScriptedDatabase, id: i64) {
        db.respond(
            "nextval",
            vec![Row::new(columns(["id"]), vec![Value::Int(id)])],
        );
    }

    #[tokio::test]
    async fn test_create_writes_header_then_lines() {
        let db = ScriptedDatabase::new();
        script_sequence(&db, 41);

        let order = OrderRepository::new(&db)
            .create(new_order(vec![new_line(1, 2, 1250), new_line(2, 1, 500)]))
            .await
            .unwrap();

        assert_eq!(order.id, OrderId::new(41));
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.total, Price::from_cents(3000, CurrencyCode::EUR));

        let committed = db.committed();
        assert_eq!(committed.len(), 3);
        assert!(committed[0].sql().contains("INSERT INTO shop.orders"));
        assert_eq!(committed[0].params()[3], Param::Decimal(Some(Decimal::new(3000, 2))));
        for line in &committed[1..] {
            assert!(line.sql().contains("INSERT INTO shop.order_line"));
            assert_eq!(line.params()[0], Param::Int(Some(41)));
        }
    }

    #[tokio::test]
    async fn test_failed_line_rolls_back_header() {
        let db = ScriptedDatabase::new();
        script_sequence(&db, 42);
        db.fail_on("INSERT INTO shop.order_line", Failure::Conflict);

        let err = OrderRepository::new(&db)
            .create(new_order(vec![new_line(1, 1, 100)]))
            .await
            .unwrap_err();

        assert!(matches!(err, RepositoryError::Conflict(_)));
        assert!(db.committed().is_empty());
        assert!(db.events().contains(&Event::Rollback));
    }

    #[tokio::test]
    async fn test_create_rejects_empty_and_mixed_orders() {
        let db = ScriptedDatabase::new();
        let repo = OrderRepository::new(&db);

        let err = repo.create(new_order(vec![])).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));

        let mut mixed = new_line(2, 1, 100);
        mixed.unit_price = Price::from_cents(100, CurrencyCode::USD);
        let err = repo
            .create(new_order(vec![new_line(1, 1, 100), mixed]))
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));

        assert!(db.events().is_empty());
    }

    #[tokio::test]
    async fn test_shipping_writes_timestamp_in_same_statement() {
        let db = ScriptedDatabase::new();

        let at = OrderRepository::new(&db)
            .update_status(OrderId::new(1), OrderStatus::Shipped)
            .await
            .unwrap();

        let committed = db.committed();
        assert_eq!(committed.len(), 1);
        let stmt = &committed[0];
        assert!(stmt.sql().contains("status = $1, shipped_at = $2"));
        assert_eq!(
            stmt.params(),
            &[
                Param::Text(Some("shipped".to_owned())),
                Param::Timestamp(Some(at)),
                Param::Int(Some(1)),
            ]
        );
    }

    #[tokio::test]
    async fn test_processing_has_no_timestamp() {
        let db = ScriptedDatabase::new();
        OrderRepository::new(&db)
            .update_status(OrderId::new(1), OrderStatus::Processing)
            .await
            .unwrap();

        let stmt = &db.committed()[0];
        assert_eq!(stmt.params().len(), 2);
        assert!(!stmt.sql().contains("_at"));
    }

    #[tokio::test]
    async fn test_status_of_missing_order() {
        let db = ScriptedDatabase::new();
        db.affect("UPDATE shop.orders", 0);
        let err = OrderRepository::new(&db)
            .update_status(OrderId::new(9), OrderStatus::Cancelled)
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound));
        assert!(db.committed().is_empty());
    }

    #[tokio::test]
    async fn test_delete_removes_children_first() {
        let db = ScriptedDatabase::new();
        OrderRepository::new(&db).delete(OrderId::new(1)).await.unwrap();

        let tables: Vec<String> = db
            .committed()
            .iter()
            .map(|s| s.sql().to_owned())
            .collect();
        assert_eq!(
            tables,
            vec![
                DELETE_PAYMENTS.to_owned(),
                DELETE_LINES.to_owned(),
                DELETE_ORDER.to_owned()
            ]
        );
    }

    #[test]
    fn test_list_pages_orders_not_rows() {
        let sql = list_for_user_sql();
        assert!(sql.starts_with("WITH page AS"));
        assert!(sql.contains("LIMIT $2 OFFSET $3\n)"));
        assert!(sql.contains("JOIN shop.orders o ON o.id = page.id"));
    }

    #[test]
    fn test_payment_system_id_is_read() {
        let rows = vec![row(None, Some(PAYMENT))];
        let orders = crate::hydrate::hydrate(&rows, &order_shape()).unwrap();
        assert_eq!(
            orders[0].payments[0].payment_system_id,
            PaymentSystemId::new(Uuid::from_u128(30))
        );
    }
}
