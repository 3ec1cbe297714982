//! Read-only inspection of stored aggregates.

use std::fmt::{self, Write};

use mercato_core::{OrderId, UserId};
use mercato_db::models::{Order, User};
use mercato_db::repositories::{CountryRepository, OrderRepository, Page, UserRepository};
use uuid::Uuid;

use super::{CliError, connect};

#[allow(clippy::print_stdout)]
fn emit(text: &str) {
    print!("{text}");
}

/// List countries by name.
pub async fn countries(limit: i64, offset: i64) -> Result<(), CliError> {
    let db = connect().await?;
    let countries = CountryRepository::new(&db)
        .list(Page::new(limit, offset))
        .await?;

    let mut out = String::new();
    for country in &countries {
        writeln!(out, "{:>4}  {}  {}  {}", country.id, country.iso2, country.iso3, country.name)?;
    }
    emit(&out);
    tracing::info!(count = countries.len(), "Listed countries");
    Ok(())
}

/// Show one order.
pub async fn order(id: i32) -> Result<(), CliError> {
    let db = connect().await?;
    let order = OrderRepository::new(&db)
        .get(OrderId::new(id))
        .await?
        .ok_or_else(|| CliError::NotFound(format!("order {id}")))?;

    let mut out = String::new();
    render_order(&mut out, &order)?;
    emit(&out);
    Ok(())
}

/// Show one user.
pub async fn user(id: Uuid) -> Result<(), CliError> {
    let db = connect().await?;
    let user = UserRepository::new(&db)
        .get(UserId::new(id))
        .await?
        .ok_or_else(|| CliError::NotFound(format!("user {id}")))?;

    let mut out = String::new();
    render_user(&mut out, &user)?;
    emit(&out);
    Ok(())
}

fn render_order(out: &mut impl Write, order: &Order) -> fmt::Result {
    writeln!(
        out,
        "Order {} [{}] {} {}",
        order.id,
        order.status.as_str(),
        order.total.amount,
        order.total.currency_code.as_str()
    )?;
    writeln!(out, "  placed   {}", order.created_at.to_rfc3339())?;
    if let Some(at) = order.timestamp_for(order.status) {
        writeln!(out, "  {:<8} {}", order.status.as_str(), at.to_rfc3339())?;
    }
    for line in &order.lines {
        let name = line.product.as_ref().map_or("?", |p| p.name.as_str());
        write!(
            out,
            "  line     {} x{} @ {}",
            line.product_id, line.quantity, line.unit_price.amount
        )?;
        if let Some(subtotal) = line.subtotal() {
            write!(out, " = {}", subtotal.amount)?;
        }
        writeln!(out, " ({name})")?;
    }
    for payment in &order.payments {
        writeln!(
            out,
            "  payment  {} {} {} {}",
            payment.id,
            payment.method.as_str(),
            payment.status.as_str(),
            payment.amount.amount
        )?;
    }
    Ok(())
}

fn render_user(out: &mut impl Write, user: &User) -> fmt::Result {
    writeln!(
        out,
        "User {} ({}) {} {} <{}>",
        user.id,
        user.username,
        user.first_name,
        user.last_name,
        user.email.as_str()
    )?;
    for link in &user.addresses {
        let address = &link.address;
        let country = address.country.as_ref().map_or("?", |c| c.iso2.as_str());
        let marker = if link.is_default { "*" } else { " " };
        writeln!(
            out,
            "  address {marker} {}, {} {} {country}",
            address.street, address.zip, address.city
        )?;
    }
    for system in &user.payment_systems {
        let marker = if system.is_default { "*" } else { " " };
        writeln!(
            out,
            "  payment {marker} provider {} {}",
            system.provider_id, system.reference
        )?;
    }
    for review in &user.reviews {
        writeln!(out, "  review    product {} rated {}", review.product_id, review.rating)?;
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{TimeZone, Utc};
    use mercato_core::{AddressId, CountryId, CurrencyCode, Email, OrderStatus, Price, ProductId};
    use mercato_db::models::{Address, Country, OrderLine, UserAddress};

    use super::*;

    #[test]
    fn test_render_shipped_order() {
        let at = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
        let order = Order {
            id: OrderId::new(41),
            user_id: UserId::generate(),
            address_id: AddressId::generate(),
            total: Price::from_cents(2500, CurrencyCode::EUR),
            status: OrderStatus::Shipped,
            created_at: at,
            shipped_at: Some(at),
            delivered_at: None,
            returned_at: None,
            cancelled_at: None,
            lines: vec![OrderLine {
                order_id: OrderId::new(41),
                product_id: ProductId::new(3),
                quantity: 2,
                unit_price: Price::from_cents(1250, CurrencyCode::EUR),
                product: None,
            }],
            payments: Vec::new(),
        };

        let mut text = String::new();
        render_order(&mut text, &order).unwrap();
        assert!(text.starts_with("Order 41 [shipped] 25.00 EUR"));
        assert!(text.contains("shipped  2026-03-02T09:00:00+00:00"));
        assert!(text.contains("line     3 x2 @ 12.50 = 25.00 (?)"));
    }

    #[test]
    fn test_render_user_marks_default_address() {
        let country = Country {
            id: CountryId::new(1),
            iso2: "PT".to_owned(),
            iso3: "PRT".to_owned(),
            name: "Portugal".to_owned(),
            addresses: Vec::new(),
        };
        let address = |street: &str, country: Option<Country>| Address {
            id: AddressId::generate(),
            street: street.to_owned(),
            city: "Lisboa".to_owned(),
            region: None,
            zip: "1100-148".to_owned(),
            country_id: CountryId::new(1),
            country,
        };
        let user = User {
            id: UserId::generate(),
            username: "ana".to_owned(),
            email: Email::parse("ana@example.com").unwrap(),
            first_name: "Ana".to_owned(),
            last_name: "Silva".to_owned(),
            password_hash: "hash".to_owned(),
            created_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            addresses: vec![
                UserAddress {
                    address: address("Rua Augusta 1", Some(country)),
                    is_default: true,
                },
                UserAddress {
                    address: address("Rua do Ouro 2", None),
                    is_default: false,
                },
            ],
            payment_systems: Vec::new(),
            reviews: Vec::new(),
        };

        let mut text = String::new();
        render_user(&mut text, &user).unwrap();
        assert!(text.contains("(ana) Ana Silva <ana@example.com>"));
        assert!(text.contains("address * Rua Augusta 1, 1100-148 Lisboa PT"));
        assert!(text.contains("address   Rua do Ouro 2, 1100-148 Lisboa ?"));
    }
}
