//! Cell values and bind parameters.
//!
//! [`Value`] is what a driver hands back for one column of one row.
//! [`Param`] is what a statement binds; every variant carries its own
//! `Option` so a NULL parameter still has a SQL type.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use mercato_core::{
    AddressId, CategoryId, CountryId, OrderId, PaymentId, PaymentProviderId, PaymentSystemId,
    ProductId, ReviewId, UserId,
};

/// One decoded column value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Text(String),
    Decimal(Decimal),
    Uuid(Uuid),
    Timestamp(DateTime<Utc>),
}

impl Value {
    /// True for SQL NULL.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Short type name used in error messages.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Text(_) => "text",
            Self::Decimal(_) => "decimal",
            Self::Uuid(_) => "uuid",
            Self::Timestamp(_) => "timestamp",
        }
    }
}

/// Why a [`Value`] could not become the requested Rust type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueError {
    /// The column was NULL but the target type is not an `Option`.
    #[error("unexpected NULL")]
    UnexpectedNull,
    /// The column holds a different type.
    #[error("expected {expected}, found {found}")]
    Mismatch {
        expected: &'static str,
        found: &'static str,
    },
    /// The integer does not fit the target width.
    #[error("integer {0} out of range")]
    OutOfRange(i64),
}

/// Typed extraction from a [`Value`].
pub trait FromValue: Sized {
    /// Convert a borrowed value.
    ///
    /// # Errors
    ///
    /// Returns a [`ValueError`] when the value is NULL or of another type.
    fn from_value(value: &Value) -> Result<Self, ValueError>;
}

fn mismatch(expected: &'static str, value: &Value) -> ValueError {
    if value.is_null() {
        ValueError::UnexpectedNull
    } else {
        ValueError::Mismatch {
            expected,
            found: value.type_name(),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Result<Self, ValueError> {
        if value.is_null() {
            Ok(None)
        } else {
            T::from_value(value).map(Some)
        }
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Self, ValueError> {
        match value {
            Value::Bool(b) => Ok(*b),
            other => Err(mismatch("bool", other)),
        }
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Result<Self, ValueError> {
        match value {
            Value::Int(i) => Ok(*i),
            other => Err(mismatch("int", other)),
        }
    }
}

impl FromValue for i32 {
    fn from_value(value: &Value) -> Result<Self, ValueError> {
        let wide = i64::from_value(value)?;
        Self::try_from(wide).map_err(|_| ValueError::OutOfRange(wide))
    }
}

impl FromValue for i16 {
    fn from_value(value: &Value) -> Result<Self, ValueError> {
        let wide = i64::from_value(value)?;
        Self::try_from(wide).map_err(|_| ValueError::OutOfRange(wide))
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self, ValueError> {
        match value {
            Value::Text(s) => Ok(s.clone()),
            other => Err(mismatch("text", other)),
        }
    }
}

impl FromValue for Decimal {
    fn from_value(value: &Value) -> Result<Self, ValueError> {
        match value {
            Value::Decimal(d) => Ok(*d),
            Value::Int(i) => Ok(Self::from(*i)),
            other => Err(mismatch("decimal", other)),
        }
    }
}

impl FromValue for Uuid {
    fn from_value(value: &Value) -> Result<Self, ValueError> {
        match value {
            Value::Uuid(u) => Ok(*u),
            other => Err(mismatch("uuid", other)),
        }
    }
}

impl FromValue for DateTime<Utc> {
    fn from_value(value: &Value) -> Result<Self, ValueError> {
        match value {
            Value::Timestamp(t) => Ok(*t),
            other => Err(mismatch("timestamp", other)),
        }
    }
}

macro_rules! int_id_from_value {
    ($($name:ident),*) => {
        $(
            impl FromValue for $name {
                fn from_value(value: &Value) -> Result<Self, ValueError> {
                    i32::from_value(value).map($name::new)
                }
            }

            impl From<$name> for Param {
                fn from(id: $name) -> Self {
                    Self::Int(Some(id.as_i32()))
                }
            }

            impl From<Option<$name>> for Param {
                fn from(id: Option<$name>) -> Self {
                    Self::Int(id.map(|id| id.as_i32()))
                }
            }
        )*
    };
}

macro_rules! uuid_id_from_value {
    ($($name:ident),*) => {
        $(
            impl FromValue for $name {
                fn from_value(value: &Value) -> Result<Self, ValueError> {
                    Uuid::from_value(value).map($name::new)
                }
            }

            impl From<$name> for Param {
                fn from(id: $name) -> Self {
                    Self::Uuid(Some(id.as_uuid()))
                }
            }

            impl From<Option<$name>> for Param {
                fn from(id: Option<$name>) -> Self {
                    Self::Uuid(id.map(|id| id.as_uuid()))
                }
            }
        )*
    };
}

int_id_from_value!(CountryId, ProductId, CategoryId, OrderId, PaymentProviderId);
uuid_id_from_value!(AddressId, UserId, PaymentId, PaymentSystemId, ReviewId);

/// A typed bind parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Param {
    Bool(Option<bool>),
    SmallInt(Option<i16>),
    Int(Option<i32>),
    BigInt(Option<i64>),
    Text(Option<String>),
    Decimal(Option<Decimal>),
    Uuid(Option<Uuid>),
    Timestamp(Option<DateTime<Utc>>),
}

impl Param {
    /// True when the parameter binds NULL.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(
            self,
            Self::Bool(None)
                | Self::SmallInt(None)
                | Self::Int(None)
                | Self::BigInt(None)
                | Self::Text(None)
                | Self::Decimal(None)
                | Self::Uuid(None)
                | Self::Timestamp(None)
        )
    }

    /// The value a driver would store for this parameter.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Bool(v) => v.map_or(Value::Null, Value::Bool),
            Self::SmallInt(v) => v.map_or(Value::Null, |i| Value::Int(i64::from(i))),
            Self::Int(v) => v.map_or(Value::Null, |i| Value::Int(i64::from(i))),
            Self::BigInt(v) => v.map_or(Value::Null, Value::Int),
            Self::Text(v) => v.clone().map_or(Value::Null, Value::Text),
            Self::Decimal(v) => v.map_or(Value::Null, Value::Decimal),
            Self::Uuid(v) => v.map_or(Value::Null, Value::Uuid),
            Self::Timestamp(v) => v.map_or(Value::Null, Value::Timestamp),
        }
    }
}

macro_rules! param_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Param {
                fn from(v: $ty) -> Self {
                    Self::$variant(Some(v))
                }
            }

            impl From<Option<$ty>> for Param {
                fn from(v: Option<$ty>) -> Self {
                    Self::$variant(v)
                }
            }
        )*
    };
}

param_from! {
    bool => Bool,
    i16 => SmallInt,
    i32 => Int,
    i64 => BigInt,
    String => Text,
    Decimal => Decimal,
    Uuid => Uuid,
    DateTime<Utc> => Timestamp,
}

impl From<&str> for Param {
    fn from(v: &str) -> Self {
        Self::Text(Some(v.to_owned()))
    }
}

impl From<Option<&str>> for Param {
    fn from(v: Option<&str>) -> Self {
        Self::Text(v.map(str::to_owned))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_option_accepts_null() {
        assert_eq!(Option::<i32>::from_value(&Value::Null).unwrap(), None);
        assert_eq!(Option::<i32>::from_value(&Value::Int(3)).unwrap(), Some(3));
    }

    #[test]
    fn test_required_rejects_null() {
        assert_eq!(i32::from_value(&Value::Null), Err(ValueError::UnexpectedNull));
    }

    #[test]
    fn test_narrowing_is_checked() {
        assert_eq!(
            i16::from_value(&Value::Int(70_000)),
            Err(ValueError::OutOfRange(70_000))
        );
    }

    #[test]
    fn test_type_mismatch() {
        let err = String::from_value(&Value::Int(1)).unwrap_err();
        assert_eq!(
            err,
            ValueError::Mismatch {
                expected: "text",
                found: "int"
            }
        );
    }

    #[test]
    fn test_error_messages() {
        let err: Box<dyn std::error::Error> = Box::new(ValueError::Mismatch {
            expected: "uuid",
            found: "text",
        });
        assert_eq!(err.to_string(), "expected uuid, found text");
        assert_eq!(ValueError::UnexpectedNull.to_string(), "unexpected NULL");
        assert_eq!(ValueError::OutOfRange(-1).to_string(), "integer -1 out of range");
    }

    #[test]
    fn test_typed_ids() {
        let id = Uuid::new_v4();
        let address = AddressId::from_value(&Value::Uuid(id)).unwrap();
        assert_eq!(address.as_uuid(), id);
        assert_eq!(Param::from(address), Param::Uuid(Some(id)));
        assert_eq!(Param::from(None::<OrderId>), Param::Int(None));
    }

    #[test]
    fn test_param_null_keeps_type() {
        let p = Param::from(None::<String>);
        assert!(p.is_null());
        assert_eq!(p, Param::Text(None));
        assert_eq!(p.to_value(), Value::Null);
        assert_eq!(Param::from(7_i16).to_value(), Value::Int(7));
    }
}
