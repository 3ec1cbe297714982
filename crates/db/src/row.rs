//! Result rows and column-group splitting.
//!
//! A join query returns one flat row per combination of root and child
//! records, with every joined table's columns laid side by side. Column
//! names repeat across tables (`id` shows up once per table), so groups are
//! found by position: [`Row::split`] walks the columns left to right and
//! starts a new group at each boundary column name.
//!
//! ```text
//! id | total | status || order_id | product_id | quantity || id   | amount
//! ^ root                ^ split "order_id"                   ^ split "id"
//! ```

use std::sync::Arc;

use thiserror::Error;

use crate::value::{FromValue, Value, ValueError};

/// Failures while mapping rows back into domain objects.
///
/// Hydration is pure, so every one of these means the query and the mapping
/// disagree, or the stored data is not what the schema promises.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HydrateError {
    /// A column the mapping reads is not present in its group.
    #[error("missing column `{0}`")]
    MissingColumn(String),

    /// A split boundary was not found after the previous boundary.
    #[error("split column `{0}` not found")]
    MissingSplit(String),

    /// A column holds a value the mapping cannot convert.
    #[error("column `{column}`: {reason}")]
    Type { column: String, reason: String },

    /// A hydration shape refers to a column group its split does not produce.
    #[error("shape `{0}` refers to a missing column group")]
    Shape(&'static str),

    /// A stored value decoded but is not valid for the domain type.
    #[error("column `{column}`: {reason}")]
    Invalid { column: String, reason: String },
}

/// Shared column names for every row of one result set.
pub type Columns = Arc<[String]>;

/// One row of a result set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    columns: Columns,
    values: Vec<Value>,
}

impl Row {
    /// Build a row from its column names and values.
    ///
    /// # Panics
    ///
    /// Debug builds assert that there is one value per column.
    #[must_use]
    pub fn new(columns: Columns, values: Vec<Value>) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        Self { columns, values }
    }

    /// Column names in select order.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// The whole row as a single group.
    #[must_use]
    pub fn all(&self) -> FieldGroup<'_> {
        FieldGroup {
            columns: &self.columns,
            values: &self.values,
        }
    }

    /// Typed access to the first column named `name`.
    ///
    /// # Errors
    ///
    /// See [`FieldGroup::get`].
    pub fn get<T: FromValue>(&self, name: &str) -> Result<T, HydrateError> {
        self.all().get(name)
    }

    /// Partition the row into column groups.
    ///
    /// The first group starts at column 0. Each entry of `split_on` names the
    /// first column of the next group; the search for it starts one column
    /// after the previous boundary, so repeated names such as `id` are fine.
    /// The result always has `split_on.len() + 1` groups.
    ///
    /// # Errors
    ///
    /// Returns [`HydrateError::MissingSplit`] if a boundary column is not found.
    pub fn split(&self, split_on: &[&str]) -> Result<Vec<FieldGroup<'_>>, HydrateError> {
        let mut bounds = Vec::with_capacity(split_on.len() + 2);
        bounds.push(0);
        let mut from = 0;
        for name in split_on {
            let offset = self
                .columns
                .iter()
                .skip(from + 1)
                .position(|column| column == name)
                .ok_or_else(|| HydrateError::MissingSplit((*name).to_owned()))?;
            from += offset + 1;
            bounds.push(from);
        }
        bounds.push(self.values.len());

        Ok(bounds
            .iter()
            .zip(bounds.iter().skip(1))
            .map(|(&start, &end)| FieldGroup {
                columns: self.columns.get(start..end).unwrap_or_default(),
                values: self.values.get(start..end).unwrap_or_default(),
            })
            .collect())
    }
}

/// A borrowed view over a contiguous run of columns of one row.
#[derive(Debug, Clone, Copy)]
pub struct FieldGroup<'r> {
    columns: &'r [String],
    values: &'r [Value],
}

impl<'r> FieldGroup<'r> {
    /// Column names in this group.
    #[must_use]
    pub const fn columns(&self) -> &'r [String] {
        self.columns
    }

    /// Raw value of the first column named `name`.
    #[must_use]
    pub fn value(&self, name: &str) -> Option<&'r Value> {
        self.columns
            .iter()
            .position(|column| column == name)
            .and_then(|i| self.values.get(i))
    }

    /// Typed value of column `name`.
    ///
    /// # Errors
    ///
    /// Returns [`HydrateError::MissingColumn`] if no such column exists in
    /// this group, or [`HydrateError::Type`] if it cannot be converted.
    pub fn get<T: FromValue>(&self, name: &str) -> Result<T, HydrateError> {
        let value = self
            .value(name)
            .ok_or_else(|| HydrateError::MissingColumn(name.to_owned()))?;
        T::from_value(value).map_err(|e| type_error(name, &e))
    }

    /// Parse a text column through `FromStr`, as for stored enums.
    ///
    /// # Errors
    ///
    /// Returns [`HydrateError::Invalid`] when the text does not parse.
    pub fn parse<T>(&self, name: &str) -> Result<T, HydrateError>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        let text: String = self.get(name)?;
        text.parse().map_err(|e: T::Err| HydrateError::Invalid {
            column: name.to_owned(),
            reason: e.to_string(),
        })
    }

    /// True when column `name` exists and is NULL.
    #[must_use]
    pub fn is_null(&self, name: &str) -> bool {
        self.value(name).is_some_and(Value::is_null)
    }
}

fn type_error(column: &str, err: &ValueError) -> HydrateError {
    HydrateError::Type {
        column: column.to_owned(),
        reason: err.to_string(),
    }
}

/// Build a shared column list from names.
#[must_use]
pub fn columns<I, S>(names: I) -> Columns
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    names.into_iter().map(Into::into).collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn order_row() -> Row {
        Row::new(
            columns(["id", "total", "order_id", "product_id", "quantity", "id", "amount"]),
            vec![
                Value::Int(1),
                Value::Int(10),
                Value::Int(1),
                Value::Int(5),
                Value::Int(2),
                Value::Null,
                Value::Null,
            ],
        )
    }

    #[test]
    fn test_split_on_repeated_names() {
        let row = order_row();
        let groups = row.split(&["order_id", "id"]).unwrap();
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].columns(), ["id", "total"]);
        assert_eq!(groups[1].columns(), ["order_id", "product_id", "quantity"]);
        assert_eq!(groups[2].columns(), ["id", "amount"]);
        assert_eq!(groups[0].get::<i32>("id").unwrap(), 1);
        assert!(groups[2].is_null("amount"));
        assert!(!groups[1].is_null("quantity"));
    }

    #[test]
    fn test_split_without_boundaries_is_whole_row() {
        let row = order_row();
        let groups = row.split(&[]).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].columns().len(), 7);
    }

    #[test]
    fn test_split_missing_boundary() {
        let row = order_row();
        let err = row.split(&["order_id", "review_id"]).unwrap_err();
        assert_eq!(err, HydrateError::MissingSplit("review_id".to_owned()));
    }

    #[test]
    fn test_split_boundary_must_follow_previous() {
        let row = Row::new(columns(["id", "name"]), vec![Value::Int(1), Value::Null]);
        // "id" at column 0 is the root itself, never a boundary
        assert!(row.split(&["id"]).is_err());
    }

    #[test]
    fn test_group_lookup_is_scoped() {
        let row = order_row();
        let groups = row.split(&["order_id", "id"]).unwrap();
        assert!(groups[2].is_null("id"));
        assert!(matches!(
            groups[1].get::<i32>("total"),
            Err(HydrateError::MissingColumn(_))
        ));
    }

    #[test]
    fn test_parse_enum_column() {
        let row = Row::new(columns(["status"]), vec![Value::Text("bogus".to_owned())]);
        let err = row
            .all()
            .parse::<mercato_core::OrderStatus>("status")
            .unwrap_err();
        assert!(matches!(err, HydrateError::Invalid { .. }));
    }
}
