//! Folding flat join rows into nested aggregates.
//!
//! Every read that joins a root table to its child tables goes through
//! [`hydrate`]. The per-entity knowledge lives in a [`Shape`]: where to split
//! the row into column groups, how to read the root, and for each child
//! collection how to read the child's key and attach the child. The fold
//! itself is written once.
//!
//! # Guarantees
//!
//! - Roots come out in the order their key first appears in the rows.
//! - A row whose root key is NULL contributes nothing.
//! - Each child collection of a root holds a given child key at most once, in
//!   first-appearance order, no matter how often the join fan-out repeats it.
//! - Collections are deduplicated independently: a NULL child in one group
//!   never stops another group of the same row from being attached.
//! - All lookup state is local to one call.

use std::collections::hash_map::Entry as MapEntry;
use std::collections::{HashMap, HashSet};

use uuid::Uuid;

use crate::row::{FieldGroup, HydrateError, Row};

/// Identity of a root or child record within one hydration pass.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Int(i64),
    Uuid(Uuid),
    /// Composite key, e.g. an order line's `(order_id, product_id)`.
    Pair(Box<Key>, Box<Key>),
}

impl Key {
    /// Combine two keys into a composite key.
    #[must_use]
    pub fn pair(first: impl Into<Self>, second: impl Into<Self>) -> Self {
        Self::Pair(Box::new(first.into()), Box::new(second.into()))
    }
}

impl From<i64> for Key {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Key {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<Uuid> for Key {
    fn from(v: Uuid) -> Self {
        Self::Uuid(v)
    }
}

/// Read an optional integer key column. NULL means "no record".
///
/// # Errors
///
/// Returns a [`HydrateError`] if the column is missing or not an integer.
pub fn int_key(group: &FieldGroup<'_>, column: &str) -> Result<Option<Key>, HydrateError> {
    Ok(group.get::<Option<i64>>(column)?.map(Key::Int))
}

/// Read an optional UUID key column. NULL means "no record".
///
/// # Errors
///
/// Returns a [`HydrateError`] if the column is missing or not a UUID.
pub fn uuid_key(group: &FieldGroup<'_>, column: &str) -> Result<Option<Key>, HydrateError> {
    Ok(group.get::<Option<Uuid>>(column)?.map(Key::Uuid))
}

/// The column group at `index`, for attach functions.
///
/// # Errors
///
/// Returns [`HydrateError::Shape`] naming `nest` if the row has fewer groups.
pub fn group_at<'g, 'r>(
    groups: &'g [FieldGroup<'r>],
    index: usize,
    nest: &'static str,
) -> Result<&'g FieldGroup<'r>, HydrateError> {
    groups.get(index).ok_or(HydrateError::Shape(nest))
}

/// A root entity that can be rebuilt from its own column group.
pub trait Aggregate: Sized {
    /// The root's key, or `None` when the root columns are NULL.
    ///
    /// # Errors
    ///
    /// Returns a [`HydrateError`] if the key column is missing or mistyped.
    fn root_key(root: &FieldGroup<'_>) -> Result<Option<Key>, HydrateError>;

    /// Build the root with empty child collections.
    ///
    /// # Errors
    ///
    /// Returns a [`HydrateError`] if a root column is missing or mistyped.
    fn from_root(root: &FieldGroup<'_>) -> Result<Self, HydrateError>;
}

/// Reads a child's key from its group; `None` means the LEFT JOIN missed.
pub type KeyFn = fn(&FieldGroup<'_>) -> Result<Option<Key>, HydrateError>;

/// Builds a child from the row's groups and pushes it onto the aggregate.
///
/// Receives every group of the row so a child can embed a further join
/// partner from the same row (an address and its country).
pub type AttachFn<A> = fn(&mut A, &[FieldGroup<'_>]) -> Result<(), HydrateError>;

/// One child collection of an aggregate.
pub struct Nest<A> {
    name: &'static str,
    group: usize,
    key: KeyFn,
    attach: AttachFn<A>,
}

impl<A> std::fmt::Debug for Nest<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Nest")
            .field("name", &self.name)
            .field("group", &self.group)
            .finish_non_exhaustive()
    }
}

/// Schema descriptor for one join query.
#[derive(Debug)]
pub struct Shape<A> {
    name: &'static str,
    split_on: &'static [&'static str],
    nests: Vec<Nest<A>>,
}

impl<A: Aggregate> Shape<A> {
    /// A shape for a single-table (or root-only) query.
    #[must_use]
    pub const fn flat(name: &'static str) -> Self {
        Self {
            name,
            split_on: &[],
            nests: Vec::new(),
        }
    }

    /// A shape whose rows split at the given boundary columns.
    ///
    /// Group 0 is the root; group `n` starts at `split_on[n - 1]`.
    #[must_use]
    pub const fn joined(name: &'static str, split_on: &'static [&'static str]) -> Self {
        Self {
            name,
            split_on,
            nests: Vec::new(),
        }
    }

    /// Add a child collection read from column group `group`.
    #[must_use]
    pub fn nest(mut self, name: &'static str, group: usize, key: KeyFn, attach: AttachFn<A>) -> Self {
        self.nests.push(Nest {
            name,
            group,
            key,
            attach,
        });
        self
    }

    /// Name used in logs and errors.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }
}

struct Slot<A> {
    aggregate: A,
    seen: Vec<HashSet<Key>>,
}

/// Fold rows into distinct root aggregates.
///
/// Runs in one pass over `rows`; each child duplicate check is a hash lookup.
///
/// # Errors
///
/// Returns a [`HydrateError`] if a row does not match the shape.
pub fn hydrate<A: Aggregate>(rows: &[Row], shape: &Shape<A>) -> Result<Vec<A>, HydrateError> {
    let mut index: HashMap<Key, usize> = HashMap::new();
    let mut slots: Vec<Slot<A>> = Vec::new();

    for row in rows {
        let groups = row.split(shape.split_on)?;
        let root = groups.first().ok_or(HydrateError::Shape(shape.name))?;
        let Some(key) = A::root_key(root)? else {
            continue;
        };

        let position = match index.entry(key) {
            MapEntry::Occupied(entry) => *entry.get(),
            MapEntry::Vacant(entry) => {
                slots.push(Slot {
                    aggregate: A::from_root(root)?,
                    seen: vec![HashSet::new(); shape.nests.len()],
                });
                *entry.insert(slots.len() - 1)
            }
        };
        let slot = slots
            .get_mut(position)
            .ok_or(HydrateError::Shape(shape.name))?;

        for (nest, seen) in shape.nests.iter().zip(slot.seen.iter_mut()) {
            let group = groups.get(nest.group).ok_or(HydrateError::Shape(nest.name))?;
            let Some(child) = (nest.key)(group)? else {
                continue;
            };
            if seen.insert(child) {
                (nest.attach)(&mut slot.aggregate, &groups)?;
            }
        }
    }

    tracing::trace!(
        shape = shape.name,
        rows = rows.len(),
        roots = slots.len(),
        "hydrated rows"
    );

    Ok(slots.into_iter().map(|slot| slot.aggregate).collect())
}

/// Hydrate a single-entity read.
///
/// Returns `None` when no row carries a root, and the first root otherwise.
///
/// # Errors
///
/// Returns a [`HydrateError`] if a row does not match the shape.
pub fn hydrate_one<A: Aggregate>(rows: &[Row], shape: &Shape<A>) -> Result<Option<A>, HydrateError> {
    Ok(hydrate(rows, shape)?.into_iter().next())
}
