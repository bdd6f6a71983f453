//! Abstract query requests: filters, find options and updates.

use crate::document::{Document, Fields, InsertionOrder};
use serde_json::Value;
use std::collections::BTreeSet;

/// A document filter.
///
/// Filters are evaluated by the store. The core only combines the variants
/// below; it never emits store-specific query syntax.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Matches every document.
    All,
    /// Field equals the value.
    Eq {
        /// Field name.
        field: String,
        /// Expected value.
        value: Value,
    },
    /// Field equals one of the values.
    In {
        /// Field name.
        field: String,
        /// Accepted values.
        values: Vec<Value>,
    },
    /// Document was inserted at or after the given order.
    OrderAtLeast(InsertionOrder),
    /// Document has one of the listed insertion orders.
    Orders(BTreeSet<InsertionOrder>),
    /// All sub-filters match.
    And(Vec<Filter>),
}

impl Filter {
    /// Matches every document.
    #[must_use]
    pub fn all() -> Self {
        Self::All
    }

    /// Field equality.
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Eq {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Field membership.
    pub fn one_of<I, V>(field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::In {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// Lower bound on insertion order.
    #[must_use]
    pub fn order_at_least(order: InsertionOrder) -> Self {
        Self::OrderAtLeast(order)
    }

    /// Selects documents by insertion order.
    #[must_use]
    pub fn orders(orders: impl IntoIterator<Item = InsertionOrder>) -> Self {
        Self::Orders(orders.into_iter().collect())
    }

    /// Conjunction with another filter.
    #[must_use]
    pub fn and(self, other: Filter) -> Self {
        match (self, other) {
            (Self::All, f) | (f, Self::All) => f,
            (Self::And(mut lhs), Self::And(rhs)) => {
                lhs.extend(rhs);
                Self::And(lhs)
            }
            (Self::And(mut lhs), f) => {
                lhs.push(f);
                Self::And(lhs)
            }
            (f, Self::And(mut rhs)) => {
                rhs.insert(0, f);
                Self::And(rhs)
            }
            (lhs, rhs) => Self::And(vec![lhs, rhs]),
        }
    }

    /// Evaluates the filter against a document.
    #[must_use]
    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Self::All => true,
            Self::Eq { field, value } => doc.get(field) == Some(value),
            Self::In { field, values } => doc
                .get(field)
                .is_some_and(|actual| values.iter().any(|v| v == actual)),
            Self::OrderAtLeast(order) => doc.order() >= *order,
            Self::Orders(orders) => orders.contains(&doc.order()),
            Self::And(filters) => filters.iter().all(|f| f.matches(doc)),
        }
    }
}

/// Result ordering by insertion order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    /// Oldest first (the store's natural order).
    #[default]
    Ascending,
    /// Newest first.
    Descending,
}

/// Options for `find_one` / `find_all`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    /// Fields to return. `None` returns every field.
    pub projection: Option<Vec<String>>,
    /// Result ordering.
    pub sort: SortOrder,
    /// Maximum number of documents. `None` means unlimited.
    pub limit: Option<usize>,
}

impl FindOptions {
    /// Creates default options (all fields, oldest first, unlimited).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts the returned fields.
    #[must_use]
    pub fn projection<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.projection = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Returns newest documents first.
    #[must_use]
    pub const fn newest_first(mut self) -> Self {
        self.sort = SortOrder::Descending;
        self
    }

    /// Limits the number of returned documents.
    #[must_use]
    pub const fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// A field update (`$set` semantics).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Update {
    /// Fields to overwrite or add.
    pub set: Fields,
}

impl Update {
    /// Creates an update setting one field.
    pub fn set(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::default().and_set(field, value)
    }

    /// Adds another field to set.
    #[must_use]
    pub fn and_set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set.insert(field.into(), value.into());
        self
    }

    /// Applies the update to a document.
    pub fn apply(&self, doc: &mut Document) {
        for (field, value) in &self.set {
            doc.set(field.clone(), value.clone());
        }
    }
}
