//! Stored documents and their insertion order.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// The field map of a document.
pub type Fields = serde_json::Map<String, Value>;

/// Store-assigned position of a document in insertion order.
///
/// Insertion orders are opaque but comparable. The upper bits form a coarse
/// component that only grows; the lower [`InsertionOrder::FINE_BITS`] bits
/// are a tiebreaker that a store may fill with values that are not monotonic
/// across writers. Code that needs a safe lower bound for "written at or
/// after X" must therefore compare against [`InsertionOrder::coarse_floor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InsertionOrder(pub u64);

impl InsertionOrder {
    /// Number of low-order bits that are not guaranteed to be monotonic.
    pub const FINE_BITS: u32 = 16;

    /// The smallest insertion order.
    pub const ZERO: Self = Self(0);

    /// Creates an insertion order from its raw value.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Rounds down to the start of the coarse window containing `self`.
    #[must_use]
    pub const fn coarse_floor(self) -> Self {
        Self(self.0 & !((1u64 << Self::FINE_BITS) - 1))
    }

    /// Returns the following insertion order.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for InsertionOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ord:{:#x}", self.0)
    }
}

/// A document as returned by a [`crate::DocumentStore`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    order: InsertionOrder,
    fields: Fields,
}

impl Document {
    /// Creates a document. Only stores assign insertion orders.
    #[must_use]
    pub fn new(order: InsertionOrder, fields: Fields) -> Self {
        Self { order, fields }
    }

    /// Returns the store-assigned insertion order.
    #[must_use]
    pub fn order(&self) -> InsertionOrder {
        self.order
    }

    /// Returns all fields.
    #[must_use]
    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    /// Consumes the document and returns its fields.
    #[must_use]
    pub fn into_fields(self) -> Fields {
        self.fields
    }

    /// Returns a field value.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Returns whether the field is present.
    #[must_use]
    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// Returns a string field.
    #[must_use]
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(Value::as_str)
    }

    /// Returns an integer field.
    ///
    /// Unsigned values above `i64::MAX` are returned with their bit pattern
    /// preserved, matching the int64 wire encoding of identifiers.
    #[must_use]
    pub fn get_i64(&self, field: &str) -> Option<i64> {
        let value = self.get(field)?;
        value
            .as_i64()
            .or_else(|| value.as_u64().map(|v| v as i64))
    }

    /// Returns a boolean field.
    #[must_use]
    pub fn get_bool(&self, field: &str) -> Option<bool> {
        self.get(field).and_then(Value::as_bool)
    }

    /// Returns an array field.
    #[must_use]
    pub fn get_array(&self, field: &str) -> Option<&Vec<Value>> {
        self.get(field).and_then(Value::as_array)
    }

    /// Sets a field, returning the previous value.
    pub fn set(&mut self, field: impl Into<String>, value: Value) -> Option<Value> {
        self.fields.insert(field.into(), value)
    }

    /// Keeps only the named fields.
    #[must_use]
    pub fn project(mut self, fields: &[String]) -> Self {
        self.fields.retain(|key, _| fields.iter().any(|f| f == key));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(fields: Value) -> Document {
        let Value::Object(map) = fields else {
            panic!("expected object");
        };
        Document::new(InsertionOrder::new(7), map)
    }

    #[test]
    fn coarse_floor_clears_fine_bits() {
        let order = InsertionOrder::new(0x0003_0000_1234);
        assert_eq!(order.coarse_floor(), InsertionOrder::new(0x0003_0000_0000));
        assert!(order.coarse_floor() <= order);
    }

    #[test]
    fn coarse_floor_is_idempotent() {
        let order = InsertionOrder::new(0xABCD_EF01);
        assert_eq!(order.coarse_floor().coarse_floor(), order.coarse_floor());
    }

    #[test]
    fn ordering_follows_raw_value() {
        assert!(InsertionOrder::new(1) < InsertionOrder::new(2));
        assert_eq!(InsertionOrder::new(1).next(), InsertionOrder::new(2));
    }

    #[test]
    fn typed_getters() {
        let d = doc(json!({"s": "text", "i": -5, "b": true, "a": [1, 2]}));
        assert_eq!(d.get_str("s"), Some("text"));
        assert_eq!(d.get_i64("i"), Some(-5));
        assert_eq!(d.get_bool("b"), Some(true));
        assert_eq!(d.get_array("a").map(Vec::len), Some(2));
        assert_eq!(d.get_str("i"), None);
        assert!(d.contains("s"));
        assert!(!d.contains("missing"));
    }

    #[test]
    fn large_unsigned_keeps_bit_pattern() {
        let d = doc(json!({"id": u64::MAX}));
        assert_eq!(d.get_i64("id"), Some(-1));
    }

    #[test]
    fn projection_keeps_listed_fields() {
        let d = doc(json!({"a": 1, "b": 2, "c": 3}));
        let projected = d.project(&["a".to_string(), "c".to_string()]);
        assert!(projected.contains("a"));
        assert!(!projected.contains("b"));
        assert!(projected.contains("c"));
        assert_eq!(projected.order(), InsertionOrder::new(7));
    }
}
