//! Success envelope returned by single-record operations.

use serde::ser::{Serialize, SerializeMap, Serializer};

/// `{ "message": ..., "<entity_key>": record }`.
///
/// The record key depends on the entity kind (`product`, `category`, ...), so
/// the envelope serializes itself as a map instead of deriving.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope<T> {
    pub message: String,
    pub entity_key: &'static str,
    pub record: T,
}

impl<T> Envelope<T> {
    pub fn new(message: impl Into<String>, entity_key: &'static str, record: T) -> Self {
        Self {
            message: message.into(),
            entity_key,
            record,
        }
    }

    pub fn into_record(self) -> T {
        self.record
    }
}

impl<T: Serialize> Serialize for Envelope<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("message", &self.message)?;
        map.serialize_entry(self.entity_key, &self.record)?;
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_lands_under_entity_key() {
        let env = Envelope::new("Category created successfully", "category", 7);
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "message": "Category created successfully", "category": 7 })
        );
    }
}
