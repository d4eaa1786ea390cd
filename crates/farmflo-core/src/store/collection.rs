//! Collection names and the document/snapshot shapes exchanged with the store.

use std::fmt;

use serde_json::Value;

use super::record::{decode_document, Record};
use crate::Error;

/// Remote collections used by the marketplace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    /// User profiles keyed by uid
    Users,
    /// Crop listings
    Crops,
    /// Interest notifications addressed to sellers
    Notifications,
}

impl Collection {
    /// Wire name of the collection.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Users => "users",
            Self::Crops => "crops",
            Self::Notifications => "notifications",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Store-native field map of one document.
pub type Document = serde_json::Map<String, Value>;

/// A document together with its store-assigned key.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub id: String,
    pub fields: Document,
}

impl StoredDocument {
    pub fn new(id: impl Into<String>, fields: Document) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }
}

/// Server-side filter applied to a live query.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Filter {
    /// Match a single document by key
    Id(String),
    /// Match documents whose string field equals the value
    FieldEquals { field: String, value: String },
}

impl Filter {
    pub fn field_equals(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::FieldEquals {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Whether the document is part of this filter's result set.
    pub fn matches(&self, id: &str, fields: &Document) -> bool {
        match self {
            Self::Id(expected) => expected == id,
            Self::FieldEquals { field, value } => {
                fields.get(field).and_then(Value::as_str) == Some(value.as_str())
            }
        }
    }
}

/// Full result set of a live query at one point in time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub documents: Vec<StoredDocument>,
}

impl Snapshot {
    pub const fn new(documents: Vec<StoredDocument>) -> Self {
        Self { documents }
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Materialize typed records, skipping documents that do not decode.
    ///
    /// A malformed or partially written document must not take the whole
    /// view down, so it is logged and left out.
    pub fn decode<R: Record>(&self) -> Vec<R> {
        self.documents
            .iter()
            .filter_map(|document| match decode_document::<R>(document) {
                Ok(record) => Some(record),
                Err(error) => {
                    tracing::warn!(
                        "Skipping undecodable {}/{}: {}",
                        R::COLLECTION,
                        document.id,
                        error
                    );
                    None
                }
            })
            .collect()
    }
}

/// One push from a live query: a fresh snapshot or a terminal failure.
pub type Delivery = Result<Snapshot, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> Document {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn collection_wire_names() {
        assert_eq!(Collection::Users.as_str(), "users");
        assert_eq!(Collection::Crops.to_string(), "crops");
        assert_eq!(Collection::Notifications.as_str(), "notifications");
    }

    #[test]
    fn field_filter_matches_string_fields_only() {
        let filter = Filter::field_equals("sellerUid", "S1");
        assert!(filter.matches("n1", &fields(json!({ "sellerUid": "S1" }))));
        assert!(!filter.matches("n2", &fields(json!({ "sellerUid": "S2" }))));
        assert!(!filter.matches("n3", &fields(json!({ "sellerUid": 1 }))));
        assert!(!filter.matches("n4", &fields(json!({}))));
    }

    #[test]
    fn id_filter_matches_document_key() {
        let filter = Filter::Id("u1".to_string());
        assert!(filter.matches("u1", &Document::new()));
        assert!(!filter.matches("u2", &Document::new()));
    }
}
