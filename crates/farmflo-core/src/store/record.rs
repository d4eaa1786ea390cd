//! Mapping between typed records and store documents.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::collection::{Collection, Document, StoredDocument};
use crate::{Error, Result};

/// A typed record persisted in one remote collection.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Collection the record lives in.
    const COLLECTION: Collection;

    /// Attach the store-assigned document key after decoding.
    fn assign_id(&mut self, id: &str);
}

/// Encode a record into its wire field map.
pub fn encode_record<R: Record>(record: &R) -> Result<Document> {
    match serde_json::to_value(record)? {
        Value::Object(fields) => Ok(fields),
        other => Err(Error::Serialization(format!(
            "{} record encoded as non-object: {other}",
            R::COLLECTION
        ))),
    }
}

/// Decode a stored document into a typed record.
pub fn decode_document<R: Record>(document: &StoredDocument) -> Result<R> {
    let mut record: R = serde_json::from_value(Value::Object(document.fields.clone()))?;
    record.assign_id(&document.id);
    Ok(record)
}
