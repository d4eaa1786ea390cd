//! Gateway trait over the remote document store.

use async_trait::async_trait;

use super::collection::{Collection, Document, Filter, StoredDocument};
use super::live::LiveQuery;
use super::record::{decode_document, encode_record, Record};
use crate::Result;

/// Point reads, writes, and live queries against the remote document store.
///
/// Writes are never retried here; a transport failure is returned as
/// [`crate::Error::Write`] and the caller decides what to roll back.
#[async_trait]
pub trait RemoteGateway: Send + Sync + 'static {
    /// Read one document; absent documents yield [`crate::Error::NotFound`].
    async fn get(&self, collection: Collection, id: &str) -> Result<StoredDocument>;

    /// Create a document under a store-assigned key and return the key.
    async fn create(&self, collection: Collection, fields: Document) -> Result<String>;

    /// Create or overwrite the document stored under `id`.
    async fn set(&self, collection: Collection, id: &str, fields: Document) -> Result<()>;

    /// Merge `patch` into an existing document. Absent fields stay untouched.
    async fn update(&self, collection: Collection, id: &str, patch: Document) -> Result<()>;

    /// Delete a document. Deleting an absent key succeeds.
    async fn delete(&self, collection: Collection, id: &str) -> Result<()>;

    /// Open a live query. The first snapshot is delivered immediately, then a
    /// full snapshot follows every change to the filtered result set.
    async fn subscribe(&self, collection: Collection, filter: Option<Filter>) -> Result<LiveQuery>;
}

/// Read and decode a typed record.
pub async fn fetch<R, G>(gateway: &G, id: &str) -> Result<R>
where
    R: Record,
    G: RemoteGateway + ?Sized,
{
    let document = gateway.get(R::COLLECTION, id).await?;
    decode_document(&document)
}

/// Create a typed record under a store-assigned key.
pub async fn insert<R, G>(gateway: &G, record: &R) -> Result<String>
where
    R: Record,
    G: RemoteGateway + ?Sized,
{
    let fields = encode_record(record)?;
    gateway.create(R::COLLECTION, fields).await
}

/// Store a typed record under a caller-chosen key.
pub async fn put<R, G>(gateway: &G, id: &str, record: &R) -> Result<()>
where
    R: Record,
    G: RemoteGateway + ?Sized,
{
    let fields = encode_record(record)?;
    gateway.set(R::COLLECTION, id, fields).await
}
