//! Object store for listing photos.
//!
//! Uploads are fire-and-forget from the marketplace's point of view: the store
//! returns a durable URL and nothing ever deletes the object again.

mod http;
mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub use http::HttpObjectStore;
pub use memory::MemoryObjectStore;

use crate::Result;

/// Binary uploads that yield a retrieval URL.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// Store `bytes` and return the URL they can be fetched from.
    ///
    /// Fails with [`crate::Error::Upload`].
    async fn upload(&self, bytes: &[u8], content_type_hint: &str) -> Result<String>;
}

/// Object key for a new photo: `images/<unix-millis>-<uuid>`.
///
/// A non-empty `namespace` is prepended as its own path segment.
pub fn photo_object_key(namespace: Option<&str>, now: DateTime<Utc>) -> String {
    let key = format!(
        "images/{}-{}",
        now.timestamp_millis(),
        Uuid::now_v7().simple()
    );
    match namespace.map(str::trim).filter(|value| !value.is_empty()) {
        Some(namespace) => format!("{}/{key}", namespace.trim_matches('/')),
        None => key,
    }
}
