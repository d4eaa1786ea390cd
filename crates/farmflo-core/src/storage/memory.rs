//! In-process object store.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use super::{photo_object_key, ObjectStore};
use crate::{Error, Result};

const MEMORY_URL_PREFIX: &str = "memory://farmflo/";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

#[derive(Default)]
struct Inner {
    objects: BTreeMap<String, StoredObject>,
    failure: Option<String>,
}

/// Object store kept in memory; clones share contents.
#[derive(Clone, Default)]
pub struct MemoryObjectStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make uploads fail with [`Error::Upload`] until restored.
    pub fn fail_uploads(&self, message: impl Into<String>) {
        self.inner.lock().failure = Some(message.into());
    }

    pub fn restore_uploads(&self) {
        self.inner.lock().failure = None;
    }

    pub fn object_count(&self) -> usize {
        self.inner.lock().objects.len()
    }

    /// Object behind a URL returned by [`ObjectStore::upload`].
    pub fn get(&self, url: &str) -> Option<StoredObject> {
        let key = url.strip_prefix(MEMORY_URL_PREFIX)?;
        self.inner.lock().objects.get(key).cloned()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn upload(&self, bytes: &[u8], content_type_hint: &str) -> Result<String> {
        let mut inner = self.inner.lock();
        if let Some(message) = &inner.failure {
            return Err(Error::Upload(message.clone()));
        }
        let key = photo_object_key(None, Utc::now());
        inner.objects.insert(
            key.clone(),
            StoredObject {
                bytes: bytes.to_vec(),
                content_type: content_type_hint.to_string(),
            },
        );
        tracing::debug!("Stored object {} ({} bytes)", key, bytes.len());
        Ok(format!("{MEMORY_URL_PREFIX}{key}"))
    }
}
