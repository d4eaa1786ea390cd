//! In-process document store with live queries.
//!
//! Backs tests, the CLI demo, and any device that shares state in-process.
//! Every mutation recomputes the result set of each open live query on the
//! touched collection and pushes a full snapshot when it changed.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use super::collection::{Collection, Delivery, Document, Filter, Snapshot, StoredDocument};
use super::gateway::RemoteGateway;
use super::live::{CancelHandle, LiveQuery, SubscriptionId};
use crate::{Error, Result};

struct Watcher {
    collection: Collection,
    filter: Option<Filter>,
    sender: mpsc::UnboundedSender<Delivery>,
    last: Snapshot,
}

#[derive(Default)]
struct Inner {
    collections: HashMap<Collection, BTreeMap<String, Document>>,
    watchers: BTreeMap<SubscriptionId, Watcher>,
    next_subscription: u64,
    write_failure: Option<String>,
    writes: u64,
}

impl Inner {
    fn snapshot(&self, collection: Collection, filter: Option<&Filter>) -> Snapshot {
        let documents = self
            .collections
            .get(&collection)
            .map(|documents| {
                documents
                    .iter()
                    .filter(|(id, fields)| filter.map_or(true, |f| f.matches(id, fields)))
                    .map(|(id, fields)| StoredDocument::new(id.clone(), fields.clone()))
                    .collect()
            })
            .unwrap_or_default();
        Snapshot::new(documents)
    }

    fn documents_mut(&mut self, collection: Collection) -> &mut BTreeMap<String, Document> {
        self.collections.entry(collection).or_default()
    }

    /// Push a fresh snapshot to every watcher whose result set changed.
    fn notify(&mut self, collection: Collection) {
        let mut closed = Vec::new();
        let ids: Vec<SubscriptionId> = self
            .watchers
            .iter()
            .filter(|(_, watcher)| watcher.collection == collection)
            .map(|(id, _)| *id)
            .collect();

        for id in ids {
            let Some(filter) = self.watchers.get(&id).map(|w| w.filter.clone()) else {
                continue;
            };
            let snapshot = self.snapshot(collection, filter.as_ref());
            let Some(watcher) = self.watchers.get_mut(&id) else {
                continue;
            };
            if watcher.last == snapshot {
                continue;
            }
            watcher.last = snapshot.clone();
            tracing::debug!(
                "Delivering {} snapshot ({} docs) to {}",
                collection,
                snapshot.len(),
                id
            );
            if watcher.sender.send(Ok(snapshot)).is_err() {
                closed.push(id);
            }
        }

        for id in closed {
            self.watchers.remove(&id);
        }
    }

    fn check_writable(&self) -> Result<()> {
        match &self.write_failure {
            Some(message) => Err(Error::Write(message.clone())),
            None => Ok(()),
        }
    }

    fn set(&mut self, collection: Collection, id: &str, fields: Document) {
        self.documents_mut(collection).insert(id.to_string(), fields);
        self.writes += 1;
        self.notify(collection);
    }

    fn update(&mut self, collection: Collection, id: &str, patch: Document) -> Result<()> {
        let Some(existing) = self.documents_mut(collection).get_mut(id) else {
            return Err(Error::NotFound {
                collection: collection.as_str(),
                id: id.to_string(),
            });
        };
        for (field, value) in patch {
            existing.insert(field, value);
        }
        self.writes += 1;
        self.notify(collection);
        Ok(())
    }

    fn delete(&mut self, collection: Collection, id: &str) -> bool {
        let removed = self.documents_mut(collection).remove(id).is_some();
        if removed {
            self.writes += 1;
            self.notify(collection);
        }
        removed
    }
}

/// Shared in-memory document store implementing [`RemoteGateway`].
///
/// Clones share the same data, so several devices can be simulated by handing
/// each one a clone.
#[derive(Clone)]
pub struct MemoryGateway {
    inner: Arc<Mutex<Inner>>,
    writes_paused: Arc<watch::Sender<bool>>,
}

impl Default for MemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryGateway {
    pub fn new() -> Self {
        let (writes_paused, _) = watch::channel(false);
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            writes_paused: Arc::new(writes_paused),
        }
    }

    /// Make every local write fail with [`Error::Write`] until cleared.
    pub fn fail_writes(&self, message: impl Into<String>) {
        self.inner.lock().write_failure = Some(message.into());
    }

    /// Let local writes succeed again.
    pub fn restore_writes(&self) {
        self.inner.lock().write_failure = None;
    }

    /// Hold local writes in flight until [`MemoryGateway::resume_writes`].
    pub fn pause_writes(&self) {
        self.writes_paused.send_replace(true);
    }

    pub fn resume_writes(&self) {
        self.writes_paused.send_replace(false);
    }

    /// Terminate every live query on `collection` with a delivery failure.
    pub fn break_live_queries(&self, collection: Collection, message: &str) {
        let mut inner = self.inner.lock();
        let broken: Vec<SubscriptionId> = inner
            .watchers
            .iter()
            .filter(|(_, watcher)| watcher.collection == collection)
            .map(|(id, _)| *id)
            .collect();
        for id in broken {
            if let Some(watcher) = inner.watchers.remove(&id) {
                tracing::debug!("Breaking live query {} on {}", id, collection);
                let _ = watcher
                    .sender
                    .send(Err(Error::Subscription(message.to_string())));
            }
        }
    }

    /// Store a document as if written by another device.
    pub fn apply_remote_set(&self, collection: Collection, id: &str, fields: Document) {
        self.inner.lock().set(collection, id, fields);
    }

    /// Merge a patch as if written by another device.
    pub fn apply_remote_update(
        &self,
        collection: Collection,
        id: &str,
        patch: Document,
    ) -> Result<()> {
        self.inner.lock().update(collection, id, patch)
    }

    /// Delete a document as if removed by another device.
    pub fn apply_remote_delete(&self, collection: Collection, id: &str) -> bool {
        self.inner.lock().delete(collection, id)
    }

    /// Number of live queries currently registered.
    pub fn active_subscriptions(&self) -> usize {
        self.inner.lock().watchers.len()
    }

    pub fn document_count(&self, collection: Collection) -> usize {
        self.inner
            .lock()
            .collections
            .get(&collection)
            .map_or(0, BTreeMap::len)
    }

    /// Count of successful mutations applied to the store.
    pub fn write_count(&self) -> u64 {
        self.inner.lock().writes
    }

    async fn wait_until_writable(&self) {
        let mut paused = self.writes_paused.subscribe();
        let _ = paused.wait_for(|paused| !*paused).await;
    }

    fn release_callback(
        inner: Weak<Mutex<Inner>>,
        id: SubscriptionId,
    ) -> impl Fn() + Send + Sync + 'static {
        move || {
            if let Some(inner) = inner.upgrade() {
                if inner.lock().watchers.remove(&id).is_some() {
                    tracing::debug!("Released live query {}", id);
                }
            }
        }
    }
}

#[async_trait]
impl RemoteGateway for MemoryGateway {
    async fn get(&self, collection: Collection, id: &str) -> Result<StoredDocument> {
        let inner = self.inner.lock();
        inner
            .collections
            .get(&collection)
            .and_then(|documents| documents.get(id))
            .map(|fields| StoredDocument::new(id, fields.clone()))
            .ok_or_else(|| Error::NotFound {
                collection: collection.as_str(),
                id: id.to_string(),
            })
    }

    async fn create(&self, collection: Collection, fields: Document) -> Result<String> {
        self.wait_until_writable().await;
        let mut inner = self.inner.lock();
        inner.check_writable()?;
        let id = Uuid::now_v7().simple().to_string();
        inner.set(collection, &id, fields);
        tracing::debug!("Created {}/{}", collection, id);
        Ok(id)
    }

    async fn set(&self, collection: Collection, id: &str, fields: Document) -> Result<()> {
        if id.trim().is_empty() {
            return Err(Error::InvalidInput("document id cannot be empty".to_string()));
        }
        self.wait_until_writable().await;
        let mut inner = self.inner.lock();
        inner.check_writable()?;
        inner.set(collection, id, fields);
        Ok(())
    }

    async fn update(&self, collection: Collection, id: &str, patch: Document) -> Result<()> {
        self.wait_until_writable().await;
        let mut inner = self.inner.lock();
        inner.check_writable()?;
        inner.update(collection, id, patch)
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<()> {
        self.wait_until_writable().await;
        let mut inner = self.inner.lock();
        inner.check_writable()?;
        if !inner.delete(collection, id) {
            tracing::debug!("Delete of absent {}/{} treated as no-op", collection, id);
        }
        Ok(())
    }

    async fn subscribe(&self, collection: Collection, filter: Option<Filter>) -> Result<LiveQuery> {
        let mut inner = self.inner.lock();
        inner.next_subscription += 1;
        let id = SubscriptionId(inner.next_subscription);
        let snapshot = inner.snapshot(collection, filter.as_ref());

        let (sender, receiver) = mpsc::unbounded_channel();
        sender
            .send(Ok(snapshot.clone()))
            .map_err(|_| Error::Subscription("live query receiver closed".to_string()))?;
        inner.watchers.insert(
            id,
            Watcher {
                collection,
                filter,
                sender,
                last: snapshot,
            },
        );
        tracing::debug!("Opened live query {} on {}", id, collection);

        let release = Self::release_callback(Arc::downgrade(&self.inner), id);
        Ok(LiveQuery::new(id, receiver, CancelHandle::new(release)))
    }
}
