//! Subscription lifecycle for live views.
//!
//! [`SubscriptionManager`] owns every open live query and keeps at most one
//! per view. Replacing a subscription cancels the old query before the new one
//! is opened, and a stopped subscription never calls its sink again.
//!
//! [`LiveBinding`] sits between a view and the manager: it holds the view's
//! state in a `watch` channel and stamps every sink with an epoch so that a
//! delivery from a superseded query can never touch the current state.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use crate::state::ViewStatus;
use crate::store::{
    CancelHandle, Collection, Delivery, Filter, RemoteGateway, Snapshot, SubscriptionId,
};
use crate::Result;

/// Views that consume a live query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ViewId {
    Profile,
    Directory,
    Inventory,
    Interests,
}

impl ViewId {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Profile => "profile",
            Self::Directory => "directory",
            Self::Inventory => "inventory",
            Self::Interests => "interests",
        }
    }
}

impl fmt::Display for ViewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Collection and filter a view's live query is opened with.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionKey {
    pub collection: Collection,
    pub filter: Option<Filter>,
}

impl SubscriptionKey {
    pub const fn all(collection: Collection) -> Self {
        Self {
            collection,
            filter: None,
        }
    }

    pub const fn filtered(collection: Collection, filter: Filter) -> Self {
        Self {
            collection,
            filter: Some(filter),
        }
    }
}

/// Outcome of asking the manager to (re)open or stop a view's subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    /// A new live query was opened
    Started,
    /// A query for the same key is already open; nothing changed
    AlreadyActive,
    /// The previous query was cancelled and a new one opened
    Replaced,
    /// The previous query was cancelled and none opened
    Stopped,
    /// Nothing was open and nothing was opened
    Idle,
}

/// Receiver of a view's deliveries. Called from the delivery task; must not block.
pub type DeliverySink = Arc<dyn Fn(Delivery) + Send + Sync>;

struct ActiveSubscription {
    key: SubscriptionKey,
    id: SubscriptionId,
    open: Arc<parking_lot::Mutex<bool>>,
    cancel: CancelHandle,
    task: JoinHandle<()>,
}

impl ActiveSubscription {
    /// Returns once no sink call for this subscription is in progress.
    fn stop(self, view: ViewId) {
        *self.open.lock() = false;
        self.cancel.cancel();
        self.task.abort();
        tracing::debug!("Stopped {} live query {}", view, self.id);
    }
}

/// Owner of all live queries opened on behalf of views.
pub struct SubscriptionManager {
    gateway: Arc<dyn RemoteGateway>,
    active: Mutex<HashMap<ViewId, ActiveSubscription>>,
}

impl SubscriptionManager {
    pub fn new(gateway: Arc<dyn RemoteGateway>) -> Self {
        Self {
            gateway,
            active: Mutex::new(HashMap::new()),
        }
    }

    /// Make `view`'s subscription match `key`.
    ///
    /// `None` stops the view. The same key as the open subscription is a no-op,
    /// even when that query has already failed; use [`Self::restart`] to reopen.
    pub async fn ensure(
        &self,
        view: ViewId,
        key: Option<SubscriptionKey>,
        sink: DeliverySink,
    ) -> Result<Activation> {
        let mut active = self.active.lock().await;
        let Some(key) = key else {
            return Ok(match active.remove(&view) {
                Some(existing) => {
                    existing.stop(view);
                    Activation::Stopped
                }
                None => Activation::Idle,
            });
        };

        let replaced = match active.remove(&view) {
            Some(existing) if existing.key == key => {
                active.insert(view, existing);
                return Ok(Activation::AlreadyActive);
            }
            Some(existing) => {
                existing.stop(view);
                true
            }
            None => false,
        };

        let subscription = self.open(view, key, sink).await?;
        active.insert(view, subscription);
        Ok(if replaced {
            Activation::Replaced
        } else {
            Activation::Started
        })
    }

    /// Cancel whatever `view` has open and open `key` afresh.
    pub async fn restart(
        &self,
        view: ViewId,
        key: SubscriptionKey,
        sink: DeliverySink,
    ) -> Result<Activation> {
        let mut active = self.active.lock().await;
        let replaced = match active.remove(&view) {
            Some(existing) => {
                existing.stop(view);
                true
            }
            None => false,
        };
        let subscription = self.open(view, key, sink).await?;
        active.insert(view, subscription);
        Ok(if replaced {
            Activation::Replaced
        } else {
            Activation::Started
        })
    }

    pub async fn stop(&self, view: ViewId) -> Activation {
        match self.active.lock().await.remove(&view) {
            Some(existing) => {
                existing.stop(view);
                Activation::Stopped
            }
            None => Activation::Idle,
        }
    }

    pub async fn stop_all(&self) {
        let mut active = self.active.lock().await;
        for (view, subscription) in active.drain() {
            subscription.stop(view);
        }
    }

    /// Key of the subscription currently held for `view`.
    pub async fn active_key(&self, view: ViewId) -> Option<SubscriptionKey> {
        self.active
            .lock()
            .await
            .get(&view)
            .map(|subscription| subscription.key.clone())
    }

    pub async fn active_count(&self) -> usize {
        self.active.lock().await.len()
    }

    async fn open(
        &self,
        view: ViewId,
        key: SubscriptionKey,
        sink: DeliverySink,
    ) -> Result<ActiveSubscription> {
        let mut query = self
            .gateway
            .subscribe(key.collection, key.filter.clone())
            .await?;
        let id = query.id();
        let cancel = query.cancel_handle();
        let open = Arc::new(parking_lot::Mutex::new(true));
        let gate = Arc::clone(&open);

        let task = tokio::spawn(async move {
            while let Some(delivery) = query.next().await {
                let failed = delivery.is_err();
                {
                    let open = gate.lock();
                    if !*open {
                        break;
                    }
                    sink(delivery);
                }
                if failed {
                    tracing::debug!("{} live query {} ended after failure", view, id);
                    break;
                }
            }
        });

        tracing::debug!("Started {} live query {} on {}", view, id, key.collection);
        Ok(ActiveSubscription {
            key,
            id,
            open,
            cancel,
            task,
        })
    }
}

impl Drop for SubscriptionManager {
    fn drop(&mut self) {
        for (view, subscription) in self.active.get_mut().drain() {
            subscription.stop(view);
        }
    }
}

/// View state that is rebuilt from live snapshots.
pub trait LiveState: Send + Sync + 'static {
    fn status_mut(&mut self) -> &mut ViewStatus;

    /// Re-derive the view from a full snapshot.
    fn apply_snapshot(&mut self, snapshot: &Snapshot);

    /// Drop data tied to the previous subscription.
    fn clear(&mut self);
}

/// Connects one view's state to its subscription.
pub struct LiveBinding<S> {
    view: ViewId,
    manager: Arc<SubscriptionManager>,
    state: Arc<watch::Sender<S>>,
    epoch: Arc<AtomicU64>,
    wanted: AtomicBool,
    guard: Mutex<()>,
}

impl<S: LiveState> LiveBinding<S> {
    pub fn new(view: ViewId, manager: Arc<SubscriptionManager>, initial: S) -> Self {
        let (state, _) = watch::channel(initial);
        Self {
            view,
            manager,
            state: Arc::new(state),
            epoch: Arc::new(AtomicU64::new(0)),
            wanted: AtomicBool::new(false),
            guard: Mutex::new(()),
        }
    }

    pub const fn view(&self) -> ViewId {
        self.view
    }

    pub fn state(&self) -> &watch::Sender<S> {
        &self.state
    }

    pub fn watch(&self) -> watch::Receiver<S> {
        self.state.subscribe()
    }

    /// Whether the view has been activated and not deactivated since.
    pub fn is_wanted(&self) -> bool {
        self.wanted.load(Ordering::SeqCst)
    }

    /// Activate the view with `key`; `prepare` seeds the cleared state.
    pub async fn bind(
        &self,
        key: Option<SubscriptionKey>,
        prepare: impl FnOnce(&mut S) + Send,
    ) -> Result<Activation> {
        let _guard = self.guard.lock().await;
        self.wanted.store(true, Ordering::SeqCst);
        self.rebind(key, prepare, false).await
    }

    /// Follow a dependency change. Inactive views stay inactive.
    pub async fn refresh(
        &self,
        key: Option<SubscriptionKey>,
        prepare: impl FnOnce(&mut S) + Send,
    ) -> Result<Activation> {
        let _guard = self.guard.lock().await;
        if !self.is_wanted() {
            return Ok(Activation::Idle);
        }
        self.rebind(key, prepare, false).await
    }

    /// Reopen the view's query even when the key is unchanged.
    pub async fn retry(
        &self,
        key: Option<SubscriptionKey>,
        prepare: impl FnOnce(&mut S) + Send,
    ) -> Result<Activation> {
        let _guard = self.guard.lock().await;
        self.wanted.store(true, Ordering::SeqCst);
        self.rebind(key, prepare, true).await
    }

    pub async fn unbind(&self) -> Activation {
        let _guard = self.guard.lock().await;
        self.wanted.store(false, Ordering::SeqCst);
        self.epoch.fetch_add(1, Ordering::SeqCst);
        let activation = self.manager.stop(self.view).await;
        self.state.send_modify(|state| {
            state.clear();
            *state.status_mut() = ViewStatus::Idle;
        });
        activation
    }

    async fn rebind(
        &self,
        key: Option<SubscriptionKey>,
        prepare: impl FnOnce(&mut S) + Send,
        force: bool,
    ) -> Result<Activation> {
        if !force && key.is_some() && self.manager.active_key(self.view).await == key {
            return Ok(Activation::AlreadyActive);
        }

        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let loading = key.is_some();
        self.state.send_modify(|state| {
            state.clear();
            prepare(state);
            *state.status_mut() = if loading {
                ViewStatus::Loading
            } else {
                ViewStatus::Idle
            };
        });

        let sink = self.sink(epoch);
        let outcome = match key {
            Some(key) if force => self.manager.restart(self.view, key, sink).await,
            key => self.manager.ensure(self.view, key, sink).await,
        };
        if let Err(error) = &outcome {
            tracing::warn!("Failed to open {} live query: {}", self.view, error);
            let current = Arc::clone(&self.epoch);
            self.state.send_if_modified(|state| {
                if current.load(Ordering::SeqCst) != epoch {
                    return false;
                }
                *state.status_mut() = ViewStatus::Failed(error.to_string());
                true
            });
        }
        outcome
    }

    fn sink(&self, epoch: u64) -> DeliverySink {
        let state = Arc::clone(&self.state);
        let current = Arc::clone(&self.epoch);
        let view = self.view;
        Arc::new(move |delivery: Delivery| {
            state.send_if_modified(|state| {
                if current.load(Ordering::SeqCst) != epoch {
                    return false;
                }
                match &delivery {
                    Ok(snapshot) => {
                        state.apply_snapshot(snapshot);
                        *state.status_mut() = ViewStatus::Live;
                    }
                    Err(error) => {
                        tracing::warn!("{} live query failed: {}", view, error);
                        *state.status_mut() = ViewStatus::Failed(error.to_string());
                    }
                }
                true
            });
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    use crate::store::{Document, MemoryGateway};

    fn fields(value: serde_json::Value) -> Document {
        match value {
            serde_json::Value::Object(fields) => fields,
            _ => Document::new(),
        }
    }

    fn channel_sink() -> (DeliverySink, mpsc::UnboundedReceiver<Delivery>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let sink: DeliverySink = Arc::new(move |delivery| {
            let _ = sender.send(delivery);
        });
        (sink, receiver)
    }

    async fn next_delivery(receiver: &mut mpsc::UnboundedReceiver<Delivery>) -> Delivery {
        timeout(Duration::from_secs(1), receiver.recv())
            .await
            .expect("delivery in time")
            .expect("sink open")
    }

    fn manager(gateway: &MemoryGateway) -> SubscriptionManager {
        SubscriptionManager::new(Arc::new(gateway.clone()))
    }

    #[tokio::test]
    async fn second_activation_for_same_key_is_a_no_op() {
        let gateway = MemoryGateway::new();
        let manager = manager(&gateway);
        let key = SubscriptionKey::all(Collection::Crops);
        let (first, mut first_rx) = channel_sink();
        let (second, mut second_rx) = channel_sink();

        let started = manager
            .ensure(ViewId::Directory, Some(key.clone()), first)
            .await
            .unwrap();
        let again = manager
            .ensure(ViewId::Directory, Some(key), second)
            .await
            .unwrap();

        assert_eq!(started, Activation::Started);
        assert_eq!(again, Activation::AlreadyActive);
        assert_eq!(gateway.active_subscriptions(), 1);

        assert!(next_delivery(&mut first_rx).await.is_ok());
        gateway.apply_remote_set(Collection::Crops, "c1", fields(json!({"name": "Okra"})));
        let snapshot = next_delivery(&mut first_rx).await.unwrap();
        assert_eq!(snapshot.len(), 1);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(second_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn replacing_cancels_old_query_before_new_deliveries() {
        let gateway = MemoryGateway::new();
        let manager = manager(&gateway);
        let (old_sink, mut old_rx) = channel_sink();
        let (new_sink, mut new_rx) = channel_sink();

        manager
            .ensure(
                ViewId::Interests,
                Some(SubscriptionKey::filtered(
                    Collection::Notifications,
                    Filter::field_equals("sellerUid", "S1"),
                )),
                old_sink,
            )
            .await
            .unwrap();
        let replaced = manager
            .ensure(
                ViewId::Interests,
                Some(SubscriptionKey::filtered(
                    Collection::Notifications,
                    Filter::field_equals("sellerUid", "S2"),
                )),
                new_sink,
            )
            .await
            .unwrap();

        assert_eq!(replaced, Activation::Replaced);
        assert_eq!(gateway.active_subscriptions(), 1);
        while old_rx.try_recv().is_ok() {}

        gateway.apply_remote_set(
            Collection::Notifications,
            "n1",
            fields(json!({"sellerUid": "S1"})),
        );
        gateway.apply_remote_set(
            Collection::Notifications,
            "n2",
            fields(json!({"sellerUid": "S2"})),
        );

        assert!(next_delivery(&mut new_rx).await.is_ok());
        let latest = next_delivery(&mut new_rx).await.unwrap();
        assert_eq!(latest.documents[0].id, "n2");
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(old_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn stop_and_drop_release_every_query() {
        let gateway = MemoryGateway::new();
        let manager = manager(&gateway);
        let (sink, _rx) = channel_sink();
        manager
            .ensure(
                ViewId::Directory,
                Some(SubscriptionKey::all(Collection::Crops)),
                Arc::clone(&sink),
            )
            .await
            .unwrap();
        manager
            .ensure(
                ViewId::Profile,
                Some(SubscriptionKey::filtered(
                    Collection::Users,
                    Filter::Id("S1".to_string()),
                )),
                sink,
            )
            .await
            .unwrap();
        assert_eq!(gateway.active_subscriptions(), 2);

        assert_eq!(manager.stop(ViewId::Directory).await, Activation::Stopped);
        assert_eq!(manager.stop(ViewId::Directory).await, Activation::Idle);
        assert_eq!(gateway.active_subscriptions(), 1);

        drop(manager);
        assert_eq!(gateway.active_subscriptions(), 0);
    }

    #[tokio::test]
    async fn none_key_stops_view() {
        let gateway = MemoryGateway::new();
        let manager = manager(&gateway);
        let (sink, _rx) = channel_sink();
        manager
            .ensure(
                ViewId::Inventory,
                Some(SubscriptionKey::all(Collection::Crops)),
                Arc::clone(&sink),
            )
            .await
            .unwrap();

        let stopped = manager.ensure(ViewId::Inventory, None, Arc::clone(&sink)).await;
        let idle = manager.ensure(ViewId::Inventory, None, sink).await;

        assert_eq!(stopped, Ok(Activation::Stopped));
        assert_eq!(idle, Ok(Activation::Idle));
        assert_eq!(manager.active_count().await, 0);
    }

    #[derive(Clone, Debug, Default)]
    struct CountingState {
        status: ViewStatus,
        documents: usize,
        seed: Option<&'static str>,
    }

    impl LiveState for CountingState {
        fn status_mut(&mut self) -> &mut ViewStatus {
            &mut self.status
        }

        fn apply_snapshot(&mut self, snapshot: &Snapshot) {
            self.documents = snapshot.len();
        }

        fn clear(&mut self) {
            self.documents = 0;
            self.seed = None;
        }
    }

    #[tokio::test]
    async fn failed_query_stays_failed_until_retried() {
        let gateway = MemoryGateway::new();
        gateway.apply_remote_set(Collection::Crops, "c1", fields(json!({"name": "Okra"})));
        let manager = Arc::new(manager(&gateway));
        let binding = LiveBinding::new(ViewId::Directory, manager, CountingState::default());
        let mut state = binding.watch();
        let key = Some(SubscriptionKey::all(Collection::Crops));

        binding.bind(key.clone(), |_| {}).await.unwrap();
        timeout(Duration::from_secs(1), state.wait_for(|s| s.status.is_live()))
            .await
            .unwrap()
            .unwrap();

        gateway.break_live_queries(Collection::Crops, "connection reset");
        timeout(
            Duration::from_secs(1),
            state.wait_for(|s| matches!(s.status, ViewStatus::Failed(_))),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(state.borrow().documents, 1);

        let again = binding.bind(key.clone(), |_| {}).await.unwrap();
        assert_eq!(again, Activation::AlreadyActive);
        assert!(matches!(binding.watch().borrow().status, ViewStatus::Failed(_)));

        let retried = binding.retry(key, |_| {}).await.unwrap();
        assert_eq!(retried, Activation::Replaced);
        timeout(Duration::from_secs(1), state.wait_for(|s| s.status.is_live()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(gateway.active_subscriptions(), 1);
    }

    #[tokio::test]
    async fn refresh_leaves_inactive_view_alone_and_unbind_resets() {
        let gateway = MemoryGateway::new();
        let manager = Arc::new(manager(&gateway));
        let binding = LiveBinding::new(ViewId::Profile, manager, CountingState::default());
        let key = Some(SubscriptionKey::filtered(
            Collection::Users,
            Filter::Id("S1".to_string()),
        ));

        let idle = binding.refresh(key.clone(), |_| {}).await.unwrap();
        assert_eq!(idle, Activation::Idle);
        assert_eq!(gateway.active_subscriptions(), 0);

        binding.bind(key, |s| s.seed = Some("S1")).await.unwrap();
        assert_eq!(binding.watch().borrow().seed, Some("S1"));

        assert_eq!(binding.unbind().await, Activation::Stopped);
        let state = binding.watch().borrow().clone();
        assert_eq!(state.status, ViewStatus::Idle);
        assert_eq!(state.seed, None);
        assert_eq!(gateway.active_subscriptions(), 0);
    }
}
