//! Cancellable live query handles.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use super::collection::Delivery;

/// Identifier of one open live query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Idempotent cancellation for a live query.
///
/// The release callback runs at most once, no matter how many clones call
/// [`CancelHandle::cancel`].
#[derive(Clone)]
pub struct CancelHandle {
    cancelled: Arc<AtomicBool>,
    release: Arc<dyn Fn() + Send + Sync>,
}

impl CancelHandle {
    pub fn new(release: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            release: Arc::new(release),
        }
    }

    /// Stop delivery and release backend resources.
    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            (self.release)();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for CancelHandle {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("CancelHandle")
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// Push-based stream of full snapshots for one live query.
///
/// Dropping the handle cancels the query.
#[derive(Debug)]
pub struct LiveQuery {
    id: SubscriptionId,
    deliveries: mpsc::UnboundedReceiver<Delivery>,
    cancel: CancelHandle,
}

impl LiveQuery {
    pub const fn new(
        id: SubscriptionId,
        deliveries: mpsc::UnboundedReceiver<Delivery>,
        cancel: CancelHandle,
    ) -> Self {
        Self {
            id,
            deliveries,
            cancel,
        }
    }

    pub const fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Next delivery, or `None` once the query is cancelled or closed.
    ///
    /// Deliveries still buffered at cancellation time are discarded.
    pub async fn next(&mut self) -> Option<Delivery> {
        if self.cancel.is_cancelled() {
            return None;
        }
        let delivery = self.deliveries.recv().await?;
        if self.cancel.is_cancelled() {
            None
        } else {
            Some(delivery)
        }
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

impl Drop for LiveQuery {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    use crate::store::Snapshot;

    #[test]
    fn cancel_releases_once() {
        let releases = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&releases);
        let handle = CancelHandle::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let clone = handle.clone();

        handle.cancel();
        clone.cancel();
        handle.cancel();

        assert!(clone.is_cancelled());
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancelled_query_stops_yielding_buffered_snapshots() {
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut query = LiveQuery::new(SubscriptionId(7), receiver, CancelHandle::new(|| {}));
        sender.send(Ok(Snapshot::default())).unwrap();
        sender.send(Ok(Snapshot::default())).unwrap();

        assert!(query.next().await.is_some());
        query.cancel();
        assert!(query.next().await.is_none());
    }
}
