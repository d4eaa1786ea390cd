//! Inventory view: the signed-in seller's own listings.
//!
//! Creation uploads the photo first and writes the listing second. The two
//! steps are not transactional: when the write fails the uploaded object is
//! left behind and only logged.

use std::sync::Arc;

use tokio::sync::watch;

use crate::lifecycle::{Activation, LiveBinding, LiveState, SubscriptionKey, SubscriptionManager, ViewId};
use crate::models::{Listing, ListingDraft};
use crate::session::SessionHandle;
use crate::state::{Notice, PendingRemovals, ViewStatus};
use crate::storage::ObjectStore;
use crate::store::{insert, Collection, Filter, RemoteGateway, Snapshot};
use crate::Result;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InventoryState {
    pub status: ViewStatus,
    /// Latest snapshot of the seller's listings
    pub snapshot: Vec<Listing>,
    /// Snapshot minus optimistically deleted listings
    pub listings: Vec<Listing>,
    pub pending_deletes: PendingRemovals,
    /// Creates and deletes still waiting for the store
    pub pending_writes: usize,
    pub notice: Option<Notice>,
}

impl InventoryState {
    fn contains(&self, id: &str) -> bool {
        self.snapshot.iter().any(|listing| listing.id == id)
    }

    fn rebuild(&mut self) {
        let hidden = &self.pending_deletes;
        self.listings = self
            .snapshot
            .iter()
            .filter(|listing| !hidden.hides(&listing.id))
            .cloned()
            .collect();
    }
}

impl LiveState for InventoryState {
    fn status_mut(&mut self) -> &mut ViewStatus {
        &mut self.status
    }

    fn apply_snapshot(&mut self, snapshot: &Snapshot) {
        self.snapshot = snapshot.decode::<Listing>();
        let present: Vec<String> = self.snapshot.iter().map(|l| l.id.clone()).collect();
        self.pending_deletes
            .settle(|id| present.iter().any(|present| present == id));
        self.rebuild();
    }

    fn clear(&mut self) {
        self.snapshot.clear();
        self.listings.clear();
        self.pending_deletes = PendingRemovals::default();
        self.notice = None;
    }
}

pub struct InventoryView {
    binding: LiveBinding<InventoryState>,
    gateway: Arc<dyn RemoteGateway>,
    objects: Arc<dyn ObjectStore>,
    session: SessionHandle,
}

impl InventoryView {
    pub fn new(
        gateway: Arc<dyn RemoteGateway>,
        objects: Arc<dyn ObjectStore>,
        manager: Arc<SubscriptionManager>,
        session: SessionHandle,
    ) -> Self {
        Self {
            binding: LiveBinding::new(ViewId::Inventory, manager, InventoryState::default()),
            gateway,
            objects,
            session,
        }
    }

    fn key(&self) -> Option<SubscriptionKey> {
        self.session.current_user().map(|user| {
            SubscriptionKey::filtered(Collection::Crops, Filter::field_equals("ownerUid", user.uid))
        })
    }

    pub async fn activate(&self) -> Result<Activation> {
        self.binding.bind(self.key(), |_| {}).await
    }

    pub async fn deactivate(&self) -> Activation {
        self.binding.unbind().await
    }

    pub async fn refresh(&self) -> Result<Activation> {
        self.binding.refresh(self.key(), |_| {}).await
    }

    pub async fn retry(&self) -> Result<Activation> {
        self.binding.retry(self.key(), |_| {}).await
    }

    /// Upload the draft's photo, then write the listing. Returns the new id.
    pub async fn create(&self, draft: ListingDraft) -> Result<String> {
        draft.validate()?;
        let owner = self.session.require_user()?;
        self.update(|state| state.pending_writes += 1);

        let photo_url = match self
            .objects
            .upload(&draft.photo.bytes, &draft.photo.content_type)
            .await
        {
            Ok(url) => url,
            Err(error) => {
                tracing::warn!("Photo upload for {} failed: {}", draft.name, error);
                self.settle_write("create listing", Some(error.clone()));
                return Err(error);
            }
        };

        let listing = Listing::from_draft(&owner, &draft, photo_url);
        match insert(self.gateway.as_ref(), &listing).await {
            Ok(id) => {
                tracing::info!("Created listing {} ({}) for {}", id, listing.name, owner.uid);
                self.settle_write("create listing", None);
                Ok(id)
            }
            Err(error) => {
                tracing::warn!(
                    "Listing write failed after upload; object {} is orphaned: {}",
                    listing.photo_url,
                    error
                );
                self.settle_write("create listing", Some(error.clone()));
                Err(error)
            }
        }
    }

    /// Hide the listing at once, then delete it from the store.
    ///
    /// An already-absent listing counts as deleted. On failure the listing
    /// reappears and the error is recorded as the notice.
    pub async fn delete(&self, id: &str) -> Result<()> {
        let mut started = false;
        self.update(|state| {
            started = state.pending_deletes.begin(id);
            if started {
                state.pending_writes += 1;
                state.rebuild();
            }
        });
        if !started {
            tracing::debug!("Delete of listing {} already in flight", id);
            return Ok(());
        }

        let result = match self.gateway.delete(Collection::Crops, id).await {
            Err(error) if error.is_not_found() => Ok(()),
            other => other,
        };
        self.update(|state| {
            state.pending_writes = state.pending_writes.saturating_sub(1);
            match &result {
                Ok(()) => {
                    let present = state.contains(id);
                    state.pending_deletes.acknowledge(id, present);
                }
                Err(error) => {
                    state.pending_deletes.restore(id);
                    state.notice = Some(Notice::new("delete listing", error.clone()));
                }
            }
            state.rebuild();
        });
        match &result {
            Ok(()) => tracing::debug!("Deleted listing {}", id),
            Err(error) => tracing::warn!("Delete of listing {} failed: {}", id, error),
        }
        result
    }

    pub fn state(&self) -> InventoryState {
        self.binding.state().borrow().clone()
    }

    pub fn listings(&self) -> Vec<Listing> {
        self.binding.state().borrow().listings.clone()
    }

    pub fn take_notice(&self) -> Option<Notice> {
        let mut notice = None;
        self.binding.state().send_if_modified(|state| {
            notice = state.notice.take();
            notice.is_some()
        });
        notice
    }

    pub fn watch(&self) -> watch::Receiver<InventoryState> {
        self.binding.watch()
    }

    fn update(&self, modify: impl FnOnce(&mut InventoryState)) {
        self.binding.state().send_modify(modify);
    }

    fn settle_write(&self, action: &'static str, error: Option<crate::Error>) {
        self.update(|state| {
            state.pending_writes = state.pending_writes.saturating_sub(1);
            if let Some(error) = error {
                state.notice = Some(Notice::new(action, error));
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;
    use rust_decimal::Decimal;

    use crate::storage::MemoryObjectStore;
    use crate::store::MemoryGateway;
    use crate::testing::{draft, manager, seed_user, signed_in, wait_until};
    use crate::Error;

    struct Fixture {
        gateway: MemoryGateway,
        objects: MemoryObjectStore,
        inventory: InventoryView,
    }

    async fn seller_inventory() -> Fixture {
        let gateway = MemoryGateway::new();
        let objects = MemoryObjectStore::new();
        seed_user(&gateway, "S1", "Asha");
        let resolver = signed_in(&gateway, "S1").await;
        let inventory = InventoryView::new(
            Arc::new(gateway.clone()),
            Arc::new(objects.clone()),
            manager(&gateway),
            resolver.handle(),
        );
        inventory.activate().await.unwrap();
        wait_until(&mut inventory.watch(), |s| s.status.is_live()).await;
        Fixture {
            gateway,
            objects,
            inventory,
        }
    }

    #[tokio::test]
    async fn create_uploads_then_writes_denormalised_listing() {
        let fixture = seller_inventory().await;

        let id = fixture.inventory.create(draft("Tomatoes")).await.unwrap();

        let state = wait_until(&mut fixture.inventory.watch(), |s| s.listings.len() == 1).await;
        let listing = &state.listings[0];
        assert_eq!(listing.id, id);
        assert_eq!(listing.owner_uid, "S1");
        assert_eq!(listing.seller_name, "Asha");
        assert_eq!(listing.seller_contact, "98200-S1");
        assert_eq!(listing.price_per_unit, Decimal::new(20, 0));
        assert_eq!(listing.available_quantity, 50);
        assert!(fixture.objects.get(&listing.photo_url).is_some());
        assert_eq!(state.pending_writes, 0);
    }

    #[tokio::test]
    async fn failed_upload_writes_nothing() {
        let fixture = seller_inventory().await;
        fixture.objects.fail_uploads("quota exceeded");

        let result = fixture.inventory.create(draft("Tomatoes")).await;

        assert_eq!(result, Err(Error::Upload("quota exceeded".to_string())));
        assert_eq!(fixture.gateway.document_count(Collection::Crops), 0);
        assert_eq!(fixture.inventory.take_notice().unwrap().action, "create listing");
    }

    #[tokio::test]
    async fn failed_write_after_upload_leaves_orphan_object() {
        let fixture = seller_inventory().await;
        fixture.gateway.fail_writes("permission denied");

        let result = fixture.inventory.create(draft("Tomatoes")).await;

        assert!(matches!(result, Err(Error::Write(_))));
        assert_eq!(fixture.objects.object_count(), 1);
        assert_eq!(fixture.inventory.state().pending_writes, 0);
    }

    #[tokio::test]
    async fn other_sellers_listings_are_not_shown() {
        let fixture = seller_inventory().await;
        let other = seed_user(&fixture.gateway, "S2", "Bala");
        let foreign = Listing::from_draft(&other, &draft("Okra"), "memory://x");
        insert(&fixture.gateway, &foreign).await.unwrap();
        fixture.inventory.create(draft("Tomatoes")).await.unwrap();

        let state = wait_until(&mut fixture.inventory.watch(), |s| s.listings.len() == 1).await;
        assert_eq!(state.listings[0].name, "Tomatoes");
    }

    #[tokio::test]
    async fn delete_is_optimistic_and_idempotent() {
        let fixture = seller_inventory().await;
        let id = fixture.inventory.create(draft("Tomatoes")).await.unwrap();
        wait_until(&mut fixture.inventory.watch(), |s| s.listings.len() == 1).await;

        fixture.gateway.pause_writes();
        let pending = {
            let inventory = &fixture.inventory;
            let id = id.clone();
            async move { inventory.delete(&id).await }
        };
        let (result, hidden) = tokio::join!(pending, async {
            let hidden = wait_until(&mut fixture.inventory.watch(), |s| s.pending_writes == 1).await;
            fixture.gateway.resume_writes();
            hidden
        });
        assert!(hidden.listings.is_empty());
        assert_eq!(hidden.snapshot.len(), 1);
        assert_eq!(result, Ok(()));

        assert_eq!(fixture.inventory.delete(&id).await, Ok(()));
        let settled = wait_until(&mut fixture.inventory.watch(), |s| s.snapshot.is_empty()).await;
        assert!(settled.pending_deletes.is_empty());
        assert_eq!(fixture.inventory.take_notice(), None);
    }

    #[tokio::test]
    async fn failed_delete_restores_listing() {
        let fixture = seller_inventory().await;
        let id = fixture.inventory.create(draft("Tomatoes")).await.unwrap();
        wait_until(&mut fixture.inventory.watch(), |s| s.listings.len() == 1).await;
        fixture.gateway.fail_writes("offline");

        let result = fixture.inventory.delete(&id).await;

        assert_eq!(result, Err(Error::Write("offline".to_string())));
        let state = fixture.inventory.state();
        assert_eq!(state.listings.len(), 1);
        assert!(state.pending_deletes.is_empty());
        assert_eq!(fixture.inventory.take_notice().unwrap().action, "delete listing");
    }
}
