//! Listing directory: every listing, narrowed by a local name search.

use std::sync::Arc;

use tokio::sync::watch;

use crate::lifecycle::{Activation, LiveBinding, LiveState, SubscriptionKey, SubscriptionManager, ViewId};
use crate::models::{filter_listings, Listing};
use crate::state::ViewStatus;
use crate::store::{Collection, Snapshot};
use crate::Result;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DirectoryView {
    pub status: ViewStatus,
    /// Latest snapshot, unfiltered
    pub listings: Vec<Listing>,
    pub query: String,
    /// `listings` filtered by `query`
    pub visible: Vec<Listing>,
}

impl DirectoryView {
    pub fn set_query(&mut self, query: impl Into<String>) {
        self.query = query.into();
        self.visible = filter_listings(&self.listings, &self.query);
    }

    pub fn find(&self, id: &str) -> Option<&Listing> {
        self.listings.iter().find(|listing| listing.id == id)
    }
}

impl LiveState for DirectoryView {
    fn status_mut(&mut self) -> &mut ViewStatus {
        &mut self.status
    }

    fn apply_snapshot(&mut self, snapshot: &Snapshot) {
        self.listings = snapshot.decode::<Listing>();
        self.visible = filter_listings(&self.listings, &self.query);
    }

    /// The search query outlives the subscription.
    fn clear(&mut self) {
        self.listings.clear();
        self.visible.clear();
    }
}

pub struct ListingDirectory {
    binding: LiveBinding<DirectoryView>,
}

impl ListingDirectory {
    pub fn new(manager: Arc<SubscriptionManager>) -> Self {
        Self {
            binding: LiveBinding::new(ViewId::Directory, manager, DirectoryView::default()),
        }
    }

    fn key() -> Option<SubscriptionKey> {
        Some(SubscriptionKey::all(Collection::Crops))
    }

    pub async fn activate(&self) -> Result<Activation> {
        self.binding.bind(Self::key(), |_| {}).await
    }

    pub async fn deactivate(&self) -> Activation {
        self.binding.unbind().await
    }

    pub async fn retry(&self) -> Result<Activation> {
        self.binding.retry(Self::key(), |_| {}).await
    }

    /// Re-filter the current snapshot; no query is opened or changed.
    pub fn set_query(&self, query: &str) {
        self.binding.state().send_if_modified(|view| {
            if view.query == query {
                return false;
            }
            view.set_query(query);
            true
        });
    }

    pub fn view(&self) -> DirectoryView {
        self.binding.state().borrow().clone()
    }

    pub fn visible(&self) -> Vec<Listing> {
        self.binding.state().borrow().visible.clone()
    }

    pub fn watch(&self) -> watch::Receiver<DirectoryView> {
        self.binding.watch()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;
    use serde_json::json;

    use crate::store::{encode_record, MemoryGateway};
    use crate::testing::{draft, fields, manager, user, wait_until};

    fn seed_listing(gateway: &MemoryGateway, id: &str, name: &str) {
        let owner = user("S1", "Asha");
        let listing = Listing::from_draft(&owner, &draft(name), "memory://farmflo/images/1");
        gateway.apply_remote_set(Collection::Crops, id, encode_record(&listing).unwrap());
    }

    fn names(listings: &[Listing]) -> Vec<&str> {
        listings.iter().map(|l| l.name.as_str()).collect()
    }

    #[tokio::test]
    async fn search_refilters_every_snapshot() {
        let gateway = MemoryGateway::new();
        seed_listing(&gateway, "c1", "Cherry Tomatoes");
        seed_listing(&gateway, "c2", "Onions");
        let directory = ListingDirectory::new(manager(&gateway));
        let mut view = directory.watch();

        directory.activate().await.unwrap();
        wait_until(&mut view, |v| v.listings.len() == 2).await;

        directory.set_query("TOMATO");
        assert_eq!(names(&directory.visible()), vec!["Cherry Tomatoes"]);

        seed_listing(&gateway, "c3", "Tomato seedlings");
        let updated = wait_until(&mut view, |v| v.listings.len() == 3).await;
        assert_eq!(names(&updated.visible), vec!["Cherry Tomatoes", "Tomato seedlings"]);

        directory.set_query("");
        assert_eq!(directory.visible().len(), 3);
    }

    #[tokio::test]
    async fn undecodable_documents_are_skipped() {
        let gateway = MemoryGateway::new();
        seed_listing(&gateway, "c1", "Okra");
        gateway.apply_remote_set(Collection::Crops, "broken", fields(json!({"name": 7})));
        let directory = ListingDirectory::new(manager(&gateway));
        let mut view = directory.watch();

        directory.activate().await.unwrap();
        let live = wait_until(&mut view, |v| v.status.is_live()).await;

        assert_eq!(names(&live.listings), vec!["Okra"]);
    }

    #[tokio::test]
    async fn repeated_activation_keeps_one_query() {
        let gateway = MemoryGateway::new();
        let directory = ListingDirectory::new(manager(&gateway));

        assert_eq!(directory.activate().await, Ok(Activation::Started));
        assert_eq!(directory.activate().await, Ok(Activation::AlreadyActive));
        assert_eq!(gateway.active_subscriptions(), 1);

        assert_eq!(directory.deactivate().await, Activation::Stopped);
        assert_eq!(gateway.active_subscriptions(), 0);
        assert_eq!(directory.view().status, ViewStatus::Idle);
    }
}
