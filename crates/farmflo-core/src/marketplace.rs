//! One device's marketplace: session, views, and the tasks that tie them.
//!
//! `start` follows the Identity Provider stream. When the resolved user
//! changes, every active view that depends on it is re-keyed; the profile's
//! confirmed record is fed back into the session so new listings and
//! interests carry the latest profile fields.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::directory::ListingDirectory;
use crate::identity::{Identity, IdentityEvents};
use crate::interests::InterestChannel;
use crate::inventory::InventoryView;
use crate::lifecycle::SubscriptionManager;
use crate::models::{Registration, User};
use crate::profile::ProfileStore;
use crate::session::{SessionHandle, SessionResolver};
use crate::storage::ObjectStore;
use crate::store::RemoteGateway;
use crate::Result;

pub struct Marketplace {
    manager: Arc<SubscriptionManager>,
    resolver: Arc<SessionResolver>,
    profile: Arc<ProfileStore>,
    directory: Arc<ListingDirectory>,
    inventory: Arc<InventoryView>,
    interests: Arc<InterestChannel>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Marketplace {
    pub fn new(gateway: Arc<dyn RemoteGateway>, objects: Arc<dyn ObjectStore>) -> Self {
        let manager = Arc::new(SubscriptionManager::new(Arc::clone(&gateway)));
        let resolver = Arc::new(SessionResolver::new(Arc::clone(&gateway)));
        let session = resolver.handle();
        Self {
            profile: Arc::new(ProfileStore::new(
                Arc::clone(&gateway),
                Arc::clone(&manager),
                session.clone(),
            )),
            directory: Arc::new(ListingDirectory::new(Arc::clone(&manager))),
            inventory: Arc::new(InventoryView::new(
                Arc::clone(&gateway),
                objects,
                Arc::clone(&manager),
                session.clone(),
            )),
            interests: Arc::new(InterestChannel::new(
                gateway,
                Arc::clone(&manager),
                session,
            )),
            manager,
            resolver,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Follow `identities` and keep dependent views keyed to the session.
    pub fn start(&self, identities: IdentityEvents) {
        let listener = self.resolver.spawn_listener(identities);
        let dependencies = self.spawn_dependency_watcher();
        let bridge = self.spawn_profile_bridge();
        self.tasks.lock().extend([listener, dependencies, bridge]);
    }

    pub fn session(&self) -> SessionHandle {
        self.resolver.handle()
    }

    pub fn resolver(&self) -> &Arc<SessionResolver> {
        &self.resolver
    }

    pub fn profile(&self) -> &ProfileStore {
        &self.profile
    }

    pub fn directory(&self) -> &ListingDirectory {
        &self.directory
    }

    pub fn inventory(&self) -> &InventoryView {
        &self.inventory
    }

    pub fn interests(&self) -> &InterestChannel {
        &self.interests
    }

    /// Create the profile for a freshly signed-up identity.
    pub async fn register(&self, identity: &Identity, registration: Registration) -> Result<User> {
        self.resolver.register(identity, registration).await
    }

    /// Re-key every active view that depends on the session user.
    pub async fn refresh_views(&self) {
        refresh_dependents(&self.profile, &self.inventory, &self.interests).await;
    }

    /// Stop background tasks and every live query.
    pub async fn shutdown(&self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        self.profile.deactivate().await;
        self.directory.deactivate().await;
        self.inventory.deactivate().await;
        self.interests.deactivate().await;
        self.manager.stop_all().await;
        tracing::debug!("Marketplace shut down");
    }

    fn spawn_dependency_watcher(&self) -> JoinHandle<()> {
        let mut session = self.resolver.handle().watch();
        let profile = Arc::clone(&self.profile);
        let inventory = Arc::clone(&self.inventory);
        let interests = Arc::clone(&self.interests);
        tokio::spawn(async move {
            let mut ready_uid: Option<String> = None;
            loop {
                let uid = session
                    .borrow_and_update()
                    .user()
                    .map(|user| user.uid.clone());
                if uid != ready_uid {
                    tracing::debug!("Session user changed to {:?}", uid);
                    ready_uid = uid;
                    refresh_dependents(&profile, &inventory, &interests).await;
                }
                if session.changed().await.is_err() {
                    break;
                }
            }
        })
    }

    fn spawn_profile_bridge(&self) -> JoinHandle<()> {
        let mut profile = self.profile.watch();
        let resolver = Arc::clone(&self.resolver);
        tokio::spawn(async move {
            loop {
                let confirmed = profile.borrow_and_update().authoritative.clone();
                if let Some(user) = confirmed {
                    if resolver.refresh_user(user) {
                        tracing::debug!("Session user refreshed from profile snapshot");
                    }
                }
                if profile.changed().await.is_err() {
                    break;
                }
            }
        })
    }
}

impl Drop for Marketplace {
    fn drop(&mut self) {
        for task in self.tasks.get_mut().drain(..) {
            task.abort();
        }
    }
}

async fn refresh_dependents(
    profile: &ProfileStore,
    inventory: &InventoryView,
    interests: &InterestChannel,
) {
    if let Err(error) = profile.refresh().await {
        tracing::warn!("Profile view could not follow session: {}", error);
    }
    if let Err(error) = inventory.refresh().await {
        tracing::warn!("Inventory view could not follow session: {}", error);
    }
    if let Err(error) = interests.refresh().await {
        tracing::warn!("Interest view could not follow session: {}", error);
    }
}
