//! Interest channel: notifications addressed to the signed-in seller.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::watch;

use crate::lifecycle::{Activation, LiveBinding, LiveState, SubscriptionKey, SubscriptionManager, ViewId};
use crate::models::{sort_recent_first, Interest, Listing};
use crate::session::SessionHandle;
use crate::state::{Notice, PendingRemovals, ViewStatus};
use crate::store::{insert, Collection, Filter, RemoteGateway, Snapshot};
use crate::{Error, Result};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InterestState {
    pub status: ViewStatus,
    /// Latest snapshot, newest first
    pub snapshot: Vec<Interest>,
    /// Snapshot minus optimistically dismissed interests
    pub interests: Vec<Interest>,
    pub pending_dismissals: PendingRemovals,
    pub notice: Option<Notice>,
}

impl InterestState {
    pub fn count(&self) -> usize {
        self.interests.len()
    }

    fn contains(&self, id: &str) -> bool {
        self.snapshot.iter().any(|interest| interest.id == id)
    }

    fn rebuild(&mut self) {
        let hidden = &self.pending_dismissals;
        self.interests = self
            .snapshot
            .iter()
            .filter(|interest| !hidden.hides(&interest.id))
            .cloned()
            .collect();
    }
}

impl LiveState for InterestState {
    fn status_mut(&mut self) -> &mut ViewStatus {
        &mut self.status
    }

    fn apply_snapshot(&mut self, snapshot: &Snapshot) {
        let mut interests = snapshot.decode::<Interest>();
        sort_recent_first(&mut interests);
        self.snapshot = interests;
        let current = &self.snapshot;
        self.pending_dismissals
            .settle(|id| current.iter().any(|interest| interest.id == id));
        self.rebuild();
    }

    fn clear(&mut self) {
        self.snapshot.clear();
        self.interests.clear();
        self.pending_dismissals = PendingRemovals::default();
        self.notice = None;
    }
}

pub struct InterestChannel {
    binding: LiveBinding<InterestState>,
    gateway: Arc<dyn RemoteGateway>,
    session: SessionHandle,
}

impl InterestChannel {
    pub fn new(
        gateway: Arc<dyn RemoteGateway>,
        manager: Arc<SubscriptionManager>,
        session: SessionHandle,
    ) -> Self {
        Self {
            binding: LiveBinding::new(ViewId::Interests, manager, InterestState::default()),
            gateway,
            session,
        }
    }

    fn key(&self) -> Option<SubscriptionKey> {
        self.session.current_user().map(|user| {
            SubscriptionKey::filtered(
                Collection::Notifications,
                Filter::field_equals("sellerUid", user.uid),
            )
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

    /// Notify the listing's seller that the signed-in user is interested.
    ///
    /// Interest in one's own listing is rejected without touching the store.
    /// Rejections and write failures are also recorded as the notice.
    pub async fn post_interest(&self, listing: &Listing) -> Result<String> {
        let buyer = self.session.require_user()?;
        if listing.is_owned_by(&buyer.uid) {
            tracing::debug!("Rejected self-interest on listing {}", listing.id);
            return Err(self.record_failure(Error::SelfInterestRejected {
                listing_id: listing.id.clone(),
            }));
        }
        let interest = Interest::for_listing(&buyer, listing, Utc::now());
        let id = match insert(self.gateway.as_ref(), &interest).await {
            Ok(id) => id,
            Err(error) => {
                tracing::warn!("Interest on listing {} failed: {}", listing.id, error);
                return Err(self.record_failure(error));
            }
        };
        tracing::info!(
            "{} posted interest {} on listing {} for seller {}",
            buyer.uid,
            id,
            listing.id,
            listing.owner_uid
        );
        Ok(id)
    }

    fn record_failure(&self, error: Error) -> Error {
        self.binding.state().send_modify(|state| {
            state.notice = Some(Notice::new("notify seller", error.clone()));
        });
        error
    }

    /// Remove an interest from the seller's channel.
    ///
    /// A record already deleted elsewhere counts as dismissed.
    pub async fn dismiss(&self, id: &str) -> Result<()> {
        let mut started = false;
        self.binding.state().send_modify(|state| {
            started = state.pending_dismissals.begin(id);
            state.rebuild();
        });
        if !started {
            return Ok(());
        }

        let result = match self.gateway.delete(Collection::Notifications, id).await {
            Err(error) if error.is_not_found() => Ok(()),
            other => other,
        };
        self.binding.state().send_modify(|state| {
            match &result {
                Ok(()) => {
                    let present = state.contains(id);
                    state.pending_dismissals.acknowledge(id, present);
                }
                Err(error) => {
                    state.pending_dismissals.restore(id);
                    state.notice = Some(Notice::new("dismiss interest", error.clone()));
                }
            }
            state.rebuild();
        });
        if let Err(error) = &result {
            tracing::warn!("Dismissing interest {} failed: {}", id, error);
        }
        result
    }

    pub fn state(&self) -> InterestState {
        self.binding.state().borrow().clone()
    }

    pub fn interests(&self) -> Vec<Interest> {
        self.binding.state().borrow().interests.clone()
    }

    /// Number of interests currently shown to the seller.
    pub fn count(&self) -> usize {
        self.binding.state().borrow().count()
    }

    pub fn take_notice(&self) -> Option<Notice> {
        let mut notice = None;
        self.binding.state().send_if_modified(|state| {
            notice = state.notice.take();
            notice.is_some()
        });
        notice
    }

    pub fn watch(&self) -> watch::Receiver<InterestState> {
        self.binding.watch()
    }
}
