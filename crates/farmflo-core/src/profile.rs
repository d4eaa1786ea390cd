//! Profile store: the signed-in user's record with optimistic edits.
//!
//! The displayed profile is always the latest authoritative snapshot (or the
//! session's user before the first snapshot) with every still-pending overlay
//! applied on top, in local apply order.

use std::sync::Arc;

use tokio::sync::watch;

use crate::lifecycle::{Activation, LiveBinding, LiveState, SubscriptionKey, SubscriptionManager, ViewId};
use crate::models::{User, UserPatch};
use crate::session::SessionHandle;
use crate::state::{Notice, ViewStatus};
use crate::store::{Collection, Filter, RemoteGateway, Snapshot};
use crate::{Error, Result};

/// One optimistic edit, kept until a snapshot carries it or its write fails.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingPatch {
    pub seq: u64,
    pub patch: UserPatch,
    /// The write succeeded
    pub acknowledged: bool,
    /// Confirmed record when the write was acknowledged
    pub baseline: Option<User>,
}

impl PendingPatch {
    /// Whether `user` shows the store at or past this edit.
    fn settled_by(&self, user: &User) -> bool {
        if self.patch.is_reflected_in(user) {
            return true;
        }
        self.acknowledged
            && self
                .baseline
                .as_ref()
                .is_some_and(|baseline| !self.patch.same_touched_values(baseline, user))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProfileState {
    pub status: ViewStatus,
    pub uid: Option<String>,
    /// Session user shown until the first snapshot lands
    pub seed: Option<User>,
    pub authoritative: Option<User>,
    pub overlays: Vec<PendingPatch>,
    pub displayed: Option<User>,
    pub notice: Option<Notice>,
    next_seq: u64,
}

impl ProfileState {
    /// Apply `patch` on top of the displayed profile and return its sequence.
    pub fn begin(&mut self, patch: UserPatch) -> u64 {
        self.next_seq += 1;
        let seq = self.next_seq;
        self.overlays.push(PendingPatch {
            seq,
            patch,
            acknowledged: false,
            baseline: None,
        });
        self.recompute();
        seq
    }

    /// Mark the write of `seq` as succeeded.
    ///
    /// Without a live query the edit is folded into the confirmed record,
    /// since no snapshot will carry it.
    pub fn acknowledge(&mut self, seq: u64) {
        let unsubscribed = !self.status.is_live() && self.status != ViewStatus::Loading;
        let Some(position) = self.overlays.iter().position(|o| o.seq == seq) else {
            return;
        };
        let reflected = self
            .authoritative
            .as_ref()
            .is_some_and(|user| self.overlays[position].patch.is_reflected_in(user));
        if unsubscribed {
            let overlay = self.overlays.remove(position);
            if let Some(user) = self.authoritative.as_mut().or(self.seed.as_mut()) {
                overlay.patch.apply_to(user);
            }
        } else if reflected {
            self.overlays.remove(position);
        } else {
            let overlay = &mut self.overlays[position];
            overlay.acknowledged = true;
            overlay.baseline = self.authoritative.clone();
        }
        self.recompute();
    }

    /// Drop the overlay of a failed write. Other overlays stay applied.
    pub fn fail(&mut self, seq: u64) -> bool {
        let before = self.overlays.len();
        self.overlays.retain(|overlay| overlay.seq != seq);
        self.recompute();
        self.overlays.len() != before
    }

    /// Take a confirmed profile from the live query.
    pub fn receive(&mut self, user: User) {
        self.overlays.retain(|overlay| !overlay.settled_by(&user));
        self.authoritative = Some(user);
        self.recompute();
    }

    pub fn take_notice(&mut self) -> Option<Notice> {
        self.notice.take()
    }

    /// Edits whose writes have not been acknowledged yet.
    pub fn pending_writes(&self) -> usize {
        self.overlays.iter().filter(|o| !o.acknowledged).count()
    }

    fn recompute(&mut self) {
        let mut displayed = self.authoritative.clone().or_else(|| self.seed.clone());
        if let Some(user) = displayed.as_mut() {
            for overlay in &self.overlays {
                overlay.patch.apply_to(user);
            }
        }
        self.displayed = displayed;
    }
}

impl LiveState for ProfileState {
    fn status_mut(&mut self) -> &mut ViewStatus {
        &mut self.status
    }

    fn apply_snapshot(&mut self, snapshot: &Snapshot) {
        let users = snapshot.decode::<User>();
        let found = match &self.uid {
            Some(uid) => users.into_iter().find(|user| &user.uid == uid),
            None => users.into_iter().next(),
        };
        match found {
            Some(user) => self.receive(user),
            None => tracing::warn!(
                "Profile snapshot for {} is empty; keeping last known record",
                self.uid.as_deref().unwrap_or("<none>")
            ),
        }
    }

    fn clear(&mut self) {
        self.uid = None;
        self.seed = None;
        self.authoritative = None;
        self.overlays.clear();
        self.displayed = None;
        self.notice = None;
    }
}

pub struct ProfileStore {
    binding: LiveBinding<ProfileState>,
    gateway: Arc<dyn RemoteGateway>,
    session: SessionHandle,
}

impl ProfileStore {
    pub fn new(
        gateway: Arc<dyn RemoteGateway>,
        manager: Arc<SubscriptionManager>,
        session: SessionHandle,
    ) -> Self {
        Self {
            binding: LiveBinding::new(ViewId::Profile, manager, ProfileState::default()),
            gateway,
            session,
        }
    }

    fn dependencies(&self) -> (Option<SubscriptionKey>, impl FnOnce(&mut ProfileState) + Send) {
        let seed = self.session.current_user();
        let key = seed
            .as_ref()
            .map(|user| SubscriptionKey::filtered(Collection::Users, Filter::Id(user.uid.clone())));
        let prepare = move |state: &mut ProfileState| {
            state.uid = seed.as_ref().map(|user| user.uid.clone());
            state.seed = seed;
            state.recompute();
        };
        (key, prepare)
    }

    /// Start following the signed-in user's profile document.
    pub async fn activate(&self) -> Result<Activation> {
        let (key, prepare) = self.dependencies();
        self.binding.bind(key, prepare).await
    }

    pub async fn deactivate(&self) -> Activation {
        self.binding.unbind().await
    }

    /// Re-key after a session change; a signed-out session stops the query.
    pub async fn refresh(&self) -> Result<Activation> {
        let (key, prepare) = self.dependencies();
        self.binding.refresh(key, prepare).await
    }

    pub async fn retry(&self) -> Result<Activation> {
        let (key, prepare) = self.dependencies();
        self.binding.retry(key, prepare).await
    }

    /// Optimistically apply `patch` and write it to the user's document.
    ///
    /// On failure exactly this call's overlay is reverted and
    /// [`Error::ProfileUpdateFailed`] is returned and recorded as the notice.
    pub async fn update_profile(&self, patch: UserPatch) -> Result<()> {
        patch.validate()?;
        if patch.is_empty() {
            return Ok(());
        }
        let uid = self.session.require_user()?.uid;
        let touched = patch.touched_fields();
        let document = patch.to_document()?;

        let mut seq = 0;
        self.binding
            .state()
            .send_modify(|state| seq = state.begin(patch));

        match self.gateway.update(Collection::Users, &uid, document).await {
            Ok(()) => {
                tracing::debug!("Profile update {} for {} acknowledged", seq, uid);
                self.binding
                    .state()
                    .send_modify(|state| state.acknowledge(seq));
                Ok(())
            }
            Err(error) => {
                tracing::warn!("Profile update for {} failed: {}", uid, error);
                let failure = Error::ProfileUpdateFailed {
                    fields: touched,
                    reason: error.to_string(),
                };
                self.binding.state().send_modify(|state| {
                    state.fail(seq);
                    state.notice = Some(Notice::new("update profile", failure.clone()));
                });
                Err(failure)
            }
        }
    }

    pub fn state(&self) -> ProfileState {
        self.binding.state().borrow().clone()
    }

    pub fn displayed(&self) -> Option<User> {
        self.binding.state().borrow().displayed.clone()
    }

    pub fn take_notice(&self) -> Option<Notice> {
        let mut notice = None;
        self.binding.state().send_if_modified(|state| {
            notice = state.take_notice();
            notice.is_some()
        });
        notice
    }

    pub fn watch(&self) -> watch::Receiver<ProfileState> {
        self.binding.watch()
    }
}
