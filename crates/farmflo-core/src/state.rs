//! Shared view state types.

use std::collections::BTreeMap;

use crate::Error;

/// Lifecycle of one live view.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum ViewStatus {
    /// No live query open
    #[default]
    Idle,
    /// Live query opened, first snapshot not yet applied
    Loading,
    Live,
    /// Live query failed; last good data is kept until the view is retried
    Failed(String),
}

impl ViewStatus {
    pub const fn is_live(&self) -> bool {
        matches!(self, Self::Live)
    }
}

/// One-shot failure surfaced at the point of the failing action.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notice {
    pub action: &'static str,
    pub error: Error,
}

impl Notice {
    pub const fn new(action: &'static str, error: Error) -> Self {
        Self { action, error }
    }
}

/// Records hidden locally while their delete is in flight.
///
/// A hidden id is shown again only when its delete fails. After a successful
/// delete it stays hidden until a snapshot no longer carries it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PendingRemovals {
    acknowledged: BTreeMap<String, bool>,
}

impl PendingRemovals {
    /// Hide `id`. Returns false when a delete for it is already pending.
    pub fn begin(&mut self, id: &str) -> bool {
        if self.acknowledged.contains_key(id) {
            return false;
        }
        self.acknowledged.insert(id.to_string(), false);
        true
    }

    /// Mark the delete of `id` as confirmed by the store.
    pub fn acknowledge(&mut self, id: &str, still_in_snapshot: bool) {
        if still_in_snapshot {
            if let Some(acknowledged) = self.acknowledged.get_mut(id) {
                *acknowledged = true;
            }
        } else {
            self.acknowledged.remove(id);
        }
    }

    /// Show `id` again after a failed delete.
    pub fn restore(&mut self, id: &str) {
        self.acknowledged.remove(id);
    }

    /// Forget confirmed deletes the latest snapshot no longer carries.
    pub fn settle(&mut self, present: impl Fn(&str) -> bool) {
        self.acknowledged
            .retain(|id, acknowledged| !*acknowledged || present(id.as_str()));
    }

    pub fn hides(&self, id: &str) -> bool {
        self.acknowledged.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.acknowledged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.acknowledged.is_empty()
    }
}
