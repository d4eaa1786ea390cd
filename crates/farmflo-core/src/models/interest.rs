//! Interest notification model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::timestamp::store_time;
use super::{Listing, User};
use crate::store::{Collection, Record};

const ANONYMOUS_BUYER: &str = "Anonymous";

/// A buyer's interest in a listing, addressed to the listing's seller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Interest {
    /// Store-assigned document key
    #[serde(skip)]
    pub id: String,
    pub buyer_uid: String,
    pub buyer_name: String,
    #[serde(default)]
    pub buyer_contact: String,
    pub listing_id: String,
    pub listing_name: String,
    pub seller_uid: String,
    #[serde(with = "store_time")]
    pub timestamp: DateTime<Utc>,
}

impl Interest {
    pub fn for_listing(buyer: &User, listing: &Listing, now: DateTime<Utc>) -> Self {
        let buyer_name = if buyer.name.trim().is_empty() {
            ANONYMOUS_BUYER.to_string()
        } else {
            buyer.name.clone()
        };
        Self {
            id: String::new(),
            buyer_uid: buyer.uid.clone(),
            buyer_name,
            buyer_contact: buyer.phone_number.clone().unwrap_or_default(),
            listing_id: listing.id.clone(),
            listing_name: listing.name.clone(),
            seller_uid: listing.owner_uid.clone(),
            timestamp: now,
        }
    }
}

impl Record for Interest {
    const COLLECTION: Collection = Collection::Notifications;

    fn assign_id(&mut self, id: &str) {
        self.id = id.to_string();
    }
}

/// Newest first; equal timestamps fall back to document key order.
pub fn sort_recent_first(interests: &mut [Interest]) {
    interests.sort_by(|a, b| {
        b.timestamp
            .cmp(&a.timestamp)
            .then_with(|| a.id.cmp(&b.id))
    });
}
