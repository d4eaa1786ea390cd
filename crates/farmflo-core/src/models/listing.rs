//! Crop listing model

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::timestamp::store_date;
use super::User;
use crate::store::{Collection, Record};
use crate::{Error, Result};

/// A crop offered for sale.
///
/// `seller_name` and `seller_contact` are copied from the owner's profile when
/// the listing is created; later profile edits do not touch existing listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    /// Store-assigned document key
    #[serde(skip)]
    pub id: String,
    pub owner_uid: String,
    pub name: String,
    #[serde(default)]
    pub photo_url: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub price_per_unit: Decimal,
    pub available_quantity: u32,
    #[serde(default)]
    pub description: String,
    #[serde(with = "store_date")]
    pub harvested_date: NaiveDate,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub seller_name: String,
    #[serde(default)]
    pub seller_contact: String,
}

impl Listing {
    /// Build the record written after the photo upload succeeded.
    pub fn from_draft(owner: &User, draft: &ListingDraft, photo_url: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            owner_uid: owner.uid.clone(),
            name: draft.name.trim().to_string(),
            photo_url: photo_url.into(),
            price_per_unit: draft.price_per_unit,
            available_quantity: draft.available_quantity,
            description: draft.description.trim().to_string(),
            harvested_date: draft.harvested_date,
            location: draft.location.trim().to_string(),
            seller_name: owner.name.clone(),
            seller_contact: owner.phone_number.clone().unwrap_or_default(),
        }
    }

    pub fn is_owned_by(&self, uid: &str) -> bool {
        self.owner_uid == uid
    }
}

impl Record for Listing {
    const COLLECTION: Collection = Collection::Crops;

    fn assign_id(&mut self, id: &str) {
        self.id = id.to_string();
    }
}

/// Raw photo bytes picked on the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoUpload {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// Listing form contents before upload and write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingDraft {
    pub name: String,
    pub photo: PhotoUpload,
    pub price_per_unit: Decimal,
    pub available_quantity: u32,
    pub description: String,
    pub harvested_date: NaiveDate,
    pub location: String,
}

impl ListingDraft {
    pub fn validate(&self) -> Result<()> {
        let blank = [&self.name, &self.description, &self.location]
            .iter()
            .any(|value| value.trim().is_empty());
        if blank || self.photo.bytes.is_empty() {
            return Err(Error::InvalidInput(
                "Please fill in all fields and select an image.".to_string(),
            ));
        }
        if self.price_per_unit.is_sign_negative() {
            return Err(Error::InvalidInput(
                "Price per unit cannot be negative".to_string(),
            ));
        }
        Ok(())
    }
}

/// Listings whose name contains `query`, compared case-insensitively.
///
/// Pure and order-preserving: an empty query returns the input unchanged.
#[must_use]
pub fn filter_listings(listings: &[Listing], query: &str) -> Vec<Listing> {
    if query.is_empty() {
        return listings.to_vec();
    }
    let needle = query.to_lowercase();
    listings
        .iter()
        .filter(|listing| listing.name.to_lowercase().contains(&needle))
        .cloned()
        .collect()
}
