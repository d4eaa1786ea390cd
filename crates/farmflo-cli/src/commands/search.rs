use std::fs;
use std::path::Path;

use farmflo_core::models::filter_listings;
use farmflo_core::store::{Snapshot, StoredDocument};
use farmflo_core::Listing;
use serde::Serialize;
use serde_json::Value;

use crate::error::CliError;

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct ListingItem {
    pub id: String,
    pub name: String,
    pub price_per_unit: String,
    pub available_quantity: u32,
    pub seller_name: String,
    pub location: String,
}

impl From<&Listing> for ListingItem {
    fn from(listing: &Listing) -> Self {
        Self {
            id: listing.id.clone(),
            name: listing.name.clone(),
            price_per_unit: listing.price_per_unit.to_string(),
            available_quantity: listing.available_quantity,
            seller_name: listing.seller_name.clone(),
            location: listing.location.clone(),
        }
    }
}

pub fn run_search(query: &str, snapshot_path: &Path, as_json: bool) -> Result<(), CliError> {
    let payload = fs::read_to_string(snapshot_path)?;
    let snapshot = parse_snapshot(&payload)?;
    let listings = search_snapshot(&snapshot, query);

    if as_json {
        let items = listings.iter().map(ListingItem::from).collect::<Vec<_>>();
        println!("{}", serde_json::to_string_pretty(&items)?);
    } else {
        for listing in &listings {
            println!("{}", format_listing_line(listing));
        }
    }

    Ok(())
}

/// Read a JSON array of crop documents. Each document's `id` field becomes its key.
pub fn parse_snapshot(payload: &str) -> Result<Snapshot, CliError> {
    let Value::Array(items) = serde_json::from_str::<Value>(payload)? else {
        return Err(CliError::InvalidSnapshot);
    };

    let documents = items
        .into_iter()
        .enumerate()
        .filter_map(|(index, item)| match item {
            Value::Object(mut fields) => {
                let id = fields
                    .remove("id")
                    .and_then(|id| id.as_str().map(str::to_string))
                    .unwrap_or_else(|| format!("doc-{index}"));
                Some(StoredDocument::new(id, fields))
            }
            _ => {
                tracing::warn!("Skipping non-object entry {} in snapshot", index);
                None
            }
        })
        .collect();
    Ok(Snapshot::new(documents))
}

pub fn search_snapshot(snapshot: &Snapshot, query: &str) -> Vec<Listing> {
    filter_listings(&snapshot.decode::<Listing>(), query)
}

pub fn format_listing_line(listing: &Listing) -> String {
    format!(
        "{}  {}  {}/unit  qty {}  {}",
        listing.id,
        listing.name,
        listing.price_per_unit,
        listing.available_quantity,
        if listing.seller_name.is_empty() {
            "-"
        } else {
            listing.seller_name.as_str()
        }
    )
}
