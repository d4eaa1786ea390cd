//! farmflo-core - Core library for FarmFlo
//!
//! This crate contains the shared record schemas, the live collection gateway,
//! and the view stores (profile, listings, interests) that keep a device's
//! local state consistent with the remote document store.

pub mod config;
pub mod directory;
pub mod error;
pub mod identity;
pub mod interests;
pub mod inventory;
pub mod lifecycle;
pub mod marketplace;
pub mod models;
pub mod profile;
pub mod session;
pub mod state;
pub mod storage;
pub mod store;

#[cfg(test)]
mod testing;

pub use error::{Error, Result};
pub use identity::Identity;
pub use marketplace::Marketplace;
pub use models::{Interest, Listing, ListingDraft, User, UserPatch};
