//! Data models for FarmFlo

mod interest;
mod listing;
pub mod timestamp;
mod user;

pub use interest::{sort_recent_first, Interest};
pub use listing::{filter_listings, Listing, ListingDraft, PhotoUpload};
pub use timestamp::StoreTimestamp;
pub use user::{Registration, User, UserPatch};
