//! Error types for farmflo-core

use thiserror::Error;

/// Result type alias using farmflo-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in farmflo-core operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Point read of an absent record
    #[error("Record not found: {collection}/{id}")]
    NotFound { collection: &'static str, id: String },

    /// Create/update/delete transport failure
    #[error("Write failed: {0}")]
    Write(String),

    /// Live query delivery failure
    #[error("Live query failed: {0}")]
    Subscription(String),

    /// Object store upload failure
    #[error("Upload failed: {0}")]
    Upload(String),

    /// Buyer tried to notify themselves about their own listing
    #[error("Cannot express interest in your own listing ({listing_id})")]
    SelfInterestRejected { listing_id: String },

    /// Optimistic profile edit was rolled back
    #[error("Profile update failed for [{}]: {reason}", .fields.join(", "))]
    ProfileUpdateFailed { fields: Vec<String>, reason: String },

    /// Operation needs a resolved user
    #[error("No authenticated user")]
    NotAuthenticated,

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Whether this error reports an absent record.
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}
