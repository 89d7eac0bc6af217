//! Error taxonomy shared by the store, the remote client and the facade.
//!
//! "No such record" is never an error in this crate: lookups return `Option`
//! and batch results carry `None` entries for unknown items.

use thiserror::Error;

/// Failures surfaced by tubecache operations.
///
/// Nothing is retried internally. Every variant propagates to the caller,
/// who decides whether a retry or a fallback makes sense.
#[derive(Error, Debug)]
pub enum CatalogError {
    /// Malformed input handed to the store, such as a record with an empty
    /// required field.
    #[error("invalid record: {0}")]
    Validation(String),

    /// A write violated referential integrity, such as inserting a video
    /// whose channel row does not exist.
    #[error("integrity violation: {0}")]
    Integrity(String),

    /// The underlying SQLite database failed or is unavailable.
    #[error("storage failure: {0}")]
    Storage(#[from] libsql::Error),

    /// Filesystem failure while preparing the database location.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Transport or HTTP failure while talking to the remote catalog.
    #[error("remote catalog failure: {0}")]
    Remote(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, CatalogError>;
