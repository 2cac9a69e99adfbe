//! Persistent storage for drug records.
//!
//! [`RecordStore`] is the seam between the dispatcher and the database.
//! The production implementation is [`SqliteStore`]; tests substitute mocks
//! or stores that fail on demand.

use async_trait::async_trait;
use thiserror::Error;

use crate::protocol::DrugRecord;

pub mod sqlite;

pub use sqlite::SqliteStore;

/// Maximum number of rows returned by [`RecordStore::find_by_name`].
pub const QUERY_LIMIT: usize = 10;

/// Errors surfaced by a [`RecordStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// Records must carry a non-empty name.
    #[error("drug name must not be empty")]
    EmptyName,
    /// The database rejected a statement.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    /// The blocking worker running the statement panicked or was cancelled.
    #[error("store worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
    /// The backing store cannot be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Append-only history of drug records keyed by name.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Append `record`, assigning its creation time.
    ///
    /// Any client-supplied `created_at` is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::EmptyName`] for a blank name, or the failure
    /// raised by the backing store.
    async fn insert(&self, record: DrugRecord) -> Result<(), StoreError>;

    /// Records whose name contains `fragment` (case-insensitive), newest
    /// first, at most [`QUERY_LIMIT`].
    ///
    /// # Errors
    ///
    /// Returns the failure raised by the backing store.
    async fn find_by_name(&self, fragment: &str) -> Result<Vec<DrugRecord>, StoreError>;

    /// Set the manufacture date on the most recent record named exactly
    /// `name`, inserting a minimal record when none exists.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::EmptyName`] for a blank name, or the failure
    /// raised by the backing store.
    async fn upsert_manufacture_date(&self, name: &str, date: &str) -> Result<(), StoreError>;

    /// Most recent non-empty manufacture date for a record named exactly
    /// `name`.
    ///
    /// # Errors
    ///
    /// Returns the failure raised by the backing store.
    async fn latest_manufacture_date(&self, name: &str) -> Result<Option<String>, StoreError>;
}
