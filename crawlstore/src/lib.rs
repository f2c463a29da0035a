//! CrawlStore - persistent record storage for the crawl scheduler
//!
//! A generic keyed record store backed by SQLite. Records serialize to JSON
//! rows and expose a set of indexed fields for filtered listing. Writes go
//! through single-record statements; `update_checked` provides the
//! optimistic-concurrency discipline (compare `updated_at`, write only if
//! unchanged) that keeps concurrent writers from losing updates.

pub mod store;

pub use store::Store;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Current time as Unix milliseconds
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Value a record can expose in a secondary index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IndexValue {
    String(String),
    Integer(i64),
    Boolean(bool),
}

impl IndexValue {
    /// Canonical text encoding used in the index table
    pub fn encode(&self) -> String {
        match self {
            Self::String(s) => s.clone(),
            Self::Integer(i) => i.to_string(),
            Self::Boolean(b) => b.to_string(),
        }
    }
}

/// Filter comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
}

/// A filter on an indexed field
#[derive(Debug, Clone)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: IndexValue,
}

impl Filter {
    /// Equality filter on an indexed field
    pub fn eq(field: impl Into<String>, value: IndexValue) -> Self {
        Self {
            field: field.into(),
            op: FilterOp::Eq,
            value,
        }
    }
}

/// A record that can be persisted in a [`Store`]
pub trait Record: Serialize + DeserializeOwned {
    /// Unique identifier within the record's collection
    fn id(&self) -> &str;

    /// Last update timestamp (Unix milliseconds), used for conditional writes
    fn updated_at(&self) -> i64;

    /// Name of the collection this record type lives in
    fn collection_name() -> &'static str;

    /// Fields exposed for filtered listing
    fn indexed_fields(&self) -> HashMap<String, IndexValue>;
}

/// Errors from store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Record already exists: {0}")]
    Duplicate(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Conflicting update for {id}: expected updated_at {expected}, found {found}")]
    Conflict { id: String, expected: i64, found: i64 },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for store operations
pub type Result<T> = std::result::Result<T, StoreError>;
