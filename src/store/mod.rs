pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

pub use memory::MemoryStore;
pub use postgres::PgItemStore;

pub const STATUS_PENDING: &str = "pending";
pub const STATUS_APPROVED: &str = "approved";
pub const STATUS_REJECTED: &str = "rejected";

/// Store-ready representation of a deal, produced by the normalizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalItem {
    pub title: String,
    /// Canonical absolute URL (tracking parameters stripped, no fragment)
    pub url: String,
    pub price: Option<f64>,
    pub merchant: Option<String>,
    pub image_url: Option<String>,
    pub source_key: String,
    pub submitter_note: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Row owned by the store: a canonical item plus identity and review status.
/// Rows are born `pending`; approval/rejection belongs to the external
/// reviewer workflow.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PersistedItem {
    pub id: i32,
    pub title: String,
    pub url: String,
    pub price: Option<f64>,
    pub merchant: Option<String>,
    pub image_url: Option<String>,
    pub source_key: String,
    pub submitter_note: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct SimilarItem {
    pub item: PersistedItem,
    pub score: f64,
}

#[derive(Debug)]
pub enum InsertOutcome {
    Inserted(PersistedItem),
    /// The (source_key, url) uniqueness constraint fired: a concurrent or
    /// earlier cycle already stored this exact item.
    DuplicateUrl,
}

#[derive(Debug, Deserialize, Default)]
pub struct ItemFilters {
    pub status: Option<String>,
    pub source: Option<String>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

/// Audit row for one executed ingestion cycle.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct IngestRun {
    pub id: i32,
    pub source_key: String,
    pub trigger_kind: String,
    pub status: String,
    pub fetched: i32,
    pub normalized: i32,
    pub inserted: i32,
    pub skipped: i32,
    pub errored: i32,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewIngestRun {
    pub source_key: String,
    pub trigger_kind: String,
    pub status: String,
    pub fetched: i32,
    pub normalized: i32,
    pub inserted: i32,
    pub skipped: i32,
    pub errored: i32,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Narrow persistence contract the pipeline talks to: insert-row,
/// similarity-search, update-row, plus the run audit trail. The relational
/// store behind it is an external collaborator.
#[async_trait]
pub trait ItemStore: Send + Sync {
    /// Insert with status `pending`. An exact (source_key, url) collision is
    /// reported as `DuplicateUrl`, not an error.
    async fn insert_item(&self, item: &CanonicalItem) -> Result<InsertOutcome, AppError>;

    /// Items created within the trailing window whose title similarity to
    /// `title` reaches `floor`, best match first.
    async fn similarity_search(
        &self,
        title: &str,
        window_days: i32,
        floor: f64,
    ) -> Result<Vec<SimilarItem>, AppError>;

    async fn update_status(&self, id: i32, status: &str) -> Result<PersistedItem, AppError>;

    async fn list_items(&self, filters: &ItemFilters) -> Result<Vec<PersistedItem>, AppError>;

    async fn record_run(&self, run: &NewIngestRun) -> Result<IngestRun, AppError>;

    async fn recent_runs(
        &self,
        source_key: Option<&str>,
        limit: i64,
    ) -> Result<Vec<IngestRun>, AppError>;
}
