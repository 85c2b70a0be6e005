use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::error::AppError;
use crate::store::{
    CanonicalItem, IngestRun, InsertOutcome, ItemFilters, ItemStore, NewIngestRun, PersistedItem,
    SimilarItem,
};

/// Postgres-backed store. Title similarity uses the pg_trgm `similarity()`
/// function; the migration installs the extension and a trigram index.
pub struct PgItemStore {
    pool: PgPool,
}

impl PgItemStore {
    pub fn new(pool: PgPool) -> PgItemStore {
        PgItemStore { pool }
    }
}

#[derive(sqlx::FromRow)]
struct SimilarityRow {
    id: i32,
    title: String,
    url: String,
    price: Option<f64>,
    merchant: Option<String>,
    image_url: Option<String>,
    source_key: String,
    submitter_note: Option<String>,
    status: String,
    created_at: DateTime<Utc>,
    score: f32,
}

#[async_trait]
impl ItemStore for PgItemStore {
    async fn insert_item(&self, item: &CanonicalItem) -> Result<InsertOutcome, AppError> {
        let result = sqlx::query_as::<_, PersistedItem>(
            "INSERT INTO items (title, url, price, merchant, image_url, source_key, submitter_note, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING *",
        )
        .bind(&item.title)
        .bind(&item.url)
        .bind(item.price)
        .bind(&item.merchant)
        .bind(&item.image_url)
        .bind(&item.source_key)
        .bind(&item.submitter_note)
        .bind(item.created_at)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(item) => Ok(InsertOutcome::Inserted(item)),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Ok(InsertOutcome::DuplicateUrl)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn similarity_search(
        &self,
        title: &str,
        window_days: i32,
        floor: f64,
    ) -> Result<Vec<SimilarItem>, AppError> {
        let rows = sqlx::query_as::<_, SimilarityRow>(
            "SELECT id, title, url, price, merchant, image_url, source_key, submitter_note, status, created_at, similarity(title, $1) AS score
             FROM items
             WHERE created_at >= NOW() - make_interval(days => $2)
               AND similarity(title, $1) >= $3
             ORDER BY score DESC",
        )
        .bind(title)
        .bind(window_days)
        .bind(floor as f32)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| SimilarItem {
                score: f64::from(row.score),
                item: PersistedItem {
                    id: row.id,
                    title: row.title,
                    url: row.url,
                    price: row.price,
                    merchant: row.merchant,
                    image_url: row.image_url,
                    source_key: row.source_key,
                    submitter_note: row.submitter_note,
                    status: row.status,
                    created_at: row.created_at,
                },
            })
            .collect())
    }

    async fn update_status(&self, id: i32, status: &str) -> Result<PersistedItem, AppError> {
        sqlx::query_as::<_, PersistedItem>(
            "UPDATE items SET status = $2 WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(status)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Item {id} not found")))
    }

    async fn list_items(&self, filters: &ItemFilters) -> Result<Vec<PersistedItem>, AppError> {
        let per_page = filters.per_page.unwrap_or(50).min(100);
        let offset = (filters.page.unwrap_or(1) - 1).max(0) * per_page;

        let items = sqlx::query_as::<_, PersistedItem>(
            "SELECT * FROM items WHERE ($1::text IS NULL OR status = $1) AND ($2::text IS NULL OR source_key = $2) ORDER BY created_at DESC LIMIT $3 OFFSET $4",
        )
        .bind(&filters.status)
        .bind(&filters.source)
        .bind(per_page)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(items)
    }

    async fn record_run(&self, run: &NewIngestRun) -> Result<IngestRun, AppError> {
        let row = sqlx::query_as::<_, IngestRun>(
            "INSERT INTO ingest_runs (source_key, trigger_kind, status, fetched, normalized, inserted, skipped, errored, error, started_at, finished_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) RETURNING *",
        )
        .bind(&run.source_key)
        .bind(&run.trigger_kind)
        .bind(&run.status)
        .bind(run.fetched)
        .bind(run.normalized)
        .bind(run.inserted)
        .bind(run.skipped)
        .bind(run.errored)
        .bind(&run.error)
        .bind(run.started_at)
        .bind(run.finished_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn recent_runs(
        &self,
        source_key: Option<&str>,
        limit: i64,
    ) -> Result<Vec<IngestRun>, AppError> {
        let runs = sqlx::query_as::<_, IngestRun>(
            "SELECT * FROM ingest_runs WHERE ($1::text IS NULL OR source_key = $1) ORDER BY started_at DESC LIMIT $2",
        )
        .bind(source_key)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(runs)
    }
}
