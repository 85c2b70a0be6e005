use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use strsim::sorensen_dice;

use crate::error::AppError;
use crate::store::{
    CanonicalItem, IngestRun, InsertOutcome, ItemFilters, ItemStore, NewIngestRun, PersistedItem,
    SimilarItem, STATUS_PENDING,
};

/// In-memory store used by the test suite and local development. Title
/// similarity is the Sørensen–Dice bigram coefficient, the in-process
/// analogue of the trigram scoring the Postgres store gets from pg_trgm.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    items: Vec<PersistedItem>,
    runs: Vec<IngestRun>,
    next_item_id: i32,
    next_run_id: i32,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }

    pub fn title_similarity(a: &str, b: &str) -> f64 {
        sorensen_dice(&a.to_lowercase(), &b.to_lowercase())
    }
}

#[async_trait]
impl ItemStore for MemoryStore {
    async fn insert_item(&self, item: &CanonicalItem) -> Result<InsertOutcome, AppError> {
        let mut inner = self.inner.lock().expect("memory store lock poisoned");
        let collision = inner
            .items
            .iter()
            .any(|existing| existing.source_key == item.source_key && existing.url == item.url);
        if collision {
            return Ok(InsertOutcome::DuplicateUrl);
        }
        inner.next_item_id += 1;
        let persisted = PersistedItem {
            id: inner.next_item_id,
            title: item.title.clone(),
            url: item.url.clone(),
            price: item.price,
            merchant: item.merchant.clone(),
            image_url: item.image_url.clone(),
            source_key: item.source_key.clone(),
            submitter_note: item.submitter_note.clone(),
            status: STATUS_PENDING.to_string(),
            created_at: item.created_at,
        };
        inner.items.push(persisted.clone());
        Ok(InsertOutcome::Inserted(persisted))
    }

    async fn similarity_search(
        &self,
        title: &str,
        window_days: i32,
        floor: f64,
    ) -> Result<Vec<SimilarItem>, AppError> {
        let cutoff = Utc::now() - Duration::days(i64::from(window_days));
        let inner = self.inner.lock().expect("memory store lock poisoned");
        let mut matches: Vec<SimilarItem> = inner
            .items
            .iter()
            .filter(|item| item.created_at >= cutoff)
            .filter_map(|item| {
                let score = MemoryStore::title_similarity(&item.title, title);
                (score >= floor).then(|| SimilarItem {
                    item: item.clone(),
                    score,
                })
            })
            .collect();
        matches.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        Ok(matches)
    }

    async fn update_status(&self, id: i32, status: &str) -> Result<PersistedItem, AppError> {
        let mut inner = self.inner.lock().expect("memory store lock poisoned");
        let item = inner
            .items
            .iter_mut()
            .find(|item| item.id == id)
            .ok_or_else(|| AppError::NotFound(format!("Item {id} not found")))?;
        item.status = status.to_string();
        Ok(item.clone())
    }

    async fn list_items(&self, filters: &ItemFilters) -> Result<Vec<PersistedItem>, AppError> {
        let per_page = filters.per_page.unwrap_or(50).min(100).max(0) as usize;
        let page = filters.page.unwrap_or(1).max(1) as usize;
        let inner = self.inner.lock().expect("memory store lock poisoned");
        let mut items: Vec<PersistedItem> = inner
            .items
            .iter()
            .filter(|item| {
                filters
                    .status
                    .as_deref()
                    .is_none_or(|status| item.status == status)
                    && filters
                        .source
                        .as_deref()
                        .is_none_or(|source| item.source_key == source)
            })
            .cloned()
            .collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(items
            .into_iter()
            .skip((page - 1) * per_page)
            .take(per_page)
            .collect())
    }

    async fn record_run(&self, run: &NewIngestRun) -> Result<IngestRun, AppError> {
        let mut inner = self.inner.lock().expect("memory store lock poisoned");
        inner.next_run_id += 1;
        let row = IngestRun {
            id: inner.next_run_id,
            source_key: run.source_key.clone(),
            trigger_kind: run.trigger_kind.clone(),
            status: run.status.clone(),
            fetched: run.fetched,
            normalized: run.normalized,
            inserted: run.inserted,
            skipped: run.skipped,
            errored: run.errored,
            error: run.error.clone(),
            started_at: run.started_at,
            finished_at: run.finished_at,
        };
        inner.runs.push(row.clone());
        Ok(row)
    }

    async fn recent_runs(
        &self,
        source_key: Option<&str>,
        limit: i64,
    ) -> Result<Vec<IngestRun>, AppError> {
        let inner = self.inner.lock().expect("memory store lock poisoned");
        let mut runs: Vec<IngestRun> = inner
            .runs
            .iter()
            .filter(|run| source_key.is_none_or(|key| run.source_key == key))
            .cloned()
            .collect();
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        runs.truncate(limit.max(0) as usize);
        Ok(runs)
    }
}
