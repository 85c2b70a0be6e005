use std::sync::Arc;

use crate::error::AppError;
use crate::store::{CanonicalItem, InsertOutcome, ItemStore, PersistedItem};

/// Policy knobs for near-duplicate detection. The discovery floor is looser
/// than the acceptance threshold so close calls get logged for tuning
/// without being suppressed.
#[derive(Debug, Clone, Copy)]
pub struct DedupConfig {
    pub window_days: i32,
    pub discovery_threshold: f64,
    pub acceptance_threshold: f64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        DedupConfig {
            window_days: 7,
            discovery_threshold: 0.55,
            acceptance_threshold: 0.6,
        }
    }
}

pub struct Deduplicator {
    store: Arc<dyn ItemStore>,
    config: DedupConfig,
}

impl Deduplicator {
    pub fn new(store: Arc<dyn ItemStore>, config: DedupConfig) -> Deduplicator {
        Deduplicator { store, config }
    }

    /// Insert the candidate unless a recent stored item is a near-duplicate.
    /// Returns None when the candidate was skipped (either by similarity or
    /// by an exact-URL collision, which is a benign race, not an error).
    pub async fn consider_for_insert(
        &self,
        item: CanonicalItem,
    ) -> Result<Option<PersistedItem>, AppError> {
        let matches = self
            .store
            .similarity_search(
                &item.title,
                self.config.window_days,
                self.config.discovery_threshold,
            )
            .await?;

        if let Some(best) = matches.first() {
            if best.score >= self.config.acceptance_threshold {
                tracing::info!(
                    title = %item.title,
                    matched = %best.item.title,
                    matched_id = best.item.id,
                    score = best.score,
                    "Skipping near-duplicate item"
                );
                return Ok(None);
            }
            tracing::debug!(
                title = %item.title,
                matched = %best.item.title,
                score = best.score,
                "Close-call similarity below acceptance threshold"
            );
        }

        match self.store.insert_item(&item).await? {
            InsertOutcome::Inserted(persisted) => Ok(Some(persisted)),
            InsertOutcome::DuplicateUrl => {
                tracing::debug!(url = %item.url, "Exact URL already stored, treating as no-op");
                Ok(None)
            }
        }
    }
}
