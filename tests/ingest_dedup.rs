use std::sync::Arc;

use chrono::Utc;
use dealtracker::dedup::{DedupConfig, Deduplicator};
use dealtracker::store::{CanonicalItem, ItemStore, MemoryStore};

fn item(title: &str, url: &str) -> CanonicalItem {
    CanonicalItem {
        title: title.to_string(),
        url: url.to_string(),
        price: Some(19.99),
        merchant: Some("example.com".to_string()),
        image_url: None,
        source_key: "dealwire_rss".to_string(),
        submitter_note: None,
        created_at: Utc::now(),
    }
}

fn dedup(store: &Arc<MemoryStore>, config: DedupConfig) -> Deduplicator {
    let store: Arc<dyn ItemStore> = store.clone();
    Deduplicator::new(store, config)
}

#[tokio::test]
async fn near_duplicate_title_within_window_is_skipped() {
    let store = Arc::new(MemoryStore::new());
    let dedup = dedup(&store, DedupConfig::default());

    let first = dedup
        .consider_for_insert(item("Widget Pro 50% Off", "https://example.com/widget-pro"))
        .await
        .unwrap();
    assert!(first.is_some());

    // Second cycle, same deal spotted again under a fresh URL.
    let second = dedup
        .consider_for_insert(item("Widget Pro 50% Off", "https://example.com/widget-pro-2"))
        .await
        .unwrap();
    assert!(second.is_none());

    let stored = store
        .similarity_search("Widget Pro 50% Off", 7, 0.0)
        .await
        .unwrap();
    assert_eq!(stored.len(), 1);
}

#[tokio::test]
async fn dissimilar_titles_are_both_inserted() {
    let store = Arc::new(MemoryStore::new());
    let dedup = dedup(&store, DedupConfig::default());

    let first = dedup
        .consider_for_insert(item("Widget Pro 50% Off", "https://example.com/widget"))
        .await
        .unwrap();
    let second = dedup
        .consider_for_insert(item(
            "Leather Office Chair Clearance",
            "https://example.com/chair",
        ))
        .await
        .unwrap();
    assert!(first.is_some());
    assert!(second.is_some());
}

#[tokio::test]
async fn close_call_between_thresholds_is_still_inserted() {
    let store = Arc::new(MemoryStore::new());
    // Widen the gap so a similar-but-not-identical pair lands between the
    // discovery floor and the acceptance threshold.
    let dedup = dedup(
        &store,
        DedupConfig {
            window_days: 7,
            discovery_threshold: 0.5,
            acceptance_threshold: 0.95,
        },
    );

    let first = dedup
        .consider_for_insert(item("Widget Pro Deal Today", "https://example.com/a"))
        .await
        .unwrap();
    let second = dedup
        .consider_for_insert(item("Widget Pro Deal Tonight", "https://example.com/b"))
        .await
        .unwrap();
    assert!(first.is_some());
    assert!(second.is_some(), "a close call must be logged, not suppressed");
}

#[tokio::test]
async fn exact_url_collision_is_a_benign_no_op() {
    let store = Arc::new(MemoryStore::new());
    let dedup = dedup(&store, DedupConfig::default());

    let first = dedup
        .consider_for_insert(item("Standing Desk Flash Sale", "https://example.com/desk"))
        .await
        .unwrap();
    assert!(first.is_some());

    // Identical canonical URL from the same source, wildly different title:
    // similarity lets it through, the uniqueness constraint catches it.
    let second = dedup
        .consider_for_insert(item("Unrelated Wording Entirely", "https://example.com/desk"))
        .await
        .unwrap();
    assert!(second.is_none());
}
