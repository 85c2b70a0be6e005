use std::sync::Arc;
use std::time::Duration;

use dealtracker::dedup::DedupConfig;
use dealtracker::error::AppError;
use dealtracker::fetchers::ChatMessage;
use dealtracker::ratelimit::RateLimit;
use dealtracker::registry::{Registry, SourceConfig, SourceDefinition, SourceKind};
use dealtracker::scheduler::{Pipeline, RunOutcome, SkipReason, TriggerKind};
use dealtracker::store::{ItemFilters, ItemStore, MemoryStore};

fn inbound_source(key: &str, allowed: &[&str], max_requests: u32) -> SourceDefinition {
    SourceDefinition {
        key: key.to_string(),
        kind: SourceKind::Inbound,
        enabled: true,
        priority: 0,
        schedule: None,
        rate_limit: RateLimit {
            max_requests,
            window_ms: 3_600_000,
        },
        config: SourceConfig {
            allowed_channels: allowed.iter().map(|s| s.to_string()).collect(),
            ..SourceConfig::default()
        },
    }
}

fn pipeline_with(sources: Vec<SourceDefinition>) -> (Arc<Pipeline>, Arc<MemoryStore>) {
    let registry = Arc::new(Registry::new(sources).unwrap());
    let store = Arc::new(MemoryStore::new());
    let store_dyn: Arc<dyn ItemStore> = store.clone();
    let pipeline = Arc::new(Pipeline::new(
        registry,
        store_dyn,
        DedupConfig::default(),
        reqwest::Client::new(),
        Duration::from_secs(5),
    ));
    (pipeline, store)
}

fn message(channel: &str, text: &str) -> ChatMessage {
    ChatMessage {
        channel: channel.to_string(),
        text: text.to_string(),
    }
}

#[tokio::test]
async fn inbound_message_flows_into_the_pending_queue() {
    let (pipeline, store) = pipeline_with(vec![inbound_source("chat", &[], 100)]);

    pipeline.inbound_hub().push(
        "chat",
        message(
            "deals-chat",
            "🔥 50% off Widget Pro now $19.99 https://example.com/deal?utm_source=x #sale",
        ),
    );
    let outcome = pipeline.run_source("chat", TriggerKind::Manual).await.unwrap();
    let RunOutcome::Completed(counts) = outcome else {
        panic!("expected a completed run");
    };
    assert_eq!(counts.fetched, 1);
    assert_eq!(counts.normalized, 1);
    assert_eq!(counts.inserted, 1);

    let items = store.list_items(&ItemFilters::default()).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].status, "pending");
    assert_eq!(items[0].url, "https://example.com/deal");
    assert_eq!(items[0].title, "50% off Widget Pro now");
}

#[tokio::test]
async fn second_cycle_with_near_duplicate_title_skips_the_item() {
    let (pipeline, store) = pipeline_with(vec![inbound_source("chat", &[], 100)]);

    pipeline.inbound_hub().push(
        "chat",
        message("deals-chat", "Widget Pro 50% Off deal https://shop.example.com/widget-pro"),
    );
    pipeline.run_source("chat", TriggerKind::Manual).await.unwrap();

    // Ten minutes later the same deal shows up again under another URL.
    pipeline.inbound_hub().push(
        "chat",
        message("deals-chat", "Widget Pro 50% Off deal https://shop.example.com/wp-restock"),
    );
    let outcome = pipeline.run_source("chat", TriggerKind::Manual).await.unwrap();
    let RunOutcome::Completed(counts) = outcome else {
        panic!("expected a completed run");
    };
    assert_eq!(counts.skipped, 1);
    assert_eq!(counts.inserted, 0);

    let items = store.list_items(&ItemFilters::default()).await.unwrap();
    assert_eq!(items.len(), 1);
}

#[tokio::test]
async fn url_less_messages_are_silently_ignored() {
    let (pipeline, store) = pipeline_with(vec![inbound_source("chat", &[], 100)]);

    pipeline
        .inbound_hub()
        .push("chat", message("deals-chat", "no link, just vibes"));
    let outcome = pipeline.run_source("chat", TriggerKind::Manual).await.unwrap();
    let RunOutcome::Completed(counts) = outcome else {
        panic!("expected a completed run");
    };
    assert_eq!(counts.fetched, 0);
    assert_eq!(counts.normalized, 0);

    let items = store.list_items(&ItemFilters::default()).await.unwrap();
    assert!(items.is_empty());
}

#[tokio::test]
async fn unknown_source_trigger_fails_without_enqueuing() {
    let (pipeline, store) = pipeline_with(vec![inbound_source("chat", &[], 100)]);

    let err = pipeline
        .clone()
        .trigger_ingestion("unknown_source")
        .unwrap_err();
    assert!(matches!(err, AppError::Config(_)));

    let err = pipeline
        .run_source("unknown_source", TriggerKind::Manual)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Config(_)));

    assert!(store.recent_runs(None, 50).await.unwrap().is_empty());
}

#[tokio::test]
async fn disabled_source_trigger_fails_fast() {
    let mut disabled = inbound_source("chat", &[], 100);
    disabled.enabled = false;
    let (pipeline, _store) = pipeline_with(vec![disabled]);

    let err = pipeline.trigger_ingestion("chat").unwrap_err();
    assert!(matches!(err, AppError::Config(_)));
}

#[tokio::test]
async fn throttled_source_drops_the_cycle() {
    let (pipeline, _store) = pipeline_with(vec![inbound_source("chat", &[], 1)]);

    let first = pipeline.run_source("chat", TriggerKind::Manual).await.unwrap();
    assert!(matches!(first, RunOutcome::Completed(_)));

    let second = pipeline.run_source("chat", TriggerKind::Manual).await.unwrap();
    assert!(matches!(
        second,
        RunOutcome::Skipped(SkipReason::Throttled)
    ));
}

#[tokio::test]
async fn dispatch_honors_the_channel_allow_list() {
    let (pipeline, _store) =
        pipeline_with(vec![inbound_source("chat", &["deals-chat", "VIP"], 100)]);

    let accepted = pipeline
        .clone()
        .dispatch_inbound(message("DEALS-CHAT", "https://example.com/x deal"));
    assert!(accepted.accepted);
    assert_eq!(accepted.sources, 1);

    let ignored = pipeline.dispatch_inbound(message("random-room", "https://example.com/y deal"));
    assert!(!ignored.accepted);
}

#[tokio::test]
async fn every_executed_cycle_is_recorded_with_counts() {
    let (pipeline, store) = pipeline_with(vec![inbound_source("chat", &[], 100)]);

    pipeline.inbound_hub().push(
        "chat",
        message("deals-chat", "Robot vacuum for $129 https://example.com/vac"),
    );
    pipeline.run_source("chat", TriggerKind::Manual).await.unwrap();
    pipeline.run_source("chat", TriggerKind::Recurring).await.unwrap();

    let runs = store.recent_runs(Some("chat"), 10).await.unwrap();
    assert_eq!(runs.len(), 2);
    assert!(runs.iter().all(|run| run.status == "completed"));
    let manual = runs.iter().find(|r| r.trigger_kind == "manual").unwrap();
    assert_eq!(manual.fetched, 1);
    assert_eq!(manual.inserted, 1);
}
