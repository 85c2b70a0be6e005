// Fetcher module: one implementation per source kind, selected from the
// SourceDefinition's `kind` tag when the pipeline is built.

pub mod api;
pub mod feed;
pub mod inbound;
pub mod scraper;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::AppError;
use crate::ratelimit::RateLimiter;
use crate::registry::{SourceDefinition, SourceKind};

pub use inbound::{ChatMessage, InboundHub};

/// Transient, fetcher-specific payload. Owned by the fetcher that produced
/// it and discarded after normalization.
#[derive(Debug, Clone)]
pub enum RawCandidate {
    Feed {
        title: Option<String>,
        url: Option<String>,
        summary: Option<String>,
        published: Option<DateTime<Utc>>,
    },
    Api {
        title: Option<String>,
        url: Option<String>,
        price: Option<f64>,
        merchant: Option<String>,
        image_url: Option<String>,
    },
    Scraped {
        title: Option<String>,
        url: Option<String>,
        price_text: Option<String>,
        text: String,
    },
    Inbound {
        channel: String,
        text: String,
    },
}

/// Trait all fetchers implement. A fetch produces a finite batch of raw
/// candidates or fails with a fetch error; per-source failures are logged by
/// the caller and never abort the scheduler loop.
#[async_trait]
pub trait Fetcher: Send + Sync {
    fn kind(&self) -> SourceKind;

    async fn fetch(
        &self,
        source: &SourceDefinition,
        limiter: &RateLimiter,
    ) -> Result<Vec<RawCandidate>, AppError>;
}

/// One fetcher instance per source kind, sharing the HTTP client.
pub fn build_fetchers(
    http: reqwest::Client,
    hub: Arc<InboundHub>,
) -> HashMap<SourceKind, Arc<dyn Fetcher>> {
    let mut fetchers: HashMap<SourceKind, Arc<dyn Fetcher>> = HashMap::new();
    fetchers.insert(
        SourceKind::Feed,
        Arc::new(feed::FeedFetcher::new(http.clone())),
    );
    fetchers.insert(SourceKind::Api, Arc::new(api::ApiFetcher::new(http.clone())));
    fetchers.insert(
        SourceKind::Scraper,
        Arc::new(scraper::ScraperFetcher::new(http)),
    );
    fetchers.insert(
        SourceKind::Inbound,
        Arc::new(inbound::InboundFetcher::new(hub)),
    );
    fetchers
}
