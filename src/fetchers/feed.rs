use async_trait::async_trait;
use chrono::Utc;

use crate::error::AppError;
use crate::fetchers::{Fetcher, RawCandidate};
use crate::ratelimit::RateLimiter;
use crate::registry::{SourceDefinition, SourceKind};

/// RSS/Atom feed pull. Network failures surface as fetch errors; a malformed
/// or empty body yields an empty batch so one bad cycle does not halt the
/// schedule.
pub struct FeedFetcher {
    client: reqwest::Client,
}

impl FeedFetcher {
    pub fn new(client: reqwest::Client) -> FeedFetcher {
        FeedFetcher { client }
    }
}

#[async_trait]
impl Fetcher for FeedFetcher {
    fn kind(&self) -> SourceKind {
        SourceKind::Feed
    }

    async fn fetch(
        &self,
        source: &SourceDefinition,
        _limiter: &RateLimiter,
    ) -> Result<Vec<RawCandidate>, AppError> {
        let feed_url = source
            .config
            .url
            .as_deref()
            .ok_or_else(|| AppError::Config(format!("Feed source '{}' has no url", source.key)))?;

        let mut request = self.client.get(feed_url);
        for (name, value) in &source.config.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|e| AppError::Fetch(format!("Feed request to {feed_url} failed: {e}")))?;
        if !response.status().is_success() {
            return Err(AppError::Fetch(format!(
                "Feed {feed_url} returned {}",
                response.status()
            )));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| AppError::Fetch(format!("Failed to read feed body: {e}")))?;

        let feed = match feed_rs::parser::parse(&bytes[..]) {
            Ok(feed) => feed,
            Err(e) => {
                tracing::warn!(source = %source.key, error = %e, "Malformed feed body, treating batch as empty");
                return Ok(Vec::new());
            }
        };

        let candidates = feed
            .entries
            .into_iter()
            .map(|entry| {
                let url = entry
                    .links
                    .first()
                    .map(|link| link.href.clone())
                    .or_else(|| entry.id.starts_with("http").then(|| entry.id.clone()));
                RawCandidate::Feed {
                    title: entry.title.map(|t| t.content),
                    url,
                    summary: entry.summary.map(|t| t.content),
                    published: entry
                        .published
                        .or(entry.updated)
                        .map(|dt| dt.with_timezone(&Utc)),
                }
            })
            .collect();
        Ok(candidates)
    }
}
