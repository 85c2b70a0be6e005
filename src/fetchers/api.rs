use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::Value;

use crate::error::AppError;
use crate::fetchers::{Fetcher, RawCandidate};
use crate::ratelimit::RateLimiter;
use crate::registry::{SourceConfig, SourceDefinition, SourceKind};

/// Partner API pull. Credentials come from the environment variable named in
/// the source config; pagination beyond the first page is gated by the
/// source's rate limiter, so a throttled source simply stops paging early.
pub struct ApiFetcher {
    client: reqwest::Client,
}

impl ApiFetcher {
    pub fn new(client: reqwest::Client) -> ApiFetcher {
        ApiFetcher { client }
    }

    fn authorization_header(config: &SourceConfig, key: &str) -> Result<Option<String>, AppError> {
        let Some(env_name) = config.api_key_env.as_deref() else {
            return Ok(None);
        };
        let credential = std::env::var(env_name).map_err(|_| {
            AppError::Config(format!(
                "API source '{key}' expects credential in ${env_name}"
            ))
        })?;
        let header = match config.auth.as_deref() {
            Some("basic") => format!("Basic {}", BASE64.encode(credential.as_bytes())),
            _ => format!("Bearer {credential}"),
        };
        Ok(Some(header))
    }
}

#[async_trait]
impl Fetcher for ApiFetcher {
    fn kind(&self) -> SourceKind {
        SourceKind::Api
    }

    async fn fetch(
        &self,
        source: &SourceDefinition,
        limiter: &RateLimiter,
    ) -> Result<Vec<RawCandidate>, AppError> {
        let endpoint = source
            .config
            .url
            .as_deref()
            .ok_or_else(|| AppError::Config(format!("API source '{}' has no url", source.key)))?;
        let authorization = Self::authorization_header(&source.config, &source.key)?;

        let pages = source.config.pages.max(1);
        let mut candidates = Vec::new();

        for page in 0..pages {
            // The first call is covered by the permit the scheduler acquired
            // before invoking the fetch.
            if page > 0 && !limiter.try_acquire() {
                tracing::debug!(source = %source.key, page, "Rate limit reached, stopping pagination");
                break;
            }

            let mut request = self.client.get(endpoint);
            if let Some(header) = &authorization {
                request = request.header("Authorization", header);
            }
            for (name, value) in &source.config.headers {
                request = request.header(name.as_str(), value.as_str());
            }
            if pages > 1 {
                request = request.query(&[(source.config.page_param.as_str(), page.to_string())]);
            }

            let response = request
                .send()
                .await
                .map_err(|e| AppError::Fetch(format!("API request to {endpoint} failed: {e}")))?;
            if !response.status().is_success() {
                return Err(AppError::Fetch(format!(
                    "API {endpoint} returned {}",
                    response.status()
                )));
            }
            let body: Value = response
                .json()
                .await
                .map_err(|e| AppError::Fetch(format!("Failed to parse API response: {e}")))?;

            let records = body
                .pointer(&source.config.items_pointer)
                .and_then(Value::as_array)
                .ok_or_else(|| {
                    AppError::Fetch(format!(
                        "API response has no record array at '{}'",
                        source.config.items_pointer
                    ))
                })?;

            for record in records {
                candidates.push(parse_record(record, &source.config));
            }
            if records.is_empty() {
                break;
            }
        }

        Ok(candidates)
    }
}

fn parse_record(record: &Value, config: &SourceConfig) -> RawCandidate {
    let field_str = |name: &str| {
        record
            .get(name)
            .and_then(Value::as_str)
            .map(str::to_string)
    };
    let price = record.get(&config.price_field).and_then(|v| {
        v.as_f64()
            .or_else(|| v.as_str().and_then(|s| s.replace(',', ".").parse().ok()))
    });

    RawCandidate::Api {
        title: field_str(&config.title_field),
        url: field_str(&config.url_field),
        price,
        merchant: field_str(&config.merchant_field),
        image_url: field_str(&config.image_field),
    }
}
