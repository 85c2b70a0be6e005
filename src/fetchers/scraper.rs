use async_trait::async_trait;
use scraper::{Html, Selector};
use url::Url;

use crate::error::AppError;
use crate::fetchers::{Fetcher, RawCandidate};
use crate::ratelimit::RateLimiter;
use crate::registry::{SourceConfig, SourceDefinition, SourceKind};

/// Structural page scrape, optionally through a proxy. The least reliable
/// fetcher kind; scraper sources ship default-disabled in the catalog.
pub struct ScraperFetcher {
    client: reqwest::Client,
}

impl ScraperFetcher {
    pub fn new(client: reqwest::Client) -> ScraperFetcher {
        ScraperFetcher { client }
    }
}

#[async_trait]
impl Fetcher for ScraperFetcher {
    fn kind(&self) -> SourceKind {
        SourceKind::Scraper
    }

    async fn fetch(
        &self,
        source: &SourceDefinition,
        _limiter: &RateLimiter,
    ) -> Result<Vec<RawCandidate>, AppError> {
        let page_url = source.config.url.as_deref().ok_or_else(|| {
            AppError::Config(format!("Scraper source '{}' has no url", source.key))
        })?;

        let client = match source.config.proxy_url.as_deref() {
            Some(proxy_url) => {
                let proxy = reqwest::Proxy::all(proxy_url)
                    .map_err(|e| AppError::Config(format!("Invalid proxy url: {e}")))?;
                reqwest::Client::builder()
                    .proxy(proxy)
                    .build()
                    .map_err(|e| AppError::Internal(format!("Failed to build proxied client: {e}")))?
            }
            None => self.client.clone(),
        };

        let mut request = client.get(page_url);
        for (name, value) in &source.config.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        let response = request
            .send()
            .await
            .map_err(|e| AppError::Fetch(format!("Scrape of {page_url} failed: {e}")))?;
        if !response.status().is_success() {
            return Err(AppError::Fetch(format!(
                "Scrape of {page_url} returned {}",
                response.status()
            )));
        }
        let body = response
            .text()
            .await
            .map_err(|e| AppError::Fetch(format!("Failed to read scraped page: {e}")))?;

        extract_candidates(&body, page_url, &source.config)
    }
}

// Parsing is kept synchronous and free of await points: scraper's DOM types
// are not Send and must not be held across a suspend.
fn extract_candidates(
    body: &str,
    page_url: &str,
    config: &SourceConfig,
) -> Result<Vec<RawCandidate>, AppError> {
    let item_selector = config
        .item_selector
        .as_deref()
        .ok_or_else(|| AppError::Config("Scraper source has no item_selector".to_string()))?;
    let item_selector = parse_selector(item_selector)?;
    let title_selector = config
        .title_selector
        .as_deref()
        .map(parse_selector)
        .transpose()?;
    let price_selector = config
        .price_selector
        .as_deref()
        .map(parse_selector)
        .transpose()?;
    let link_selector = parse_selector("a[href]")?;

    let base = Url::parse(page_url)
        .map_err(|e| AppError::Config(format!("Scraper url is not absolute: {e}")))?;
    let document = Html::parse_document(body);

    let mut candidates = Vec::new();
    for element in document.select(&item_selector) {
        let text = collapse(element.text().collect::<String>());
        let title = title_selector.as_ref().and_then(|sel| {
            element
                .select(sel)
                .next()
                .map(|node| collapse(node.text().collect::<String>()))
                .filter(|t| !t.is_empty())
        });
        let price_text = price_selector.as_ref().and_then(|sel| {
            element
                .select(sel)
                .next()
                .map(|node| collapse(node.text().collect::<String>()))
                .filter(|t| !t.is_empty())
        });
        let href = element
            .value()
            .attr("href")
            .map(str::to_string)
            .or_else(|| {
                element
                    .select(&link_selector)
                    .next()
                    .and_then(|node| node.value().attr("href"))
                    .map(str::to_string)
            });
        let url = href
            .and_then(|href| base.join(&href).ok())
            .map(|resolved| resolved.to_string());

        candidates.push(RawCandidate::Scraped {
            title,
            url,
            price_text,
            text,
        });
    }
    Ok(candidates)
}

fn parse_selector(selector: &str) -> Result<Selector, AppError> {
    Selector::parse(selector)
        .map_err(|e| AppError::Config(format!("Invalid CSS selector '{selector}': {e}")))
}

fn collapse(text: String) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
