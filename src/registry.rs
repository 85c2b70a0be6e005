use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::ratelimit::RateLimit;

/// Source catalog. Loaded once at process start and read-only thereafter;
/// enabling or disabling a source is a config change plus restart, not a
/// runtime operation.
#[derive(Debug)]
pub struct Registry {
    sources: Vec<SourceDefinition>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Feed,
    Api,
    Scraper,
    Inbound,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDefinition {
    /// Unique catalog key, e.g. "slickdeals_rss"
    pub key: String,
    pub kind: SourceKind,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Lower value = higher priority
    #[serde(default)]
    pub priority: i32,
    /// Five-field cron expression. Absent for push-driven (inbound) sources.
    #[serde(default)]
    pub schedule: Option<String>,
    pub rate_limit: RateLimit,
    #[serde(default)]
    pub config: SourceConfig,
}

/// Type-specific knobs. One flat struct with optional fields rather than an
/// enum so the catalog file stays plain JSON; each fetcher validates the
/// fields it needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Feed URL, API endpoint, or page to scrape
    pub url: Option<String>,
    /// Extra request headers (feed and scraper fetchers)
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Name of the environment variable holding the API credential
    pub api_key_env: Option<String>,
    /// Credential scheme: "bearer" (default) or "basic"
    pub auth: Option<String>,
    /// Number of pages to request from an API source
    #[serde(default = "default_pages")]
    pub pages: u32,
    /// Query parameter used for pagination
    #[serde(default = "default_page_param")]
    pub page_param: String,
    /// JSON pointer to the record array in an API response ("" = root)
    #[serde(default)]
    pub items_pointer: String,
    #[serde(default = "default_title_field")]
    pub title_field: String,
    #[serde(default = "default_url_field")]
    pub url_field: String,
    #[serde(default = "default_price_field")]
    pub price_field: String,
    #[serde(default = "default_merchant_field")]
    pub merchant_field: String,
    #[serde(default = "default_image_field")]
    pub image_field: String,
    /// CSS selector for one candidate block on a scraped page
    pub item_selector: Option<String>,
    pub title_selector: Option<String>,
    pub price_selector: Option<String>,
    /// Outbound proxy for the scraper fetcher
    pub proxy_url: Option<String>,
    /// Channel identities accepted by an inbound source; empty = all
    #[serde(default)]
    pub allowed_channels: Vec<String>,
    /// Source-provided merchant name, takes precedence over URL derivation
    pub merchant: Option<String>,
}

// Keep Default in sync with the serde field defaults above.
impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig {
            url: None,
            headers: HashMap::new(),
            api_key_env: None,
            auth: None,
            pages: default_pages(),
            page_param: default_page_param(),
            items_pointer: String::new(),
            title_field: default_title_field(),
            url_field: default_url_field(),
            price_field: default_price_field(),
            merchant_field: default_merchant_field(),
            image_field: default_image_field(),
            item_selector: None,
            title_selector: None,
            price_selector: None,
            proxy_url: None,
            allowed_channels: Vec::new(),
            merchant: None,
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_pages() -> u32 {
    1
}

fn default_page_param() -> String {
    "page".to_string()
}

fn default_title_field() -> String {
    "title".to_string()
}

fn default_url_field() -> String {
    "url".to_string()
}

fn default_price_field() -> String {
    "price".to_string()
}

fn default_merchant_field() -> String {
    "merchant".to_string()
}

fn default_image_field() -> String {
    "image_url".to_string()
}

#[derive(Debug, Deserialize)]
struct Catalog {
    sources: Vec<SourceDefinition>,
}

impl Registry {
    pub fn new(sources: Vec<SourceDefinition>) -> Result<Registry, AppError> {
        let mut seen = std::collections::HashSet::new();
        for source in &sources {
            if !seen.insert(source.key.as_str()) {
                return Err(AppError::Config(format!(
                    "Duplicate source key '{}' in catalog",
                    source.key
                )));
            }
            if source.kind != SourceKind::Inbound && source.schedule.is_none() {
                return Err(AppError::Config(format!(
                    "Source '{}' has no schedule",
                    source.key
                )));
            }
        }

        let mut sources = sources;
        sources.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.key.cmp(&b.key)));
        Ok(Registry { sources })
    }

    pub fn from_file(path: &str) -> Result<Registry, AppError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read source catalog {path}: {e}")))?;
        let catalog: Catalog = serde_json::from_str(&text)
            .map_err(|e| AppError::Config(format!("Failed to parse source catalog {path}: {e}")))?;
        Registry::new(catalog.sources)
    }

    /// Enabled sources, priority ascending, key ascending for ties.
    pub fn list_enabled(&self) -> Vec<&SourceDefinition> {
        self.sources.iter().filter(|s| s.enabled).collect()
    }

    pub fn get(&self, key: &str) -> Option<&SourceDefinition> {
        self.sources.iter().find(|s| s.key == key)
    }

    pub fn is_enabled(&self, key: &str) -> bool {
        self.get(key).map(|s| s.enabled).unwrap_or(false)
    }
}
