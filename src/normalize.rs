use chrono::Utc;
use once_cell::sync::OnceCell;
use regex::Regex;
use url::Url;

use crate::fetchers::RawCandidate;
use crate::store::CanonicalItem;

/// Titles shorter than this after cleaning fall back to the merchant name.
const MIN_TITLE_LEN: usize = 12;
const MAX_TITLE_LEN: usize = 140;

/// Query parameters removed during URL canonicalization, in addition to the
/// `utm_*` family.
const TRACKING_PARAMS: &[&str] = &["gclid", "fbclid", "igshid", "mc_eid"];

fn re_url() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bhttps?://[^\s<>]+").unwrap())
}

fn re_price() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)(?:[$€£]|\b(?:usd|eur|gbp)\b)\s*\d+(?:[.,]\d{1,2})?|\d+(?:[.,]\d{1,2})?\s*(?:[$€£]|\b(?:usd|eur|gbp)\b)",
        )
        .unwrap()
    })
}

fn re_number() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"\d+(?:[.,]\d{1,2})?").unwrap())
}

fn re_hashtag() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"[#@]\w+").unwrap())
}

fn re_emoji() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| {
        Regex::new(r"[\u{1F000}-\u{1FAFF}\u{2600}-\u{27BF}\u{2B00}-\u{2BFF}\u{FE0F}\u{200D}]+")
            .unwrap()
    })
}

fn re_whitespace() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"\s+").unwrap())
}

/// First absolute http(s) URL in free text, with trailing punctuation and
/// closing brackets stripped. None when the text carries no URL.
pub fn extract_url(text: &str) -> Option<String> {
    let found = re_url().find(text)?;
    let trimmed = trim_url_token(found.as_str());
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn trim_url_token(token: &str) -> &str {
    token.trim_end_matches([
        '.', ',', ';', ':', '!', '?', ')', ']', '}', '>', '"', '\'', '`', '…', '»',
    ])
}

fn is_tracking_param(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    name.starts_with("utm_") || TRACKING_PARAMS.contains(&name.as_str())
}

/// Parse and canonicalize: http(s) only, fragment cleared, tracking
/// parameters dropped.
fn parse_canonical(raw: &str) -> Option<Url> {
    let mut url = Url::parse(raw.trim()).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    url.set_fragment(None);
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !is_tracking_param(k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if kept.is_empty() {
        url.set_query(None);
    } else {
        let mut pairs = url.query_pairs_mut();
        pairs.clear();
        for (k, v) in &kept {
            pairs.append_pair(k, v);
        }
    }
    Some(url)
}

/// Canonical form used for duplicate comparison and as the storage key.
pub fn canonicalize_url(raw: &str) -> Option<String> {
    parse_canonical(raw).map(|url| url.to_string().to_lowercase())
}

/// Registrable domain: the last two labels of the hostname, lower-cased.
pub fn registrable_domain(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    if host.parse::<std::net::IpAddr>().is_ok() {
        return Some(host.to_string());
    }
    let host = host.trim_end_matches('.');
    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() >= 2 {
        Some(labels[labels.len() - 2..].join(".").to_lowercase())
    } else {
        Some(host.to_lowercase())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PriceMatch {
    pub value: f64,
    pub matched: String,
}

/// First currency-anchored amount in the text. Accepts both `$12.34` and
/// `12.34$` orderings; comma decimal separators are normalized to a dot.
pub fn extract_price(text: &str) -> Option<PriceMatch> {
    let matched = re_price().find(text)?;
    let number = re_number().find(matched.as_str())?;
    let value: f64 = number.as_str().replace(',', ".").parse().ok()?;
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    Some(PriceMatch {
        value,
        matched: matched.as_str().to_string(),
    })
}

/// Derive a display title from source text: URL and price substrings,
/// hashtag/mention tokens, and decorative symbol runs are removed, then
/// whitespace is collapsed and the result capped at 140 characters with
/// trailing punctuation trimmed. Falls back to the merchant name when the
/// remainder is shorter than the minimum length.
pub fn clean_title(text: &str, strip: &[&str], merchant: Option<&str>) -> Option<String> {
    let mut title = text.to_string();
    for fragment in strip {
        if !fragment.is_empty() {
            title = title.replace(fragment, " ");
        }
    }
    title = re_hashtag().replace_all(&title, " ").into_owned();
    title = re_emoji().replace_all(&title, " ").into_owned();
    title = re_whitespace()
        .replace_all(&title, " ")
        .trim()
        .to_string();

    if title.chars().count() > MAX_TITLE_LEN {
        title = title.chars().take(MAX_TITLE_LEN).collect();
    }
    while let Some(last) = title.chars().last() {
        if last.is_whitespace()
            || matches!(
                last,
                '-' | '–' | '—' | '|' | ':' | ';' | ',' | '.' | '!' | '?' | '~' | '*'
            )
        {
            title.pop();
        } else {
            break;
        }
    }

    if title.chars().count() < MIN_TITLE_LEN
        && let Some(merchant) = merchant
    {
        return Some(merchant.to_string());
    }
    if title.is_empty() { None } else { Some(title) }
}

struct ItemParts<'a> {
    text: &'a str,
    explicit_url: Option<&'a str>,
    price_text: Option<&'a str>,
    explicit_price: Option<f64>,
    merchant: Option<String>,
    image_url: Option<String>,
    submitter_note: Option<String>,
}

/// Convert one raw candidate into the canonical item schema. Candidates
/// without an extractable URL or a usable title produce None and are dropped
/// from the batch.
pub fn normalize(
    raw: &RawCandidate,
    source_key: &str,
    default_merchant: Option<&str>,
) -> Option<CanonicalItem> {
    let parts = match raw {
        RawCandidate::Feed {
            title,
            url,
            summary,
            ..
        } => ItemParts {
            text: title.as_deref().unwrap_or_default(),
            explicit_url: url.as_deref(),
            price_text: summary.as_deref(),
            explicit_price: None,
            merchant: None,
            image_url: None,
            submitter_note: None,
        },
        RawCandidate::Api {
            title,
            url,
            price,
            merchant,
            image_url,
        } => ItemParts {
            text: title.as_deref().unwrap_or_default(),
            explicit_url: url.as_deref(),
            price_text: None,
            explicit_price: *price,
            merchant: merchant.clone(),
            image_url: image_url.clone(),
            submitter_note: None,
        },
        RawCandidate::Scraped {
            title,
            url,
            price_text,
            text,
        } => ItemParts {
            text: title.as_deref().unwrap_or(text),
            explicit_url: url.as_deref(),
            price_text: price_text.as_deref(),
            explicit_price: None,
            merchant: None,
            image_url: None,
            submitter_note: None,
        },
        RawCandidate::Inbound { text, .. } => ItemParts {
            text,
            explicit_url: None,
            price_text: None,
            explicit_price: None,
            merchant: None,
            image_url: None,
            submitter_note: Some(text.clone()),
        },
    };
    build_item(source_key, default_merchant, parts)
}

fn build_item(
    source_key: &str,
    default_merchant: Option<&str>,
    parts: ItemParts<'_>,
) -> Option<CanonicalItem> {
    let raw_url = match parts.explicit_url {
        Some(explicit) => {
            let trimmed = trim_url_token(explicit.trim());
            if trimmed.is_empty() {
                return None;
            }
            trimmed.to_string()
        }
        None => extract_url(parts.text)?,
    };
    let url = parse_canonical(&raw_url)?;
    let canonical = url.to_string().to_lowercase();

    let price_match = if parts.explicit_price.is_some() {
        None
    } else {
        // Prefer the title text so the matched substring can be stripped
        // from it; fall back to the auxiliary text (feed summary, scraped
        // price cell).
        extract_price(parts.text).or_else(|| parts.price_text.and_then(extract_price))
    };
    let price = parts
        .explicit_price
        .filter(|p| p.is_finite() && *p >= 0.0)
        .or(price_match.as_ref().map(|m| m.value));

    let merchant = parts
        .merchant
        .filter(|m| !m.trim().is_empty())
        .or_else(|| default_merchant.map(str::to_string))
        .or_else(|| registrable_domain(&url));

    let price_fragment = price_match.as_ref().map(|m| m.matched.as_str());
    let strip: Vec<&str> = std::iter::once(raw_url.as_str())
        .chain(price_fragment)
        .collect();
    let title = clean_title(parts.text, &strip, merchant.as_deref())?;

    Some(CanonicalItem {
        title,
        url: canonical,
        price,
        merchant,
        image_url: parts.image_url,
        source_key: source_key.to_string(),
        submitter_note: parts.submitter_note,
        created_at: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_url_trims_trailing_punctuation() {
        assert_eq!(
            extract_url("deal here (https://shop.example.com/d/1)."),
            Some("https://shop.example.com/d/1".to_string())
        );
        assert_eq!(extract_url("no links in this text"), None);
    }

    #[test]
    fn price_accepts_both_orderings_and_comma_decimals() {
        assert_eq!(extract_price("now $19.99 only").unwrap().value, 19.99);
        assert_eq!(extract_price("nur 12,50€ heute").unwrap().value, 12.5);
        assert_eq!(extract_price("around 30 USD shipped").unwrap().value, 30.0);
        assert!(extract_price("50% off everything").is_none());
    }

    #[test]
    fn canonical_form_drops_tracking_and_fragment() {
        assert_eq!(
            canonicalize_url("https://Example.com/Deal?utm_source=x&gclid=abc#top"),
            Some("https://example.com/deal".to_string())
        );
        assert_eq!(
            canonicalize_url("https://example.com/d?id=7&fbclid=zz"),
            Some("https://example.com/d?id=7".to_string())
        );
        assert_eq!(canonicalize_url("ftp://example.com/file"), None);
    }

    #[test]
    fn registrable_domain_takes_last_two_labels() {
        let url = Url::parse("https://www.shop.example.co/x").unwrap();
        assert_eq!(registrable_domain(&url), Some("example.co".to_string()));
    }

    #[test]
    fn short_title_falls_back_to_merchant() {
        let title = clean_title("wow https://example.com/d", &["https://example.com/d"], Some("example.com"));
        assert_eq!(title, Some("example.com".to_string()));
    }

    #[test]
    fn short_title_without_merchant_is_kept() {
        assert_eq!(clean_title("tiny deal", &[], None), Some("tiny deal".to_string()));
        assert_eq!(clean_title("🔥🔥🔥", &[], None), None);
    }
}
