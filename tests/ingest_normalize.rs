use dealtracker::fetchers::RawCandidate;
use dealtracker::normalize::{canonicalize_url, extract_price, extract_url, normalize};

#[test]
fn extract_url_strips_trailing_brackets_and_punctuation() {
    let cases = [
        (
            "check this out https://example.com/deal!",
            "https://example.com/deal",
        ),
        (
            "wrapped [https://example.com/a/b?x=1]",
            "https://example.com/a/b?x=1",
        ),
        (
            "quoted \"https://shop.example.com/d\".",
            "https://shop.example.com/d",
        ),
        ("uppercase HTTPS://EXAMPLE.COM/X", "HTTPS://EXAMPLE.COM/X"),
    ];
    for (text, expected) in cases {
        assert_eq!(extract_url(text).as_deref(), Some(expected), "text: {text}");
    }

    assert_eq!(extract_url("no url here, just 50% off"), None);
    assert_eq!(extract_url("ftp://example.com/not-web"), None);
}

#[test]
fn urls_differing_only_in_tracking_noise_canonicalize_identically() {
    let plain = canonicalize_url("https://example.com/deal?id=5").unwrap();
    let with_fragment = canonicalize_url("https://example.com/deal?id=5#reviews").unwrap();
    let with_tracking =
        canonicalize_url("https://example.com/deal?id=5&utm_source=mail&utm_medium=x&gclid=g")
            .unwrap();
    let with_both =
        canonicalize_url("https://EXAMPLE.com/deal?id=5&fbclid=f&igshid=i&mc_eid=m#frag").unwrap();

    assert_eq!(plain, with_fragment);
    assert_eq!(plain, with_tracking);
    assert_eq!(plain, with_both);
    assert_eq!(plain, "https://example.com/deal?id=5");
}

#[test]
fn price_extraction_takes_first_currency_anchored_match() {
    assert_eq!(extract_price("was $40, now $25.50").unwrap().value, 40.0);
    assert_eq!(extract_price("Preis: 9,99€").unwrap().value, 9.99);
    assert_eq!(extract_price("12.34$ shipped").unwrap().value, 12.34);
    assert!(extract_price("save 25% today").is_none());
}

#[test]
fn normalize_is_idempotent_modulo_timestamp() {
    let raw = RawCandidate::Inbound {
        channel: "deals-chat".to_string(),
        text: "Big sale 🎉 $14.99 at https://shop.example.com/item?utm_campaign=spring #deal"
            .to_string(),
    };
    let first = normalize(&raw, "chat_submissions", None).unwrap();
    let second = normalize(&raw, "chat_submissions", None).unwrap();

    assert_eq!(first.title, second.title);
    assert_eq!(first.url, second.url);
    assert_eq!(first.price, second.price);
    assert_eq!(first.merchant, second.merchant);
    assert_eq!(first.source_key, second.source_key);
    assert_eq!(first.submitter_note, second.submitter_note);
}

#[test]
fn inbound_message_normalizes_end_to_end() {
    let raw = RawCandidate::Inbound {
        channel: "deals-chat".to_string(),
        text: "🔥 50% off Widget Pro now $19.99 https://example.com/deal?utm_source=x #sale"
            .to_string(),
    };
    let item = normalize(&raw, "chat_submissions", None).unwrap();

    assert_eq!(item.url, "https://example.com/deal");
    assert_eq!(item.price, Some(19.99));
    assert_eq!(item.merchant.as_deref(), Some("example.com"));
    assert_eq!(item.title, "50% off Widget Pro now");
    assert_eq!(item.source_key, "chat_submissions");
    assert!(item.submitter_note.is_some());
}

#[test]
fn candidate_without_url_is_dropped() {
    let raw = RawCandidate::Inbound {
        channel: "deals-chat".to_string(),
        text: "amazing deal, trust me".to_string(),
    };
    assert!(normalize(&raw, "chat_submissions", None).is_none());
}

#[test]
fn feed_entry_uses_dedicated_fields() {
    let raw = RawCandidate::Feed {
        title: Some("Cordless Drill Combo Kit for $89".to_string()),
        url: Some("https://tools.example.com/drill?utm_source=rss".to_string()),
        summary: Some("Today only.".to_string()),
        published: None,
    };
    let item = normalize(&raw, "dealwire_rss", None).unwrap();
    assert_eq!(item.url, "https://tools.example.com/drill");
    assert_eq!(item.price, Some(89.0));
    assert_eq!(item.merchant.as_deref(), Some("example.com"));
    assert_eq!(item.title, "Cordless Drill Combo Kit for");
}

#[test]
fn api_record_negative_price_treated_as_absent() {
    let raw = RawCandidate::Api {
        title: Some("Mystery box special offer".to_string()),
        url: Some("https://boxes.example.com/mystery".to_string()),
        price: Some(-5.0),
        merchant: Some("Mystery Boxes Inc".to_string()),
        image_url: None,
    };
    let item = normalize(&raw, "bargain_api", None).unwrap();
    assert_eq!(item.price, None);
    assert_eq!(item.merchant.as_deref(), Some("Mystery Boxes Inc"));
}
