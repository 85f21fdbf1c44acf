//! Traffic channel attribution from referrer and landing URL.

use engine_core::Channel;
use url::Url;

const PAID_MARKERS: &[&str] = &[
    "utm_source=google",
    "utm_source=facebook",
    "utm_source=bing",
    "utm_source=linkedin",
    "utm_source=twitter",
    "utm_medium=cpc",
    "utm_medium=ppc",
    "utm_medium=paid",
    "utm_medium=display",
    "gclid=",
    "fbclid=",
    "msclkid=",
    "twclid=",
    "li_fat_id=",
];

const SOCIAL_DOMAINS: &[&str] = &[
    "facebook.com",
    "twitter.com",
    "linkedin.com",
    "instagram.com",
    "pinterest.com",
    "reddit.com",
    "tiktok.com",
    "youtube.com",
    "snapchat.com",
    "tumblr.com",
    "vk.com",
    "weibo.com",
    "t.co",
    "fb.me",
];

const SEARCH_ENGINES: &[&str] = &[
    "google.com",
    "bing.com",
    "yahoo.com",
    "duckduckgo.com",
    "baidu.com",
    "yandex.com",
    "ask.com",
    "aol.com",
    "ecosia.org",
];

/// Classify a visit. First match wins: paid, direct, social, organic, referral.
///
/// A referrer whose host contains `site_domain` is internal navigation and
/// counts as direct.
pub fn detect_channel(referrer: &str, url: &str, site_domain: &str) -> Channel {
    let referrer = referrer.trim().to_lowercase();
    let url = url.trim().to_lowercase();
    let site_domain = site_domain.trim().to_lowercase();

    if PAID_MARKERS.iter().any(|m| url.contains(m)) {
        return Channel::Paid;
    }

    if referrer.is_empty() || referrer == "null" || referrer == "(direct)" {
        return Channel::Direct;
    }

    let host = match extract_domain(&referrer) {
        Some(host) => host,
        None => return Channel::Direct,
    };

    if !site_domain.is_empty() && host.contains(&site_domain) {
        return Channel::Direct;
    }

    if SOCIAL_DOMAINS.iter().any(|d| host.contains(d)) {
        Channel::Social
    } else if SEARCH_ENGINES.iter().any(|d| host.contains(d)) {
        Channel::Organic
    } else {
        Channel::Referral
    }
}

/// Hostname of `raw`, assuming `https://` when no scheme is present.
pub fn extract_domain(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let parsed = if raw.starts_with("http://") || raw.starts_with("https://") {
        Url::parse(raw)
    } else {
        Url::parse(&format!("https://{}", raw))
    };

    parsed
        .ok()?
        .host_str()
        .filter(|h| !h.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paid_wins_over_everything() {
        assert_eq!(
            detect_channel(
                "https://www.facebook.com/",
                "https://shop.example.com/?utm_medium=cpc",
                "shop.example.com"
            ),
            Channel::Paid
        );
        assert_eq!(
            detect_channel("", "https://example.com/landing?gclid=abc123", "example.com"),
            Channel::Paid
        );
        assert_eq!(
            detect_channel("", "https://example.com/?UTM_SOURCE=Google", "example.com"),
            Channel::Paid
        );
    }

    #[test]
    fn test_direct() {
        assert_eq!(detect_channel("", "https://example.com/", "example.com"), Channel::Direct);
        assert_eq!(detect_channel("null", "https://example.com/", ""), Channel::Direct);
        assert_eq!(detect_channel("(direct)", "https://example.com/", ""), Channel::Direct);
        assert_eq!(
            detect_channel("https://example.com/pricing", "https://example.com/", "example.com"),
            Channel::Direct
        );
        assert_eq!(
            detect_channel("https://not a host/", "https://example.com/", "example.com"),
            Channel::Direct
        );
    }

    #[test]
    fn test_internal_navigation_needs_site_domain() {
        assert_eq!(
            detect_channel("https://example.com/pricing", "https://example.com/", ""),
            Channel::Referral
        );
    }

    #[test]
    fn test_social_organic_referral() {
        assert_eq!(
            detect_channel("https://t.co/xyz", "https://example.com/", "example.com"),
            Channel::Social
        );
        assert_eq!(
            detect_channel("www.reddit.com/r/rust", "https://example.com/", "example.com"),
            Channel::Social
        );
        assert_eq!(
            detect_channel("https://www.google.com/search?q=x", "https://example.com/", "example.com"),
            Channel::Organic
        );
        assert_eq!(
            detect_channel("https://duckduckgo.com/", "https://example.com/", "example.com"),
            Channel::Organic
        );
        assert_eq!(
            detect_channel("https://news.ycombinator.com/item?id=1", "https://example.com/", "example.com"),
            Channel::Referral
        );
    }

    #[test]
    fn test_extract_domain() {
        assert_eq!(extract_domain("https://Example.com:8080/a").as_deref(), Some("example.com"));
        assert_eq!(extract_domain("example.com/path").as_deref(), Some("example.com"));
        assert_eq!(extract_domain(""), None);
    }
}
