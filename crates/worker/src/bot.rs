//! User-agent bot classification.
//!
//! Known crawler, monitoring and HTTP-library signatures are matched first.
//! Anything left over falls through to a keyword heuristic.

use regex::{RegexSet, RegexSetBuilder};
use std::sync::LazyLock;

const BOT_SIGNATURES: &[&str] = &[
    // Search engines
    "googlebot",
    "bingbot",
    "yahoo",
    "duckduckbot",
    "baiduspider",
    "yandex",
    "slurp",
    // Social previews
    "facebookexternalhit",
    "twitterbot",
    "linkedinbot",
    "whatsapp",
    "telegrambot",
    "discordbot",
    "slackbot",
    // SEO tools
    "ahrefsbot",
    "semrushbot",
    "mj12bot",
    "dotbot",
    "rogerbot",
    "screaming frog",
    "sitebulb",
    // Generic
    r"\bbot\b",
    r"\bcrawler\b",
    r"\bspider\b",
    r"\bscraper\b",
    r"\bfetcher\b",
    // Headless browsers
    "headlesschrome",
    "phantomjs",
    "selenium",
    "webdriver",
    "puppeteer",
    // Monitoring
    "pingdom",
    "uptimerobot",
    "newrelic",
    "statuscake",
    "sitechecker",
    // Archivers
    r"archive\.org",
    "ia_archiver",
    "wayback",
    // HTTP libraries
    "^curl",
    "^wget",
    "^python-requests",
    "^go-http-client",
    "^axios",
    "^httpie",
];

static SIGNATURES: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSetBuilder::new(BOT_SIGNATURES)
        .case_insensitive(true)
        .build()
        .expect("invalid bot signature pattern")
});

const BROWSER_TOKENS: &[&str] = &["mozilla", "chrome", "safari", "firefox", "edge"];

const SUSPICIOUS_KEYWORDS: &[&str] = &[
    "bot",
    "crawler",
    "fetcher",
    "http",
    "library",
    "monitoring",
    "check",
];

/// Agents shorter than this are judged on keywords alone.
const SHORT_AGENT_LEN: usize = 20;

/// Labels for well-known agents, checked in order.
const NAMED_BOTS: &[(&str, &str)] = &[
    ("googlebot", "Googlebot"),
    ("bingbot", "Bingbot"),
    ("duckduckbot", "DuckDuckBot"),
    ("baiduspider", "Baidu Spider"),
    ("yandex", "Yandex Bot"),
    ("slurp", "Yahoo Slurp"),
    ("facebookexternalhit", "Facebook Bot"),
    ("twitterbot", "Twitter Bot"),
    ("linkedinbot", "LinkedIn Bot"),
    ("whatsapp", "WhatsApp Bot"),
    ("telegrambot", "Telegram Bot"),
    ("ahrefsbot", "Ahrefs Bot"),
    ("semrushbot", "SEMrush Bot"),
    ("mj12bot", "Majestic Bot"),
    ("pingdom", "Pingdom"),
    ("uptimerobot", "UptimeRobot"),
    ("curl", "cURL"),
    ("wget", "Wget"),
    ("python-requests", "Python Requests"),
    ("go-http-client", "Go HTTP Client"),
];

/// Whether `user_agent` belongs to an automated client. An empty agent is a bot.
pub fn is_bot(user_agent: &str) -> bool {
    let ua = user_agent.trim();
    if ua.is_empty() {
        return true;
    }

    if SIGNATURES.is_match(ua) {
        return true;
    }

    let lower = ua.to_lowercase();
    let suspicious = SUSPICIOUS_KEYWORDS.iter().any(|k| lower.contains(k));
    if !suspicious {
        return false;
    }

    if ua.chars().count() < SHORT_AGENT_LEN {
        return true;
    }

    !BROWSER_TOKENS.iter().any(|t| lower.contains(t))
}

/// Best-effort label for a bot agent.
pub fn bot_name(user_agent: &str) -> &'static str {
    if user_agent.is_empty() {
        return "Unknown Bot";
    }

    let lower = user_agent.to_lowercase();
    if let Some((_, label)) = NAMED_BOTS.iter().find(|(needle, _)| lower.contains(needle)) {
        return label;
    }

    if lower.contains("bot") {
        "Generic Bot"
    } else if lower.contains("crawler") {
        "Crawler"
    } else if lower.contains("spider") {
        "Spider"
    } else {
        "Unknown Bot"
    }
}
