//! Turns a submitted event into a fully populated [`Event`].
//!
//! Every step degrades to a safe default. Enrichment never fails.

use chrono::Utc;
use engine_core::limits::DEFAULT_PROJECT_ID;
use engine_core::{ClientContext, Event, RawEvent};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use telemetry::metrics;
use tracing::debug;
use woothee::parser::Parser;

use crate::bot::{bot_name, is_bot};
use crate::channel::{detect_channel, extract_domain};
use crate::geo::GeoLookup;

pub struct Enricher {
    geo: Arc<dyn GeoLookup>,
    parser: Parser,
}

impl Enricher {
    pub fn new(geo: Arc<dyn GeoLookup>) -> Self {
        Self {
            geo,
            parser: Parser::new(),
        }
    }

    pub async fn enrich(&self, raw: RawEvent, ctx: &ClientContext) -> Event {
        let start = std::time::Instant::now();

        let ip = raw
            .ip
            .filter(|ip| !ip.trim().is_empty())
            .unwrap_or_else(|| resolve_client_ip(ctx));

        let country = match raw.country.filter(|c| !c.is_empty()) {
            Some(country) => country,
            None => self
                .geo
                .lookup_or_default(&ip)
                .await
                .display_country()
                .to_string(),
        };

        let is_bot = is_bot(&raw.user_agent);
        if is_bot {
            metrics().bot_events.inc();
            debug!(bot = bot_name(&raw.user_agent), "Bot detected");
        }

        let site_domain = extract_domain(&raw.url).unwrap_or_default();
        let channel = detect_channel(&raw.referrer, &raw.url, &site_domain);

        let mut event = Event {
            id: 0,
            timestamp: raw.timestamp.unwrap_or_else(Utc::now),
            event_name: raw.event_name,
            user_id: raw.user_id,
            session_id: raw.session_id,
            session_duration: raw.session_duration,
            url: raw.url,
            referrer: raw.referrer,
            user_agent: raw.user_agent,
            ip,
            country,
            browser: raw.browser.unwrap_or_default(),
            os: raw.os.unwrap_or_default(),
            device: raw.device.unwrap_or_default(),
            is_bot,
            project_id: raw
                .project_id
                .filter(|p| !p.is_empty())
                .unwrap_or_else(|| DEFAULT_PROJECT_ID.to_string()),
            channel,
        };
        self.fill_from_user_agent(&mut event);

        metrics().events_enriched.inc();
        metrics()
            .enrich_latency_ms
            .observe(start.elapsed().as_millis() as u64);
        event
    }

    /// Browser, OS and device from the user agent, where the submitter left them empty.
    fn fill_from_user_agent(&self, event: &mut Event) {
        if event.user_agent.is_empty() {
            return;
        }

        let Some(result) = self.parser.parse(&event.user_agent) else {
            return;
        };

        if event.browser.is_empty() && !result.name.is_empty() && result.name != "UNKNOWN" {
            event.browser = result.name.to_string();
        }
        if event.os.is_empty() && !result.os.is_empty() && result.os != "UNKNOWN" {
            event.os = result.os.to_string();
        }
        if event.device.is_empty() || event.device == "unknown" {
            // woothee categories: pc, smartphone, mobilephone, crawler, appliance, misc
            let device = match result.category {
                "pc" => "desktop",
                "smartphone" | "mobilephone" => "mobile",
                "crawler" => "bot",
                "appliance" => "other",
                _ => "unknown",
            };
            event.device = device.to_string();
        }
    }
}

/// Client address from the forwarded-for chain, the real-IP header, or the peer.
pub fn resolve_client_ip(ctx: &ClientContext) -> String {
    if let Some(first) = ctx
        .forwarded_for
        .as_deref()
        .and_then(|chain| chain.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
    {
        return first.to_string();
    }

    if let Some(real) = ctx.real_ip.as_deref().map(str::trim).filter(|ip| !ip.is_empty()) {
        return real.to_string();
    }

    match ctx.remote_addr.as_deref().map(str::trim) {
        Some(addr) if !addr.is_empty() => {
            if let Ok(socket) = addr.parse::<SocketAddr>() {
                socket.ip().to_string()
            } else if let Ok(ip) = addr.parse::<IpAddr>() {
                ip.to_string()
            } else {
                addr.split(':').next().unwrap_or(addr).to_string()
            }
        }
        _ => String::new(),
    }
}
