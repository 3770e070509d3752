use std::collections::HashSet;

use once_cell::sync::Lazy;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Risk {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrackerFinding {
    pub company: String,
    pub risk: Risk,
}

struct TrackerPattern {
    company: &'static str,
    keywords: &'static [&'static str],
    risk: Risk,
}

static TRACKER_PATTERNS: &[TrackerPattern] = &[
    TrackerPattern { company: "Google Analytics", keywords: &["google-analytics.com", "googletagmanager.com", "analytics.js", "gtag/js"], risk: Risk::Medium },
    TrackerPattern { company: "Meta Pixel", keywords: &["connect.facebook.net", "fbevents.js", "facebook.com/tr"], risk: Risk::High },
    TrackerPattern { company: "Amazon Ads", keywords: &["amazon-adsystem.com"], risk: Risk::Medium },
    TrackerPattern { company: "Microsoft Clarity", keywords: &["clarity.ms"], risk: Risk::Medium },
    TrackerPattern { company: "Hotjar", keywords: &["hotjar.com", "static.hotjar.com"], risk: Risk::High },
    TrackerPattern { company: "TikTok Pixel", keywords: &["analytics.tiktok.com", "tiktok.com/i18n/pixel"], risk: Risk::High },
    TrackerPattern { company: "LinkedIn Insight", keywords: &["snap.licdn.com", "px.ads.linkedin.com"], risk: Risk::Medium },
    TrackerPattern { company: "Twitter/X Ads", keywords: &["static.ads-twitter.com", "analytics.twitter.com"], risk: Risk::Medium },
    TrackerPattern { company: "Segment", keywords: &["cdn.segment.com"], risk: Risk::Medium },
    TrackerPattern { company: "Mixpanel", keywords: &["cdn.mxpnl.com", "api.mixpanel.com"], risk: Risk::Medium },
    TrackerPattern { company: "Criteo", keywords: &["criteo.com", "criteo.net"], risk: Risk::High },
    TrackerPattern { company: "DoubleClick", keywords: &["doubleclick.net"], risk: Risk::High },
    TrackerPattern { company: "New Relic", keywords: &["nr-data.net", "newrelic.com"], risk: Risk::Low },
    TrackerPattern { company: "Sentry", keywords: &["sentry.io", "sentry-cdn.com"], risk: Risk::Low },
    TrackerPattern { company: "Intercom", keywords: &["widget.intercom.io"], risk: Risk::Low },
];

/// Hosts that serve general-purpose infrastructure rather than tracking payloads;
/// excluded from tracker detection regardless of keyword overlap.
static CDN_ALLOWLIST: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "cdnjs.cloudflare.com",
        "cdn.jsdelivr.net",
        "unpkg.com",
        "ajax.googleapis.com",
        "fonts.googleapis.com",
        "fonts.gstatic.com",
    ]
    .into_iter()
    .collect()
});

/// Detect trackers among scripts/requests (spec.md §4.I "Tracker detection"). Sources
/// are deduplicated before matching; the first matching company wins per source.
pub fn detect(sources: &[String]) -> Vec<TrackerFinding> {
    let mut seen_companies = HashSet::new();
    let mut findings = Vec::new();

    let mut unique: Vec<&String> = sources.iter().collect();
    unique.sort();
    unique.dedup();

    for source in unique {
        if let Some(host) = extract_host(source) {
            if CDN_ALLOWLIST.contains(host.as_str()) {
                continue;
            }
        }
        let lower = source.to_ascii_lowercase();
        if let Some(pattern) = TRACKER_PATTERNS.iter().find(|p| p.keywords.iter().any(|kw| lower.contains(kw))) {
            if seen_companies.insert(pattern.company) {
                findings.push(TrackerFinding { company: pattern.company.to_string(), risk: pattern.risk });
            }
        }
    }

    findings
}

fn extract_host(url_str: &str) -> Option<String> {
    url::Url::parse(url_str).ok().and_then(|u| u.host_str().map(str::to_string))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_google_analytics() {
        let findings = detect(&["https://www.google-analytics.com/analytics.js".to_string()]);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].company, "Google Analytics");
    }

    #[test]
    fn cdn_allowlisted_hosts_excluded() {
        let findings = detect(&["https://cdnjs.cloudflare.com/ajax/libs/jquery/jquery.min.js".to_string()]);
        assert!(findings.is_empty());
    }

    #[test]
    fn dedups_by_company() {
        let findings = detect(&[
            "https://www.google-analytics.com/analytics.js".to_string(),
            "https://www.googletagmanager.com/gtag/js".to_string(),
        ]);
        assert_eq!(findings.len(), 1);
    }
}
