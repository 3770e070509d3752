use serde::Serialize;

use pa_core::{CrawlRecord, FingerprintFlags};

use crate::trackers::{Risk, TrackerFinding};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalType {
    Safe,
    Info,
    Warning,
    Danger,
}

#[derive(Debug, Clone, Serialize)]
pub struct SecuritySignal {
    #[serde(rename = "type")]
    pub signal_type: SignalType,
    pub category: String,
    pub message: String,
}

fn signal(signal_type: SignalType, category: &str, message: impl Into<String>) -> SecuritySignal {
    SecuritySignal { signal_type, category: category.to_string(), message: message.into() }
}

/// Security signal roll-up (spec.md §4.I "Security signals") over the homepage
/// artifact plus crawl-wide aggregates (redirects, cookies, trackers).
pub fn analyze(
    record: &CrawlRecord,
    trackers: &[TrackerFinding],
    cookie_count: usize,
    external_domain_count: usize,
    tracking_param_hits: usize,
) -> Vec<SecuritySignal> {
    let mut signals = Vec::new();
    let Some(home) = record.pages.iter().find(|p| p.is_homepage) else {
        return signals;
    };

    if record.is_https {
        signals.push(signal(SignalType::Safe, "transport", "Site is served over HTTPS"));
    } else {
        signals.push(signal(SignalType::Danger, "transport", "Site is served over plain HTTP"));
    }

    match home.response_headers.get("content-security-policy") {
        Some(csp) => {
            signals.push(signal(SignalType::Safe, "csp", "Content-Security-Policy header present"));
            if csp.contains("unsafe-inline") {
                signals.push(signal(SignalType::Warning, "csp", "CSP allows 'unsafe-inline'"));
            }
            if csp.contains("unsafe-eval") {
                signals.push(signal(SignalType::Warning, "csp", "CSP allows 'unsafe-eval'"));
            }
        }
        None => {
            signals.push(signal(SignalType::Warning, "csp", "No Content-Security-Policy header"));
        }
    }

    push_fingerprint_signals(&mut signals, &home.fingerprints);

    if !home.fingerprints.beacon_calls.is_empty() {
        signals.push(signal(
            SignalType::Warning,
            "beacons",
            format!("{} beacon call(s) observed", home.fingerprints.beacon_calls.len()),
        ));
    }

    if !home.websocket_urls.is_empty() {
        signals.push(signal(
            SignalType::Info,
            "websocket",
            format!("{} WebSocket connection(s) opened", home.websocket_urls.len()),
        ));
    }

    if home.fingerprints.service_worker {
        signals.push(signal(SignalType::Info, "service_worker", "Service worker registered"));
    }

    let redirect_count = home.redirects.len();
    if redirect_count > 3 {
        signals.push(signal(SignalType::Warning, "redirects", format!("{} redirects before landing", redirect_count)));
    }

    if tracking_param_hits > 0 {
        signals.push(signal(
            SignalType::Info,
            "tracking_params",
            format!("{} tracking parameter(s) found in outgoing requests", tracking_param_hits),
        ));
    }

    if cookie_count > 20 {
        signals.push(signal(SignalType::Danger, "cookies", format!("{} cookies set, well above typical usage", cookie_count)));
    } else if cookie_count > 0 {
        signals.push(signal(SignalType::Info, "cookies", format!("{} cookie(s) set", cookie_count)));
    }

    let inline_tracker_scripts = home.scripts.inline.iter().filter(|s| s.tracker_signature_present).count();
    if inline_tracker_scripts > 0 {
        signals.push(signal(
            SignalType::Warning,
            "inline_scripts",
            format!("{} inline script(s) contain tracker signatures", inline_tracker_scripts),
        ));
    }

    if external_domain_count > 10 {
        signals.push(signal(SignalType::Danger, "third_parties", format!("{} distinct external domains contacted", external_domain_count)));
    } else if external_domain_count > 5 {
        signals.push(signal(SignalType::Warning, "third_parties", format!("{} distinct external domains contacted", external_domain_count)));
    } else if external_domain_count > 0 {
        signals.push(signal(SignalType::Info, "third_parties", format!("{} distinct external domain(s) contacted", external_domain_count)));
    }

    if trackers.iter().any(|t| t.risk == Risk::High) {
        let names: Vec<&str> = trackers.iter().filter(|t| t.risk == Risk::High).map(|t| t.company.as_str()).collect();
        signals.push(signal(SignalType::Danger, "trackers", format!("High-risk trackers present: {}", names.join(", "))));
    }

    signals
}

fn push_fingerprint_signals(signals: &mut Vec<SecuritySignal>, flags: &FingerprintFlags) {
    if flags.canvas {
        signals.push(signal(SignalType::Warning, "fingerprinting", "Canvas fingerprinting detected"));
    }
    if flags.webgl {
        signals.push(signal(SignalType::Warning, "fingerprinting", "WebGL fingerprinting detected"));
    }
    if flags.font {
        signals.push(signal(SignalType::Info, "fingerprinting", "Font enumeration detected"));
    }
    if flags.keylogger {
        signals.push(signal(SignalType::Danger, "keylogger", "Keystroke capture on non-form elements detected"));
    }
    if flags.form_snooping {
        signals.push(signal(SignalType::Danger, "form_snooping", "Form field values read before submission"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pa_core::PageArtifact;

    fn record_with(home: PageArtifact, is_https: bool) -> CrawlRecord {
        CrawlRecord { target_url: "https://example.com".to_string(), is_https, pages: vec![home], cookies: vec![] }
    }

    #[test]
    fn http_site_flagged_danger() {
        let home = PageArtifact { is_homepage: true, ..Default::default() };
        let record = record_with(home, false);
        let signals = analyze(&record, &[], 0, 0, 0);
        assert!(signals.iter().any(|s| s.category == "transport" && s.signal_type == SignalType::Danger));
    }

    #[test]
    fn canvas_fingerprint_flagged() {
        let mut home = PageArtifact { is_homepage: true, ..Default::default() };
        home.fingerprints.canvas = true;
        let record = record_with(home, true);
        let signals = analyze(&record, &[], 0, 0, 0);
        assert!(signals.iter().any(|s| s.category == "fingerprinting"));
    }

    #[test]
    fn high_cookie_count_is_danger() {
        let home = PageArtifact { is_homepage: true, ..Default::default() };
        let record = record_with(home, true);
        let signals = analyze(&record, &[], 25, 0, 0);
        assert!(signals.iter().any(|s| s.category == "cookies" && s.signal_type == SignalType::Danger));
    }
}
