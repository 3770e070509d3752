use std::sync::Arc;
use std::time::{Duration, Instant};

use headless_chrome::Tab;
use pa_core::{FingerprintFlags, PageArtifact, RequestRecord};
use serde::Deserialize;
use tracing::warn;

use crate::instrumentation::INIT_SCRIPT;

const HOMEPAGE_NAV_BUDGET: Duration = Duration::from_secs(25);
const LOAD_SETTLE_TIMEOUT: Duration = Duration::from_secs(6);
const JS_SETTLE_WINDOW: Duration = Duration::from_secs(2);

const ERROR_MARKERS: &[&str] = &[
    "ERR_NAME_NOT_RESOLVED",
    "ERR_CONNECTION_REFUSED",
    "ERR_CONNECTION_TIMED_OUT",
    "ERR_TIMED_OUT",
    "ERR_ADDRESS_UNREACHABLE",
    "ERR_INTERNET_DISCONNECTED",
    "ERR_EMPTY_RESPONSE",
    "chrome-error://",
    "neterror",
    "jserrorpage",
    "dns-not-found",
];

const INTERNAL_SCHEMES: &[&str] = &["chrome-error://", "about:", "data:text/html"];

#[derive(Debug, Deserialize, Default)]
struct RawPaState {
    #[serde(default)]
    canvas: bool,
    #[serde(default)]
    webgl: bool,
    #[serde(default)]
    font: bool,
    #[serde(default)]
    keylogger: bool,
    #[serde(rename = "formSnooping", default)]
    form_snooping: bool,
    #[serde(rename = "serviceWorker", default)]
    service_worker: bool,
    #[serde(rename = "beaconCalls", default)]
    beacon_calls: Vec<RawBeacon>,
    #[serde(default)]
    requests: Vec<RawRequest>,
}

#[derive(Debug, Deserialize)]
struct RawBeacon {
    url: String,
    #[serde(rename = "hasData")]
    has_data: bool,
}

#[derive(Debug, Deserialize)]
struct RawRequest {
    url: String,
    method: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(rename = "hasPostData")]
    has_post_data: bool,
}

pub struct DriveOutcome {
    pub artifact: PageArtifact,
    pub failed: bool,
    pub signals_fired: Vec<&'static str>,
}

/// Install the fingerprint-detector script so it runs before any page script
/// (spec.md §4.H step 2). Call once per tab, before the first navigation.
pub fn install_instrumentation(tab: &Arc<Tab>) -> Result<(), String> {
    tab.evaluate(INIT_SCRIPT, false).map_err(|e| e.to_string())?;
    Ok(())
}

/// Drive one page: navigate, settle, run failure detection, collect artifacts
/// (spec.md §4.H steps 3-5, 8). `is_homepage` controls the failure threshold: the
/// homepage fails on >=1 signal, a sub-page only on >=2.
pub fn drive_page(tab: &Arc<Tab>, url: &str, is_homepage: bool) -> Result<DriveOutcome, String> {
    let start = Instant::now();

    tab.navigate_to(url).map_err(|e| e.to_string())?;

    tab.wait_until_navigated().map_err(|e| e.to_string())?;
    if start.elapsed() > HOMEPAGE_NAV_BUDGET {
        warn!(url, "navigation exceeded budget");
    }

    settle(tab);

    let final_url = tab
        .evaluate("window.location.href", false)
        .ok()
        .and_then(|r| r.value)
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_else(|| url.to_string());

    let status = tab
        .evaluate(
            "(performance.getEntriesByType('navigation')[0] || {}).responseStatus || 0",
            false,
        )
        .ok()
        .and_then(|r| r.value)
        .and_then(|v| v.as_u64())
        .map(|v| v as u16);

    // The driver doesn't wire raw response headers, so a CSP delivered via
    // <meta http-equiv> is the only variant we can observe; header-delivered CSP is
    // invisible to this page artifact.
    let meta_csp = tab
        .evaluate(
            "(document.querySelector('meta[http-equiv=\"Content-Security-Policy\" i]') || {}).content || ''",
            false,
        )
        .ok()
        .and_then(|r| r.value)
        .and_then(|v| v.as_str().map(str::to_string))
        .filter(|s| !s.is_empty());

    let body_text = tab
        .evaluate("document.body ? document.body.innerText.slice(0, 5000) : ''", false)
        .ok()
        .and_then(|r| r.value)
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default();

    let raw_state = tab
        .evaluate("JSON.stringify(window.__paState || {})", false)
        .ok()
        .and_then(|r| r.value)
        .and_then(|v| v.as_str().map(str::to_string))
        .and_then(|s| serde_json::from_str::<RawPaState>(&s).ok())
        .unwrap_or_default();

    let internal_links = tab
        .evaluate(
            "Array.from(document.querySelectorAll('a[href]')).map(a => a.href).slice(0, 200)",
            false,
        )
        .ok()
        .and_then(|r| r.value)
        .and_then(|v| serde_json::from_value::<Vec<String>>(v).ok())
        .unwrap_or_default();

    let requests: Vec<RequestRecord> = raw_state
        .requests
        .iter()
        .map(|r| RequestRecord {
            url: r.url.clone(),
            method: r.method.clone(),
            resource_type: r.kind.clone(),
            tracking_params: extract_tracking_params(&r.url),
            has_post_data: r.has_post_data,
        })
        .collect();

    // fetch/XHR instrumentation misses ordinary <script src>/<img>/<link> loads
    // entirely, so a static homepage with no fetch/XHR calls would otherwise always
    // trip "too_few_subresources". The Performance API sees every subresource load
    // regardless of how it was initiated, so it backstops that blind spot.
    let resource_entry_count = tab
        .evaluate("performance.getEntriesByType('resource').length", false)
        .ok()
        .and_then(|r| r.value)
        .and_then(|v| v.as_u64())
        .unwrap_or(0) as usize;

    let signals =
        detect_failure_signals(&final_url, status, &requests, resource_entry_count, &body_text, false);
    let threshold = if is_homepage { 1 } else { 2 };
    let failed = signals.len() >= threshold;

    let redirects = if final_url != url {
        vec![pa_core::RedirectHop {
            from: url.to_string(),
            to: final_url.clone(),
            status: status.unwrap_or(0),
        }]
    } else {
        vec![]
    };

    let artifact = PageArtifact {
        url: final_url,
        is_homepage,
        status,
        requests,
        response_headers: meta_csp
            .into_iter()
            .map(|csp| ("content-security-policy".to_string(), csp))
            .collect(),
        redirects,
        websocket_urls: vec![],
        fingerprints: FingerprintFlags {
            canvas: raw_state.canvas,
            webgl: raw_state.webgl,
            font: raw_state.font,
            keylogger: raw_state.keylogger,
            form_snooping: raw_state.form_snooping,
            service_worker: raw_state.service_worker,
            beacon_calls: raw_state
                .beacon_calls
                .into_iter()
                .map(|b| pa_core::BeaconCall { url: b.url, has_data: b.has_data })
                .collect(),
        },
        scripts: collect_scripts(tab),
        storage_snapshot: Default::default(),
        internal_links,
        body_text_prefix: body_text,
    };

    Ok(DriveOutcome { artifact, failed, signals_fired: signals })
}

/// Wait for `load`, or a 6s settle timeout, whichever comes first; then hold an
/// additional 2s JS-settle window (spec.md §4.H step 3).
fn settle(tab: &Arc<Tab>) {
    let deadline = Instant::now() + LOAD_SETTLE_TIMEOUT;
    loop {
        let ready: bool = tab
            .evaluate("document.readyState === 'complete'", false)
            .ok()
            .and_then(|r| r.value)
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        if ready || Instant::now() >= deadline {
            break;
        }
        std::thread::sleep(Duration::from_millis(150));
    }
    std::thread::sleep(JS_SETTLE_WINDOW);
}

/// Five independent navigation-failure signals (spec.md §4.H "Navigation failure
/// detection"). `had_response` is false when the driver reported no response object at
/// all, distinct from a present-but-erroring response. `resource_entry_count` is the
/// Performance API's view of subresource loads, which (unlike `requests`) sees every
/// `<script src>`/`<img>`/`<link>` load and not just fetch/XHR calls.
fn detect_failure_signals(
    final_url: &str,
    status: Option<u16>,
    requests: &[RequestRecord],
    resource_entry_count: usize,
    body_text: &str,
    had_response: bool,
) -> Vec<&'static str> {
    let mut fired = Vec::new();

    if !had_response && status.is_none() {
        fired.push("no_response_object");
    }
    if status.map(|s| s >= 400).unwrap_or(false) {
        fired.push("http_error_status");
    }
    if INTERNAL_SCHEMES.iter().any(|scheme| final_url.starts_with(scheme)) {
        fired.push("internal_scheme");
    }
    let non_data_requests = requests.iter().filter(|r| !r.url.starts_with("data:")).count();
    if non_data_requests.max(resource_entry_count) <= 1 {
        fired.push("too_few_subresources");
    }
    let body_lower = body_text.to_ascii_lowercase();
    if ERROR_MARKERS.iter().any(|m| body_lower.contains(&m.to_ascii_lowercase())) {
        fired.push("error_marker_in_body");
    }

    fired
}

fn extract_tracking_params(url: &str) -> Vec<String> {
    const TRACKING_PARAM_NAMES: &[&str] = &[
        "utm_source", "utm_medium", "utm_campaign", "utm_term", "utm_content",
        "gclid", "fbclid", "msclkid", "mc_eid", "_ga",
    ];
    let Ok(parsed) = url::Url::parse(url) else { return Vec::new() };
    parsed
        .query_pairs()
        .filter_map(|(k, _)| {
            if TRACKING_PARAM_NAMES.contains(&k.as_ref()) {
                Some(k.into_owned())
            } else {
                None
            }
        })
        .collect()
}

fn collect_scripts(tab: &Arc<Tab>) -> pa_core::ScriptInventory {
    let external_urls = tab
        .evaluate(
            "Array.from(document.scripts).map(s => s.src).filter(Boolean)",
            false,
        )
        .ok()
        .and_then(|r| r.value)
        .and_then(|v| serde_json::from_value::<Vec<String>>(v).ok())
        .unwrap_or_default();

    let inline_lengths = tab
        .evaluate(
            "Array.from(document.scripts).filter(s => !s.src).map(s => s.textContent.length)",
            false,
        )
        .ok()
        .and_then(|r| r.value)
        .and_then(|v| serde_json::from_value::<Vec<usize>>(v).ok())
        .unwrap_or_default();

    let inline = inline_lengths
        .into_iter()
        .map(|len| pa_core::InlineScript { length: len, tracker_signature_present: false })
        .collect();

    pa_core::ScriptInventory { external_urls, inline }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn homepage_fails_on_single_signal() {
        let signals = detect_failure_signals("https://example.com/", Some(503), &[], 0, "", true);
        assert!(signals.contains(&"http_error_status"));
        assert!(signals.len() >= 1);
    }

    #[test]
    fn error_marker_detected() {
        let signals = detect_failure_signals(
            "https://example.com/",
            Some(200),
            &[RequestRecord { url: "https://example.com/".into(), method: "GET".into(), resource_type: "document".into(), tracking_params: vec![], has_post_data: false }],
            1,
            "ERR_CONNECTION_REFUSED",
            true,
        );
        assert!(signals.contains(&"error_marker_in_body"));
    }

    #[test]
    fn healthy_page_fires_no_signals() {
        let reqs: Vec<RequestRecord> = (0..5)
            .map(|i| RequestRecord {
                url: format!("https://example.com/{i}"),
                method: "GET".into(),
                resource_type: "script".into(),
                tracking_params: vec![],
                has_post_data: false,
            })
            .collect();
        let signals = detect_failure_signals("https://example.com/", Some(200), &reqs, 5, "hello world", true);
        assert!(signals.is_empty());
    }

    #[test]
    fn fetch_free_page_with_static_assets_is_not_flagged() {
        let signals = detect_failure_signals("https://example.com/", Some(200), &[], 12, "hello world", true);
        assert!(!signals.contains(&"too_few_subresources"));
    }

    #[test]
    fn tracking_params_extracted() {
        let params = extract_tracking_params("https://example.com/?utm_source=x&foo=bar");
        assert_eq!(params, vec!["utm_source".to_string()]);
    }
}
