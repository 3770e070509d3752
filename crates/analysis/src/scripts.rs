use std::collections::HashMap;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::threat_feed::ThreatFeed;

const MAX_SCRIPTS: usize = 8;
const FETCH_TIMEOUT: Duration = Duration::from_secs(8);
const ANALYSIS_CAP_BYTES: usize = 100_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptRisk {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScriptFinding {
    pub url: String,
    pub sha256: String,
    pub entropy: f64,
    pub obfuscation_score: u32,
    pub obfuscation_signatures: usize,
    pub exfiltration_signatures: usize,
    pub known_bad: bool,
    pub risk: ScriptRisk,
}

static OBFUSCATION_SIGNATURES: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"\beval\s*\(").unwrap(),
        Regex::new(r"new\s+Function\s*\(").unwrap(),
        Regex::new(r"\\x[0-9a-fA-F]{2}").unwrap(),
        Regex::new(r"\\u[0-9a-fA-F]{4}").unwrap(),
        Regex::new(r"\batob\s*\(").unwrap(),
        Regex::new(r"String\.fromCharCode").unwrap(),
        Regex::new(r#"\[['"][a-zA-Z_$][\w$]*['"]\]\s*\("#).unwrap(),
        Regex::new(r#"setTimeout\s*\(\s*['"]"#).unwrap(),
        Regex::new(r"(document|window)\s*\[\s*['\x22]").unwrap(),
    ]
});

static EXFILTRATION_SIGNATURES: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"document\.cookie").unwrap(),
        Regex::new(r"(localStorage|sessionStorage)\s*\.\s*(getItem|setItem)").unwrap(),
        Regex::new(r"navigator\.(userAgent|platform|hardwareConcurrency|deviceMemory)").unwrap(),
        Regex::new(r"screen\.(width|height|colorDepth|pixelDepth)").unwrap(),
        Regex::new(r"\b(fetch|XMLHttpRequest)\s*\(").unwrap(),
        Regex::new(r"navigator\.sendBeacon").unwrap(),
        Regex::new(r"new\s+WebSocket\s*\(").unwrap(),
        Regex::new(r"navigator\.geolocation").unwrap(),
        Regex::new(r"getBattery\s*\(").unwrap(),
        Regex::new(r"getBoundingClientRect\s*\(").unwrap(),
    ]
});

/// Script intelligence (spec.md §4.I "Script intelligence"). Fetches up to 8 non-CDN
/// external scripts, each bounded by an 8s timeout and a 100KB analysis cap.
pub async fn analyze(
    external_urls: &[String],
    threat_feed: &dyn ThreatFeed,
) -> Vec<ScriptFinding> {
    let client = match reqwest::Client::builder().timeout(FETCH_TIMEOUT).build() {
        Ok(c) => c,
        Err(_) => return Vec::new(),
    };

    let mut findings = Vec::new();
    for url in external_urls.iter().filter(|u| !is_cdn_host(u)).take(MAX_SCRIPTS) {
        let body = match tokio::time::timeout(FETCH_TIMEOUT, client.get(url).send()).await {
            Ok(Ok(resp)) => resp.bytes().await.unwrap_or_default(),
            _ => continue,
        };

        let mut hasher = Sha256::new();
        hasher.update(&body);
        let sha256 = format!("{:x}", hasher.finalize());

        let sample_len = body.len().min(ANALYSIS_CAP_BYTES);
        let sample = String::from_utf8_lossy(&body[..sample_len]);

        let entropy = shannon_entropy(&sample);
        let obfuscation_signatures = OBFUSCATION_SIGNATURES.iter().filter(|re| re.is_match(&sample)).count();
        let exfiltration_signatures = EXFILTRATION_SIGNATURES.iter().filter(|re| re.is_match(&sample)).count();
        let obfuscation_score = obfuscation_score(&sample, entropy);
        let known_bad = threat_feed.is_known_bad(&sha256);

        let risk = classify_risk(known_bad, obfuscation_score, obfuscation_signatures, exfiltration_signatures);

        findings.push(ScriptFinding {
            url: url.clone(),
            sha256,
            entropy,
            obfuscation_score,
            obfuscation_signatures,
            exfiltration_signatures,
            known_bad,
            risk,
        });
    }

    findings.sort_by_key(|f| f.risk);
    findings
}

fn is_cdn_host(url: &str) -> bool {
    const ALLOWLIST: &[&str] = &[
        "cdnjs.cloudflare.com",
        "cdn.jsdelivr.net",
        "unpkg.com",
        "ajax.googleapis.com",
    ];
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .map(|host| ALLOWLIST.contains(&host.as_str()))
        .unwrap_or(false)
}

fn shannon_entropy(text: &str) -> f64 {
    if text.is_empty() {
        return 0.0;
    }
    let mut counts: HashMap<u8, usize> = HashMap::new();
    for byte in text.bytes() {
        *counts.entry(byte).or_insert(0) += 1;
    }
    let len = text.len() as f64;
    counts
        .values()
        .map(|&count| {
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Obfuscation score (spec.md §4.I): entropy bands +40/+20/+10 at >5.5/>4.8/>4.2;
/// long-strings band +30/+15 at >5/>2 (per-KB occurrences of 40+ char string
/// literals); non-alpha ratio +20/+10 at >0.35/>0.25; short-var ratio +10 at >50
/// (percent of single/double-char identifiers among declared locals). Clamped to
/// [0,100].
fn obfuscation_score(sample: &str, entropy: f64) -> u32 {
    let mut score: i32 = 0;

    if entropy > 5.5 {
        score += 40;
    } else if entropy > 4.8 {
        score += 20;
    } else if entropy > 4.2 {
        score += 10;
    }

    let long_string_density = long_string_density_per_kb(sample);
    if long_string_density > 5.0 {
        score += 30;
    } else if long_string_density > 2.0 {
        score += 15;
    }

    let non_alpha_ratio = non_alpha_ratio(sample);
    if non_alpha_ratio > 0.35 {
        score += 20;
    } else if non_alpha_ratio > 0.25 {
        score += 10;
    }

    if short_var_pct(sample) > 50.0 {
        score += 10;
    }

    score.clamp(0, 100) as u32
}

static LONG_STRING_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"["'][^"'\n]{40,}["']"#).unwrap());

fn long_string_density_per_kb(sample: &str) -> f64 {
    let count = LONG_STRING_RE.find_iter(sample).count() as f64;
    let kb = (sample.len() as f64 / 1024.0).max(1.0);
    count / kb
}

fn non_alpha_ratio(sample: &str) -> f64 {
    if sample.is_empty() {
        return 0.0;
    }
    let non_alpha = sample.chars().filter(|c| !c.is_alphabetic() && !c.is_whitespace()).count();
    non_alpha as f64 / sample.len() as f64
}

static VAR_DECL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(?:var|let|const)\s+([a-zA-Z_$][\w$]*)").unwrap());

fn short_var_pct(sample: &str) -> f64 {
    let vars: Vec<&str> = VAR_DECL_RE.captures_iter(sample).map(|c| c.get(1).unwrap().as_str()).collect();
    if vars.is_empty() {
        return 0.0;
    }
    let short = vars.iter().filter(|v| v.len() <= 2).count();
    (short as f64 / vars.len() as f64) * 100.0
}

/// Risk banding (spec.md §4.I): high if knownBad or score>=60 or >=2 high-severity
/// signatures (we treat any exfiltration signature hit as high-severity, matching the
/// source's "high-severity signature" framing); medium if score>=30 or >=1
/// high-severity or >=3 total signatures; else low.
fn classify_risk(known_bad: bool, score: u32, obfuscation_sigs: usize, exfil_sigs: usize) -> ScriptRisk {
    if known_bad || score >= 60 || exfil_sigs >= 2 {
        return ScriptRisk::High;
    }
    if score >= 30 || exfil_sigs >= 1 || (obfuscation_sigs + exfil_sigs) >= 3 {
        return ScriptRisk::Medium;
    }
    ScriptRisk::Low
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entropy_of_repeated_char_is_zero() {
        assert_eq!(shannon_entropy("aaaaaaaa"), 0.0);
    }

    #[test]
    fn entropy_of_varied_text_is_positive() {
        assert!(shannon_entropy("the quick brown fox jumps over the lazy dog") > 0.0);
    }

    #[test]
    fn obfuscation_score_clamped() {
        let noisy = "\\x41\\x42".repeat(2000);
        let score = obfuscation_score(&noisy, 7.9);
        assert!(score <= 100);
    }

    #[test]
    fn risk_escalates_with_exfiltration_signatures() {
        assert_eq!(classify_risk(false, 10, 0, 2), ScriptRisk::High);
        assert_eq!(classify_risk(false, 10, 0, 1), ScriptRisk::Medium);
        assert_eq!(classify_risk(false, 10, 0, 0), ScriptRisk::Low);
    }

    #[test]
    fn known_bad_always_high() {
        assert_eq!(classify_risk(true, 0, 0, 0), ScriptRisk::High);
    }
}
