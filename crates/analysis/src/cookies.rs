use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use pa_core::CookieRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CookieRisk {
    Safe,
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Purpose {
    Session,
    Analytics,
    Tracking,
    Functional,
    Unknown,
}

#[derive(Debug, Clone, Serialize)]
pub struct CookieFinding {
    pub name: String,
    pub domain: String,
    pub company: Option<String>,
    pub purpose: Purpose,
    pub risk: CookieRisk,
    pub lifetime_days: Option<i64>,
    pub third_party: bool,
    pub issues: Vec<&'static str>,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct CookieSummary {
    pub total: usize,
    pub third_party_tracking: usize,
    pub by_purpose: std::collections::HashMap<String, usize>,
    pub by_risk: std::collections::HashMap<String, usize>,
    pub security_issues: usize,
    pub longest_lived_days: Option<i64>,
    pub longest_lived_name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CookieAnalysis {
    pub cookies: Vec<CookieFinding>,
    pub summary: CookieSummary,
}

struct KnownCookie {
    matcher: Matcher,
    company: &'static str,
    purpose: Purpose,
    risk: CookieRisk,
}

enum Matcher {
    Exact(&'static str),
    Prefix(&'static str),
}

/// Known-name table, tried in order (first match wins — a deliberately greedy policy,
/// e.g. the Mixpanel `mp_` prefix also absorbs some lookalike first-party cookie
/// names rather than risk a false negative).
static KNOWN_COOKIES: &[KnownCookie] = &[
    KnownCookie { matcher: Matcher::Exact("_ga"), company: "Google Analytics", purpose: Purpose::Analytics, risk: CookieRisk::Medium },
    KnownCookie { matcher: Matcher::Prefix("_ga_"), company: "Google Analytics", purpose: Purpose::Analytics, risk: CookieRisk::Medium },
    KnownCookie { matcher: Matcher::Exact("_gid"), company: "Google Analytics", purpose: Purpose::Analytics, risk: CookieRisk::Medium },
    KnownCookie { matcher: Matcher::Exact("_gat"), company: "Google Analytics", purpose: Purpose::Analytics, risk: CookieRisk::Low },
    KnownCookie { matcher: Matcher::Exact("_fbp"), company: "Meta", purpose: Purpose::Tracking, risk: CookieRisk::High },
    KnownCookie { matcher: Matcher::Exact("_fbc"), company: "Meta", purpose: Purpose::Tracking, risk: CookieRisk::High },
    KnownCookie { matcher: Matcher::Exact("NID"), company: "Google", purpose: Purpose::Tracking, risk: CookieRisk::High },
    KnownCookie { matcher: Matcher::Exact("IDE"), company: "DoubleClick", purpose: Purpose::Tracking, risk: CookieRisk::High },
    KnownCookie { matcher: Matcher::Exact("test_cookie"), company: "DoubleClick", purpose: Purpose::Tracking, risk: CookieRisk::Medium },
    KnownCookie { matcher: Matcher::Prefix("mp_"), company: "Mixpanel", purpose: Purpose::Analytics, risk: CookieRisk::Medium },
    KnownCookie { matcher: Matcher::Prefix("__hs"), company: "HubSpot", purpose: Purpose::Tracking, risk: CookieRisk::Medium },
    KnownCookie { matcher: Matcher::Exact("hubspotutk"), company: "HubSpot", purpose: Purpose::Tracking, risk: CookieRisk::Medium },
    KnownCookie { matcher: Matcher::Prefix("_hj"), company: "Hotjar", purpose: Purpose::Tracking, risk: CookieRisk::High },
    KnownCookie { matcher: Matcher::Exact("JSESSIONID"), company: "", purpose: Purpose::Session, risk: CookieRisk::Safe },
    KnownCookie { matcher: Matcher::Exact("connect.sid"), company: "", purpose: Purpose::Session, risk: CookieRisk::Safe },
    KnownCookie { matcher: Matcher::Exact("csrftoken"), company: "", purpose: Purpose::Functional, risk: CookieRisk::Safe },
    KnownCookie { matcher: Matcher::Prefix("XSRF-"), company: "", purpose: Purpose::Functional, risk: CookieRisk::Safe },
];

static FALLBACK_PATTERNS: Lazy<Vec<(Regex, Purpose, CookieRisk)>> = Lazy::new(|| {
    vec![
        (Regex::new(r"(?i)track|pixel|ad[sv]?_").unwrap(), Purpose::Tracking, CookieRisk::High),
        (Regex::new(r"(?i)analytics|stat|metric").unwrap(), Purpose::Analytics, CookieRisk::Medium),
        (Regex::new(r"(?i)sess|sid$").unwrap(), Purpose::Session, CookieRisk::Safe),
        (Regex::new(r"(?i)pref|lang|theme|consent").unwrap(), Purpose::Functional, CookieRisk::Safe),
    ]
});

/// Per-cookie classification (spec.md §4.I "Cookie deep analysis").
fn classify(name: &str) -> (Option<&'static str>, Purpose, CookieRisk) {
    for known in KNOWN_COOKIES {
        let matched = match known.matcher {
            Matcher::Exact(n) => name == n,
            Matcher::Prefix(p) => name.starts_with(p),
        };
        if matched {
            let company = if known.company.is_empty() { None } else { Some(known.company) };
            return (company, known.purpose, known.risk);
        }
    }
    for (re, purpose, risk) in FALLBACK_PATTERNS.iter() {
        if re.is_match(name) {
            return (None, *purpose, *risk);
        }
    }
    (None, Purpose::Unknown, CookieRisk::Low)
}

/// Lifetime bucket from days-to-expiry (spec.md §4.I): Session -> safe, <30d -> low,
/// <365d -> medium, <730d -> high, >=730d -> critical.
fn lifetime_bucket(days: Option<i64>) -> CookieRisk {
    match days {
        None => CookieRisk::Safe,
        Some(d) if d < 30 => CookieRisk::Low,
        Some(d) if d < 365 => CookieRisk::Medium,
        Some(d) if d < 730 => CookieRisk::High,
        Some(_) => CookieRisk::Critical,
    }
}

fn strip_www(host: &str) -> &str {
    host.strip_prefix("www.").unwrap_or(host)
}

/// Run cookie deep analysis over a page's cookie jar (spec.md §4.I).
pub fn analyze(cookies: &[CookieRecord], page_host: &str) -> CookieAnalysis {
    let page_host = strip_www(page_host);
    let mut findings: Vec<CookieFinding> = cookies
        .iter()
        .map(|c| {
            let (company, purpose, name_risk) = classify(&c.name);
            let lifetime_days = c.expires.map(|exp| {
                let now = chrono::Utc::now().timestamp() as f64;
                ((exp - now) / 86400.0).floor() as i64
            });
            let lifetime_risk = lifetime_bucket(lifetime_days);
            let third_party = strip_www(&c.domain) != page_host;

            let mut issues = Vec::new();
            if !c.secure {
                issues.push("missing_secure");
            }
            if !c.http_only {
                issues.push("missing_http_only");
            }
            let same_site_weak = c.same_site.as_deref().map(|s| s.eq_ignore_ascii_case("none")).unwrap_or(true);
            if same_site_weak {
                issues.push("weak_same_site");
            }

            let mut risk = name_risk.max(lifetime_risk);
            if (lifetime_risk == CookieRisk::Critical && purpose == Purpose::Tracking)
                || (third_party && purpose == Purpose::Tracking)
            {
                risk = CookieRisk::High;
            }

            CookieFinding {
                name: c.name.clone(),
                domain: c.domain.clone(),
                company: company.map(str::to_string),
                purpose,
                risk,
                lifetime_days,
                third_party,
                issues,
            }
        })
        .collect();

    findings.sort_by(|a, b| b.risk.cmp(&a.risk));

    let mut summary = CookieSummary { total: findings.len(), ..Default::default() };
    for f in &findings {
        if f.third_party && f.purpose == Purpose::Tracking {
            summary.third_party_tracking += 1;
        }
        *summary.by_purpose.entry(purpose_label(f.purpose).to_string()).or_insert(0) += 1;
        *summary.by_risk.entry(risk_label(f.risk).to_string()).or_insert(0) += 1;
        summary.security_issues += f.issues.len();
        if let Some(days) = f.lifetime_days {
            if summary.longest_lived_days.map(|cur| days > cur).unwrap_or(true) {
                summary.longest_lived_days = Some(days);
                summary.longest_lived_name = Some(f.name.clone());
            }
        }
    }

    findings.truncate(30);

    CookieAnalysis { cookies: findings, summary }
}

fn purpose_label(p: Purpose) -> &'static str {
    match p {
        Purpose::Session => "session",
        Purpose::Analytics => "analytics",
        Purpose::Tracking => "tracking",
        Purpose::Functional => "functional",
        Purpose::Unknown => "unknown",
    }
}

fn risk_label(r: CookieRisk) -> &'static str {
    match r {
        CookieRisk::Safe => "safe",
        CookieRisk::Low => "low",
        CookieRisk::Medium => "medium",
        CookieRisk::High => "high",
        CookieRisk::Critical => "critical",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cookie(name: &str, domain: &str, secure: bool, http_only: bool) -> CookieRecord {
        CookieRecord {
            name: name.to_string(),
            value: "x".to_string(),
            domain: domain.to_string(),
            path: "/".to_string(),
            secure,
            http_only,
            same_site: None,
            expires: None,
        }
    }

    #[test]
    fn secure_and_insecure_first_party_cookies_both_flagged() {
        let cookies = vec![
            cookie("session_id", "example.com", true, true),
            cookie("tracking_id", "example.com", false, false),
        ];
        let analysis = analyze(&cookies, "example.com");
        assert_eq!(analysis.summary.security_issues, 4);
        assert_eq!(analysis.summary.third_party_tracking, 0);
    }

    #[test]
    fn third_party_tracking_cookie_elevated_to_high() {
        let mut c = cookie("_fbp", "facebook.com", true, true);
        c.same_site = Some("None".to_string());
        let analysis = analyze(&[c], "example.com");
        assert_eq!(analysis.cookies[0].risk, CookieRisk::High);
        assert!(analysis.cookies[0].third_party);
    }

    #[test]
    fn lifetime_monotonicity() {
        assert!(lifetime_bucket(Some(10)) < lifetime_bucket(Some(100)));
        assert!(lifetime_bucket(Some(100)) < lifetime_bucket(Some(400)));
        assert!(lifetime_bucket(Some(400)) < lifetime_bucket(Some(800)));
    }
}
