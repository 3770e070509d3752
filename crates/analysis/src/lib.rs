pub mod cookies;
pub mod ownership;
pub mod score;
pub mod scripts;
pub mod security;
pub mod threat_feed;
pub mod trackers;

use std::collections::HashSet;

use pa_core::{CrawlRecord, PageArtifact, ScanResult};
use uuid::Uuid;

use threat_feed::ThreatFeed;

/// Ties the cookie, tracker, script, ownership, security and score producers
/// together into the persisted Result shape (spec.md §4.I).
pub struct AnalysisPipeline<'a> {
    threat_feed: &'a dyn ThreatFeed,
}

impl<'a> AnalysisPipeline<'a> {
    pub fn new(threat_feed: &'a dyn ThreatFeed) -> Self {
        Self { threat_feed }
    }

    pub async fn analyze(&self, job_id: Uuid, record: &CrawlRecord) -> ScanResult {
        let target_host = url::Url::parse(&record.target_url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_default();
        let target_host = target_host.strip_prefix("www.").unwrap_or(&target_host).to_string();

        let homepage = record.pages.iter().find(|p| p.is_homepage).or_else(|| record.pages.first());

        let all_sources = collect_sources(&record.pages);
        let tracker_findings = trackers::detect(&all_sources);

        let cookie_analysis = cookies::analyze(&record.cookies, &target_host);

        let external_urls = collect_external_script_urls(&record.pages);
        let script_findings = scripts::analyze(&external_urls, self.threat_feed).await;

        let external_domains = collect_external_domains(&record.pages, &target_host);
        let ownership_graph = ownership::build(&target_host, &external_domains);

        let tracking_param_hits: usize = record
            .pages
            .iter()
            .flat_map(|p| p.requests.iter())
            .filter(|r| !r.tracking_params.is_empty())
            .count();

        let has_csp = homepage
            .map(|h| h.response_headers.contains_key("content-security-policy"))
            .unwrap_or(false);

        let inline_tracker_scripts = homepage
            .map(|h| h.scripts.inline.iter().filter(|s| s.tracker_signature_present).count())
            .unwrap_or(0);

        let fingerprints = homepage.map(|h| h.fingerprints.clone()).unwrap_or_default();

        let security_signals = if let Some(_home) = homepage {
            security::analyze(record, &tracker_findings, cookie_analysis.summary.total, external_domains.len(), tracking_param_hits)
        } else {
            Vec::new()
        };

        let score_result = score::compute(&score::ScoreInputs {
            tracker_count: tracker_findings.len() as i32,
            cookie_count: cookie_analysis.summary.total as i32,
            is_https: record.is_https,
            has_csp,
            fingerprints: fingerprints.clone(),
            any_tracking_param: tracking_param_hits > 0,
            inline_tracker_scripts: inline_tracker_scripts as i32,
        });

        let summary = build_summary(&tracker_findings, &cookie_analysis.summary, external_domains.len(), score_result.score);

        let raw_data = serde_json::json!({
            "trackers": tracker_findings,
            "cookies": cookie_analysis,
            "scripts": script_findings,
            "ownership": ownership_graph,
            "security": security_signals,
        });

        ScanResult {
            id: Uuid::new_v4(),
            scan_job_id: job_id,
            score: score_result.score,
            risk_level: score_result.risk_level,
            summary,
            tracker_count: tracker_findings.len() as i32,
            cookie_count: cookie_analysis.summary.total as i32,
            external_domain_count: external_domains.len() as i32,
            pages_crawled: record.pages.len() as i32,
            is_https: record.is_https,
            has_csp,
            canvas_fingerprint: fingerprints.canvas,
            webgl_fingerprint: fingerprints.webgl,
            font_fingerprint: fingerprints.font,
            keylogger: fingerprints.keylogger,
            raw_data,
            created_at: chrono::Utc::now(),
        }
    }
}

fn collect_sources(pages: &[PageArtifact]) -> Vec<String> {
    let mut sources = Vec::new();
    for page in pages {
        sources.extend(page.scripts.external_urls.iter().cloned());
        sources.extend(page.requests.iter().map(|r| r.url.clone()));
    }
    sources
}

fn collect_external_script_urls(pages: &[PageArtifact]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut urls = Vec::new();
    for page in pages {
        for url in &page.scripts.external_urls {
            if seen.insert(url.clone()) {
                urls.push(url.clone());
            }
        }
    }
    urls
}

fn collect_external_domains(pages: &[PageArtifact], target_host: &str) -> Vec<String> {
    let mut domains = HashSet::new();
    for page in pages {
        for url in page.scripts.external_urls.iter().chain(page.requests.iter().map(|r| &r.url)) {
            if let Some(host) = url::Url::parse(url).ok().and_then(|u| u.host_str().map(str::to_string)) {
                let host = host.strip_prefix("www.").unwrap_or(&host).to_string();
                if host != target_host {
                    domains.insert(host);
                }
            }
        }
    }
    domains.into_iter().collect()
}

fn build_summary(
    trackers: &[trackers::TrackerFinding],
    cookies: &cookies::CookieSummary,
    external_domain_count: usize,
    score: i32,
) -> String {
    format!(
        "Found {} tracker(s), {} cookie(s), and connections to {} external domain(s). Privacy score: {}/100.",
        trackers.len(),
        cookies.total,
        external_domain_count,
        score
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use threat_feed::StaticThreatFeed;

    #[tokio::test]
    async fn analyzes_empty_crawl_record() {
        let feed = StaticThreatFeed::new();
        let pipeline = AnalysisPipeline::new(&feed);
        let record = CrawlRecord {
            target_url: "https://example.com".to_string(),
            is_https: true,
            pages: vec![PageArtifact { is_homepage: true, ..Default::default() }],
            cookies: vec![],
        };
        let result = pipeline.analyze(Uuid::new_v4(), &record).await;
        assert_eq!(result.tracker_count, 0);
        assert_eq!(result.cookie_count, 0);
        assert!(result.score <= 100 && result.score >= 0);
    }
}
