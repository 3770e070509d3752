//! Crawl Engine (component H): drives a headless browser through a target's
//! homepage and a handful of ranked sub-pages, collecting the artifacts the Analysis
//! Pipeline needs (spec.md §4.H).

mod browser;
mod instrumentation;
mod navigation;
mod ranking;
mod sitemap;

use pa_core::{CrawlRecord, EngineError};
use tracing::{info, warn};
use url::Url;

use browser::EngineBrowser;

const MAX_SUBPAGES: usize = 3;

pub struct CrawlEngine;

impl CrawlEngine {
    pub fn new() -> Self {
        Self
    }

    /// Run the full per-target lifecycle (spec.md §4.H steps 1-9). A homepage
    /// navigation failure is fatal (`EngineError::Unreachable`); sub-page failures are
    /// logged and skipped.
    pub async fn crawl(&self, target_url: &str) -> Result<CrawlRecord, EngineError> {
        let parsed = Url::parse(target_url).map_err(|e| EngineError::Driver(e.to_string()))?;
        let host = parsed.host_str().unwrap_or_default().to_string();
        let is_https = parsed.scheme() == "https";
        let target_owned = target_url.to_string();

        // headless_chrome's Tab API is blocking; run the whole drive on a blocking
        // thread so the async worker doesn't stall the runtime (spec.md §5: within a
        // job, browser-driven operations are inherently sequential).
        let sitemap_urls = sitemap::fetch_sitemap(target_url).await;

        // headless_chrome's Tab API is blocking; the whole same-context crawl (homepage
        // plus ranked sub-pages) runs on one blocking thread so it shares one browser
        // profile and cookie jar (spec.md §4.H step 9 "aggregate cookies from the
        // context").
        tokio::task::spawn_blocking(move || crawl_blocking(&target_owned, &host, &sitemap_urls))
            .await
            .map_err(|e| EngineError::Driver(e.to_string()))?
            .map(|(pages, cookies)| CrawlRecord {
                target_url: target_url.to_string(),
                is_https,
                pages,
                cookies,
            })
    }
}

impl Default for CrawlEngine {
    fn default() -> Self {
        Self::new()
    }
}

type CrawlPages = (Vec<pa_core::PageArtifact>, Vec<pa_core::CookieRecord>);

fn crawl_blocking(
    target_url: &str,
    host: &str,
    sitemap_urls: &[String],
) -> Result<CrawlPages, EngineError> {
    let engine_browser =
        EngineBrowser::launch().map_err(|e| EngineError::Driver(e.to_string()))?;
    let tab = engine_browser
        .new_tab()
        .map_err(|e| EngineError::Driver(e.to_string()))?;

    if let Err(e) = navigation::install_instrumentation(&tab) {
        warn!(url = target_url, error = %e, "instrumentation failed before settling");
        return Err(EngineError::Unreachable {
            signals: "driver_exception".to_string(),
            url: target_url.to_string(),
        });
    }

    let homepage = match navigation::drive_page(&tab, target_url, true) {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!(url = target_url, error = %e, "driver exception before settling");
            return Err(EngineError::Unreachable {
                signals: "driver_exception".to_string(),
                url: target_url.to_string(),
            });
        }
    };

    if homepage.failed {
        return Err(EngineError::Unreachable {
            signals: homepage.signals_fired.join(","),
            url: target_url.to_string(),
        });
    }

    info!(url = target_url, "homepage crawl complete");

    let candidates = ranking::select_pages(sitemap_urls, &homepage.artifact.internal_links, host);
    let mut pages = vec![homepage.artifact];

    for sub_url in candidates.into_iter().take(MAX_SUBPAGES) {
        let sub_tab = match engine_browser.new_tab() {
            Ok(t) => t,
            Err(e) => {
                warn!(url = %sub_url, error = %e, "failed to open tab for sub-page, skipping");
                continue;
            }
        };
        if let Err(e) = navigation::install_instrumentation(&sub_tab) {
            warn!(url = %sub_url, error = %e, "instrumentation failed, skipping sub-page");
            continue;
        }
        match navigation::drive_page(&sub_tab, &sub_url, false) {
            Ok(outcome) if !outcome.failed => pages.push(outcome.artifact),
            Ok(outcome) => {
                warn!(url = %sub_url, signals = ?outcome.signals_fired, "sub-page navigation failed, skipping");
            }
            Err(e) => {
                warn!(url = %sub_url, error = %e, "sub-page drive error, skipping");
            }
        }
    }

    let cookies = engine_browser
        .cookies(&tab)
        .map_err(|e| EngineError::Driver(e.to_string()))?;

    Ok((pages, cookies))
}
