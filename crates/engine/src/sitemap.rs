use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;

const SITEMAP_BUDGET: Duration = Duration::from_secs(5);

static LOC_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<loc>\s*([^<\s]+)\s*</loc>").unwrap());

/// Fetch `/sitemap.xml` with a 5s budget and extract `<loc>` URLs (spec.md §4.H step
/// 6). Absence or malformed XML is not fatal to the crawl; an empty list is returned.
pub async fn fetch_sitemap(base_url: &str) -> Vec<String> {
    let Ok(mut url) = url::Url::parse(base_url) else { return Vec::new() };
    url.set_path("/sitemap.xml");
    url.set_query(None);
    url.set_fragment(None);

    let client = match reqwest::Client::builder().timeout(SITEMAP_BUDGET).build() {
        Ok(c) => c,
        Err(_) => return Vec::new(),
    };

    let body = match tokio::time::timeout(SITEMAP_BUDGET, client.get(url).send()).await {
        Ok(Ok(resp)) if resp.status().is_success() => resp.text().await.unwrap_or_default(),
        _ => return Vec::new(),
    };

    LOC_RE
        .captures_iter(&body)
        .map(|cap| cap[1].to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_loc_entries() {
        let xml = "<urlset><url><loc>https://example.com/a</loc></url><url><loc>https://example.com/b</loc></url></urlset>";
        let locs: Vec<String> = LOC_RE.captures_iter(xml).map(|c| c[1].to_string()).collect();
        assert_eq!(locs, vec!["https://example.com/a", "https://example.com/b"]);
    }
}
