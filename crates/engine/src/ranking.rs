use url::Url;

const REJECTED_EXTENSIONS: &[&str] = &[
    ".png", ".jpg", ".jpeg", ".gif", ".webp", ".svg", ".ico", ".bmp",
    ".css",
    ".js", ".mjs",
    ".zip", ".tar", ".gz", ".rar", ".7z",
    ".woff", ".woff2", ".ttf", ".otf", ".eot",
];

/// Page-selection ranking (spec.md §4.H). From the union of sitemap URLs and internal
/// links: keep only same-host URLs, reject asset-looking paths, score by
/// `(-2 if has query else 0) + (-1 * non-empty path segments)`, take the top 3.
pub fn select_pages(sitemap_urls: &[String], internal_links: &[String], host: &str) -> Vec<String> {
    let mut candidates: Vec<String> = sitemap_urls.iter().chain(internal_links.iter()).cloned().collect();
    candidates.sort();
    candidates.dedup();

    let mut scored: Vec<(i32, String)> = candidates
        .into_iter()
        .filter_map(|raw| {
            let parsed = Url::parse(&raw).ok()?;
            if parsed.host_str()? != host {
                return None;
            }
            if is_asset_path(parsed.path()) {
                return None;
            }
            Some((score(&parsed), raw))
        })
        .collect();

    scored.sort_by(|a, b| b.0.cmp(&a.0));
    scored.into_iter().take(3).map(|(_, url)| url).collect()
}

fn is_asset_path(path: &str) -> bool {
    let lower = path.to_ascii_lowercase();
    REJECTED_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

fn score(url: &Url) -> i32 {
    let query_penalty = if url.query().is_some() { -2 } else { 0 };
    let segments = url
        .path_segments()
        .map(|segs| segs.filter(|s| !s.is_empty()).count())
        .unwrap_or(0);
    query_penalty - segments as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_cross_host_and_assets() {
        let sitemap = vec![
            "https://example.com/about".to_string(),
            "https://other.com/about".to_string(),
            "https://example.com/logo.png".to_string(),
        ];
        let selected = select_pages(&sitemap, &[], "example.com");
        assert_eq!(selected, vec!["https://example.com/about".to_string()]);
    }

    #[test]
    fn prefers_shallower_no_query_pages() {
        let urls = vec![
            "https://example.com/a/b/c".to_string(),
            "https://example.com/about".to_string(),
            "https://example.com/search?q=1".to_string(),
        ];
        let selected = select_pages(&urls, &[], "example.com");
        assert_eq!(selected[0], "https://example.com/about");
    }

    #[test]
    fn caps_at_three() {
        let urls: Vec<String> = (0..10).map(|i| format!("https://example.com/p{i}")).collect();
        let selected = select_pages(&urls, &[], "example.com");
        assert_eq!(selected.len(), 3);
    }
}
