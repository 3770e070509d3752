use std::collections::HashMap;

use serde::Serialize;

struct OwnerEntry {
    domain: &'static str,
    parent: &'static str,
    brand: &'static str,
    color: &'static str,
    category: &'static str,
}

/// Domain -> {parent, brand, color, category} table used for the ownership graph
/// (spec.md §4.I "Ownership graph"). Matched exactly first, then by
/// progressively-stripped subdomain suffix (`a.b.example.com` -> `b.example.com` ->
/// `example.com`). `color` is a consistent hex per parent company, used to keep the
/// same company rendered the same way across nodes/edges.
static OWNERS: &[OwnerEntry] = &[
    OwnerEntry { domain: "google-analytics.com", parent: "Google", brand: "Google Analytics", color: "#4285F4", category: "analytics" },
    OwnerEntry { domain: "googletagmanager.com", parent: "Google", brand: "Google Tag Manager", color: "#4285F4", category: "analytics" },
    OwnerEntry { domain: "doubleclick.net", parent: "Google", brand: "Google Ads (DoubleClick)", color: "#4285F4", category: "advertising" },
    OwnerEntry { domain: "googlesyndication.com", parent: "Google", brand: "Google AdSense", color: "#4285F4", category: "advertising" },
    OwnerEntry { domain: "googleapis.com", parent: "Google", brand: "Google Cloud APIs", color: "#4285F4", category: "infrastructure" },
    OwnerEntry { domain: "facebook.com", parent: "Meta", brand: "Facebook", color: "#0866FF", category: "advertising" },
    OwnerEntry { domain: "facebook.net", parent: "Meta", brand: "Meta Pixel", color: "#0866FF", category: "advertising" },
    OwnerEntry { domain: "instagram.com", parent: "Meta", brand: "Instagram", color: "#0866FF", category: "social" },
    OwnerEntry { domain: "amazon-adsystem.com", parent: "Amazon", brand: "Amazon Ads", color: "#FF9900", category: "advertising" },
    OwnerEntry { domain: "clarity.ms", parent: "Microsoft", brand: "Microsoft Clarity", color: "#00A4EF", category: "analytics" },
    OwnerEntry { domain: "bing.com", parent: "Microsoft", brand: "Microsoft Advertising", color: "#00A4EF", category: "advertising" },
    OwnerEntry { domain: "hotjar.com", parent: "Hotjar", brand: "Hotjar", color: "#FD3A5C", category: "analytics" },
    OwnerEntry { domain: "tiktok.com", parent: "ByteDance", brand: "TikTok", color: "#000000", category: "advertising" },
    OwnerEntry { domain: "licdn.com", parent: "LinkedIn", brand: "LinkedIn Ads", color: "#0A66C2", category: "advertising" },
    OwnerEntry { domain: "linkedin.com", parent: "LinkedIn", brand: "LinkedIn", color: "#0A66C2", category: "social" },
    OwnerEntry { domain: "ads-twitter.com", parent: "X Corp", brand: "X Ads", color: "#000000", category: "advertising" },
    OwnerEntry { domain: "twitter.com", parent: "X Corp", brand: "X (Twitter)", color: "#000000", category: "social" },
    OwnerEntry { domain: "segment.com", parent: "Twilio", brand: "Segment", color: "#F22F46", category: "analytics" },
    OwnerEntry { domain: "mxpnl.com", parent: "Mixpanel", brand: "Mixpanel", color: "#7856FF", category: "analytics" },
    OwnerEntry { domain: "criteo.com", parent: "Criteo", brand: "Criteo", color: "#FF6900", category: "advertising" },
    OwnerEntry { domain: "criteo.net", parent: "Criteo", brand: "Criteo", color: "#FF6900", category: "advertising" },
    OwnerEntry { domain: "nr-data.net", parent: "New Relic", brand: "New Relic", color: "#008C99", category: "infrastructure" },
    OwnerEntry { domain: "sentry.io", parent: "Sentry", brand: "Sentry", color: "#362D59", category: "infrastructure" },
    OwnerEntry { domain: "intercom.io", parent: "Intercom", brand: "Intercom", color: "#1F8DED", category: "support" },
];

#[derive(Debug, Clone, Serialize)]
pub struct OwnershipNode {
    pub site: String,
    pub companies: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OwnershipEdge {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompanyShare {
    pub company: String,
    pub brand: String,
    pub color: String,
    pub domain_count: usize,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct OwnershipStats {
    pub total_companies: usize,
    pub identified_domains: usize,
    pub unknown_domains: usize,
    pub corporate_concentration: u32,
    pub top_companies: Vec<CompanyShare>,
    pub category_breakdown: HashMap<String, usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OwnershipGraph {
    pub nodes: Vec<OwnershipNode>,
    pub edges: Vec<OwnershipEdge>,
    pub stats: OwnershipStats,
}

fn lookup(domain: &str) -> Option<(&'static str, &'static str, &'static str, &'static str)> {
    let domain = domain.strip_prefix("www.").unwrap_or(domain);
    if let Some(owner) = OWNERS.iter().find(|o| o.domain == domain) {
        return Some((owner.parent, owner.brand, owner.color, owner.category));
    }
    let labels: Vec<&str> = domain.split('.').collect();
    for start in 1..labels.len().saturating_sub(1) {
        let suffix = labels[start..].join(".");
        if let Some(owner) = OWNERS.iter().find(|o| o.domain == suffix) {
            return Some((owner.parent, owner.brand, owner.color, owner.category));
        }
    }
    None
}

/// Build the ownership graph for a site and its observed third-party domains
/// (spec.md §4.I "Ownership graph").
pub fn build(site_host: &str, third_party_domains: &[String]) -> OwnershipGraph {
    let mut domains: Vec<&String> = third_party_domains.iter().collect();
    domains.sort();
    domains.dedup();

    let mut by_parent: HashMap<&'static str, Vec<String>> = HashMap::new();
    let mut parent_meta: HashMap<&'static str, (&'static str, &'static str)> = HashMap::new();
    let mut category_breakdown: HashMap<String, usize> = HashMap::new();
    let mut identified = 0usize;
    let mut unknown = 0usize;
    let mut edges = Vec::new();

    for domain in &domains {
        match lookup(domain) {
            Some((parent, brand, color, category)) => {
                identified += 1;
                by_parent.entry(parent).or_default().push((*domain).clone());
                parent_meta.entry(parent).or_insert((brand, color));
                *category_breakdown.entry(category.to_string()).or_insert(0) += 1;
                edges.push(OwnershipEdge { from: site_host.to_string(), to: parent.to_string() });
            }
            None => {
                unknown += 1;
            }
        }
    }

    let node = OwnershipNode {
        site: site_host.to_string(),
        companies: by_parent.keys().map(|p| p.to_string()).collect(),
    };

    let mut shares: Vec<CompanyShare> = by_parent
        .iter()
        .map(|(parent, domains)| {
            let (brand, color) = parent_meta.get(parent).copied().unwrap_or((*parent, "#999999"));
            CompanyShare {
                company: parent.to_string(),
                brand: brand.to_string(),
                color: color.to_string(),
                domain_count: domains.len(),
            }
        })
        .collect();
    shares.sort_by(|a, b| b.domain_count.cmp(&a.domain_count).then_with(|| a.company.cmp(&b.company)));

    let top3_count: usize = shares.iter().take(3).map(|s| s.domain_count).sum();
    let corporate_concentration = if identified > 0 {
        ((top3_count as f64 / identified as f64) * 100.0).round() as u32
    } else {
        0
    };
    shares.truncate(3);

    let stats = OwnershipStats {
        total_companies: by_parent.len(),
        identified_domains: identified,
        unknown_domains: unknown,
        corporate_concentration,
        top_companies: shares,
        category_breakdown,
    };

    OwnershipGraph { nodes: vec![node], edges, stats }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_domains_under_parent_company() {
        let domains = vec!["google-analytics.com".to_string(), "doubleclick.net".to_string()];
        let graph = build("example.com", &domains);
        assert_eq!(graph.stats.total_companies, 1);
        assert_eq!(graph.stats.identified_domains, 2);
    }

    #[test]
    fn subdomain_suffix_matches() {
        let domains = vec!["stats.google-analytics.com".to_string()];
        let graph = build("example.com", &domains);
        assert_eq!(graph.stats.identified_domains, 1);
    }

    #[test]
    fn unknown_domain_counted_separately() {
        let domains = vec!["totally-unknown-vendor.example".to_string()];
        let graph = build("example.com", &domains);
        assert_eq!(graph.stats.unknown_domains, 1);
        assert_eq!(graph.stats.identified_domains, 0);
    }

    #[test]
    fn concentration_is_100_with_single_company() {
        let domains = vec!["google-analytics.com".to_string(), "doubleclick.net".to_string()];
        let graph = build("example.com", &domains);
        assert_eq!(graph.stats.corporate_concentration, 100);
    }
}
