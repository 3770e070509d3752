use std::collections::HashSet;

/// Cross-check a script body's SHA-256 against a known-bad corpus.
///
/// No feed format or delivery mechanism is settled yet, so the lookup is kept
/// pluggable behind a trait rather than baked into a single source.
pub trait ThreatFeed: Send + Sync {
    fn is_known_bad(&self, sha256_hex: &str) -> bool;
}

/// Empty by default until a real feed is wired in via [`StaticThreatFeed::with_hashes`].
#[derive(Default)]
pub struct StaticThreatFeed {
    hashes: HashSet<String>,
}

impl StaticThreatFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hashes(hashes: HashSet<String>) -> Self {
        Self { hashes }
    }
}

impl ThreatFeed for StaticThreatFeed {
    fn is_known_bad(&self, sha256_hex: &str) -> bool {
        self.hashes.contains(sha256_hex)
    }
}
