use pa_core::AdmissionError;
use url::Url;

/// Canonicalize a raw submission string (spec.md §4.A).
///
/// Prepends `https://` when no scheme is present, then parses with the standard URL
/// parser, preserving path/query/fragment. Direct IPv4/IPv6 literal hosts are refused
/// (RAW_IP) independent of the SSRF outcome; hosts without a dot are refused (NO_TLD).
pub fn canonicalize(raw: &str) -> Result<String, AdmissionError> {
    if raw.is_empty() {
        return Err(AdmissionError::UrlEmpty);
    }
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AdmissionError::UrlEmpty);
    }

    let candidate = if has_scheme(trimmed) {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };

    let parsed = Url::parse(&candidate).map_err(|_| AdmissionError::UrlMalformed)?;

    match parsed.scheme() {
        "http" | "https" => {}
        other => return Err(AdmissionError::UrlInvalidProtocol(other.to_string())),
    }

    let host = parsed.host_str().ok_or(AdmissionError::UrlInvalidHostname)?;
    if host.is_empty() {
        return Err(AdmissionError::UrlInvalidHostname);
    }

    if host.parse::<std::net::IpAddr>().is_ok() {
        return Err(AdmissionError::UrlRawIp);
    }

    if !host.contains('.') {
        return Err(AdmissionError::UrlNoTld);
    }

    Ok(parsed.to_string())
}

fn has_scheme(s: &str) -> bool {
    match s.find("://") {
        Some(idx) => idx > 0 && s[..idx].chars().all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '.'),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_tld_rejected() {
        let err = canonicalize("ksgdsgfksdgfksdfg").unwrap_err();
        assert!(matches!(err, AdmissionError::UrlNoTld));
    }

    #[test]
    fn raw_ipv4_rejected() {
        let err = canonicalize("http://127.0.0.1/").unwrap_err();
        assert!(matches!(err, AdmissionError::UrlRawIp));
    }

    #[test]
    fn raw_ipv6_rejected() {
        let err = canonicalize("http://[::1]/").unwrap_err();
        assert!(matches!(err, AdmissionError::UrlRawIp));
    }

    #[test]
    fn bare_domain_gets_https_prefix() {
        let out = canonicalize("example.com").unwrap();
        assert!(out.starts_with("https://example.com"));
    }

    #[test]
    fn schemeless_dotted_host_accepted() {
        let out = canonicalize("example.invalid").unwrap();
        assert_eq!(out, "https://example.invalid/");
    }

    #[test]
    fn empty_rejected() {
        assert!(matches!(canonicalize(""), Err(AdmissionError::UrlEmpty)));
    }

    #[test]
    fn ftp_scheme_rejected() {
        let err = canonicalize("ftp://example.com/").unwrap_err();
        assert!(matches!(err, AdmissionError::UrlInvalidProtocol(_)));
    }

    #[test]
    fn preserves_path_query_fragment() {
        let out = canonicalize("https://example.com/a/b?x=1#frag").unwrap();
        assert_eq!(out, "https://example.com/a/b?x=1#frag");
    }
}
