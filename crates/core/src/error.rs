use thiserror::Error;

/// Everything that can stop a submission before a Job ever reaches the queue.
///
/// Variants map 1:1 onto the distinct error codes in spec.md §4.A-§4.C/§7; the `code()`
/// method reproduces those exact wire codes, `client_message()` the human-readable text
/// from the submission-endpoint error-mapping table.
#[derive(Error, Debug, Clone)]
pub enum AdmissionError {
    #[error("url missing")]
    UrlMissing,
    #[error("url empty")]
    UrlEmpty,
    #[error("url malformed")]
    UrlMalformed,
    #[error("invalid protocol: {0}")]
    UrlInvalidProtocol(String),
    #[error("invalid hostname")]
    UrlInvalidHostname,
    #[error("hostname has no tld")]
    UrlNoTld,
    #[error("raw ip literals are not supported")]
    UrlRawIp,
    #[error("dns resolution failed: {0}")]
    DnsFailed(String),
    #[error("dns resolution timed out")]
    DnsTimeout,
    #[error("blocked reserved hostname")]
    SsrfBlockedHostname,
    #[error("blocked private-zone hostname pattern")]
    SsrfBlockedPattern,
    #[error("blocked private/reserved address")]
    SsrfPrivateIp,
}

impl AdmissionError {
    /// The wire code surfaced to clients, e.g. `"URL_NO_TLD"`.
    pub fn code(&self) -> &'static str {
        match self {
            AdmissionError::UrlMissing => "URL_MISSING",
            AdmissionError::UrlEmpty => "URL_EMPTY",
            AdmissionError::UrlMalformed => "URL_MALFORMED",
            AdmissionError::UrlInvalidProtocol(_) => "URL_INVALID_PROTOCOL",
            AdmissionError::UrlInvalidHostname => "URL_INVALID_HOSTNAME",
            AdmissionError::UrlNoTld => "URL_NO_TLD",
            AdmissionError::UrlRawIp => "URL_RAW_IP",
            AdmissionError::DnsFailed(_) => "DNS_FAILED",
            AdmissionError::DnsTimeout => "DNS_TIMEOUT",
            AdmissionError::SsrfBlockedHostname => "SSRF_BLOCKED_HOSTNAME",
            AdmissionError::SsrfBlockedPattern => "SSRF_BLOCKED_PATTERN",
            AdmissionError::SsrfPrivateIp => "SSRF_PRIVATE_IP",
        }
    }

    /// Human-readable message per the submission-endpoint error-mapping table (spec.md §6).
    pub fn client_message(&self) -> String {
        match self {
            AdmissionError::UrlNoTld => "That doesn't look like a real domain".to_string(),
            AdmissionError::UrlMalformed
            | AdmissionError::UrlInvalidProtocol(_)
            | AdmissionError::UrlInvalidHostname
            | AdmissionError::UrlMissing
            | AdmissionError::UrlEmpty => "That doesn't look like a valid URL".to_string(),
            AdmissionError::UrlRawIp => {
                "Scanning raw IP addresses directly is not supported".to_string()
            }
            AdmissionError::DnsFailed(_) | AdmissionError::DnsTimeout => {
                "We couldn't resolve that domain".to_string()
            }
            AdmissionError::SsrfBlockedHostname
            | AdmissionError::SsrfBlockedPattern
            | AdmissionError::SsrfPrivateIp => {
                "Scanning private or internal network addresses is not permitted".to_string()
            }
        }
    }

    /// Whether this rejection is a policy/validation error (400) as opposed to a 5xx.
    pub fn is_client_error(&self) -> bool {
        true
    }

    /// Whether this rejection came from the SSRF guard specifically, as opposed to
    /// plain URL/DNS validation, so callers can track the two separately.
    pub fn is_ssrf_block(&self) -> bool {
        matches!(
            self,
            AdmissionError::SsrfBlockedHostname
                | AdmissionError::SsrfBlockedPattern
                | AdmissionError::SsrfPrivateIp
        )
    }
}

/// Runtime errors raised while the Crawl Engine or Analysis Pipeline run inside a worker.
#[derive(Error, Debug, Clone)]
pub enum EngineError {
    #[error("UNREACHABLE:{signals}:{url}")]
    Unreachable { signals: String, url: String },
    #[error("driver error: {0}")]
    Driver(String),
    #[error("analysis error: {0}")]
    Analysis(String),
}

impl EngineError {
    /// Truncate to the 1000-char bound the Job.error_message column enforces (spec.md §3).
    pub fn truncated_message(&self) -> String {
        let msg = self.to_string();
        if msg.len() > 1000 {
            msg.chars().take(1000).collect()
        } else {
            msg
        }
    }
}
