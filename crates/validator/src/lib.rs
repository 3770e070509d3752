//! Admission-time gate for scan targets: URL Validator, DNS Resolver, SSRF Guard
//! (components A/B/C).

mod dns;
mod ssrf;
mod url_validator;

pub use dns::{resolve, ResolvedAddress};
pub use ssrf::check_ssrf;
pub use url_validator::canonicalize;

use pa_core::AdmissionError;

/// Run the full admission chain: canonicalize, resolve, then SSRF-check the resolved
/// address. Returns the canonical URL string on success.
pub async fn admit(raw: &str) -> Result<String, AdmissionError> {
    let canonical = url_validator::canonicalize(raw)?;
    let parsed = url::Url::parse(&canonical).map_err(|_| AdmissionError::UrlMalformed)?;
    let host = parsed
        .host_str()
        .ok_or(AdmissionError::UrlInvalidHostname)?
        .to_string();

    let resolved = dns::resolve(&host).await?;
    ssrf::check_ssrf(&host, resolved.addr)?;

    Ok(canonical)
}
