use std::net::IpAddr;
use std::time::Duration;

use pa_core::AdmissionError;
use tokio::net::lookup_host;
use tokio::time::timeout;

const DNS_DEADLINE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy)]
pub struct ResolvedAddress {
    pub addr: IpAddr,
}

/// Resolve `host` to one address, bounded by a 5-second deadline (spec.md §4.B).
///
/// Accepts both address families; when the resolver yields more than one candidate the
/// first in resolver order is used deterministically. Invoked before any downstream
/// resource (browser context, HTTP client) is allocated.
pub async fn resolve(host: &str) -> Result<ResolvedAddress, AdmissionError> {
    let lookup = format!("{host}:0");
    let resolved = timeout(DNS_DEADLINE, lookup_host(lookup))
        .await
        .map_err(|_| AdmissionError::DnsTimeout)?
        .map_err(|e| AdmissionError::DnsFailed(e.kind().to_string()))?;

    let addr = resolved
        .into_iter()
        .next()
        .map(|sock| sock.ip())
        .ok_or_else(|| AdmissionError::DnsFailed("no addresses returned".to_string()))?;

    Ok(ResolvedAddress { addr })
}
