use std::net::{IpAddr, Ipv4Addr};

use pa_core::AdmissionError;

const RESERVED_HOSTNAMES: &[&str] = &[
    "localhost",
    "0.0.0.0",
    "metadata.google.internal",
    "169.254.169.254",
];

const PRIVATE_ZONE_SUFFIXES: &[&str] = &[".local", ".internal", ".corp", ".lan", ".intranet"];

/// Reject reserved hostnames, private-zone suffixes, and private/link-local/CGNAT/
/// metadata addresses (spec.md §4.C). All address checks apply to the *resolved*
/// address, not the original input, so DNS rebinding cannot bypass this by resolving a
/// public-looking hostname to an internal address after admission.
pub fn check_ssrf(hostname: &str, addr: IpAddr) -> Result<(), AdmissionError> {
    let lower = hostname.to_ascii_lowercase();

    if RESERVED_HOSTNAMES.contains(&lower.as_str()) {
        return Err(AdmissionError::SsrfBlockedHostname);
    }

    if PRIVATE_ZONE_SUFFIXES.iter().any(|suffix| lower.ends_with(suffix)) {
        return Err(AdmissionError::SsrfBlockedPattern);
    }

    if is_private_address(addr) {
        return Err(AdmissionError::SsrfPrivateIp);
    }

    Ok(())
}

fn is_private_address(addr: IpAddr) -> bool {
    match addr {
        IpAddr::V4(v4) => is_private_v4(v4),
        IpAddr::V6(v6) => {
            if v6.is_loopback() {
                return true;
            }
            let segments = v6.segments();
            // fc00::/7
            if segments[0] & 0xfe00 == 0xfc00 {
                return true;
            }
            // fe80::/10
            if segments[0] & 0xffc0 == 0xfe80 {
                return true;
            }
            false
        }
    }
}

fn is_private_v4(v4: Ipv4Addr) -> bool {
    let octets = v4.octets();
    octets[0] == 127
        || octets[0] == 10
        || (octets[0] == 192 && octets[1] == 168)
        || (octets[0] == 172 && (16..=31).contains(&octets[1]))
        || (octets[0] == 169 && octets[1] == 254)
        || (octets[0] == 100 && (64..=127).contains(&octets[1])) // CGNAT 100.64/10
        || octets[0] == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv6Addr;

    #[test]
    fn loopback_v4_blocked() {
        let err = check_ssrf("example.com", IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))).unwrap_err();
        assert!(matches!(err, AdmissionError::SsrfPrivateIp));
    }

    #[test]
    fn cgnat_blocked() {
        let err = check_ssrf("example.com", IpAddr::V4(Ipv4Addr::new(100, 64, 0, 5))).unwrap_err();
        assert!(matches!(err, AdmissionError::SsrfPrivateIp));
    }

    #[test]
    fn reserved_hostname_blocked_even_with_public_ip() {
        let err = check_ssrf(
            "metadata.google.internal",
            IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8)),
        )
        .unwrap_err();
        assert!(matches!(err, AdmissionError::SsrfBlockedHostname));
    }

    #[test]
    fn private_zone_suffix_blocked() {
        let err =
            check_ssrf("printer.lan", IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8))).unwrap_err();
        assert!(matches!(err, AdmissionError::SsrfBlockedPattern));
    }

    #[test]
    fn loopback_v6_blocked() {
        let err = check_ssrf("example.com", IpAddr::V6(Ipv6Addr::LOCALHOST)).unwrap_err();
        assert!(matches!(err, AdmissionError::SsrfPrivateIp));
    }

    #[test]
    fn public_address_allowed() {
        assert!(check_ssrf("example.com", IpAddr::V4(Ipv4Addr::new(93, 184, 216, 34))).is_ok());
    }
}
