//! Internal-endpoint detection for URLs the server fetches on a caller's behalf.

use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::LazyLock;

use regex::Regex;
use url::{Host, Url};

/// Host names that resolve to the local machine or cloud metadata services.
static BLOCKED_DOMAINS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"^localhost$",
        r"\.localhost$",
        r"^metadata\.",
        r"\.internal$",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

/// Whether `url` points at loopback, private, link-local or metadata hosts.
///
/// Looks only at the parsed host, so userinfo, numeric IPv4 spellings and
/// IPv4-mapped IPv6 addresses are all judged by the address they denote.
pub fn is_internal_host(url: &Url) -> bool {
    match url.host() {
        Some(Host::Ipv4(ip)) => is_internal_ipv4(ip),
        Some(Host::Ipv6(ip)) => is_internal_ipv6(ip),
        Some(Host::Domain(domain)) => {
            let domain = domain.trim_end_matches('.').to_lowercase();
            BLOCKED_DOMAINS.iter().any(|p| p.is_match(&domain))
        }
        None => true,
    }
}

fn is_internal_ipv4(ip: Ipv4Addr) -> bool {
    let [a, b, ..] = ip.octets();
    ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_broadcast()
        // 0.0.0.0/8 and carrier-grade NAT 100.64.0.0/10
        || a == 0
        || (a == 100 && (b & 0xc0) == 64)
}

fn is_internal_ipv6(ip: Ipv6Addr) -> bool {
    if let Some(v4) = ip.to_ipv4_mapped() {
        return is_internal_ipv4(v4);
    }
    let first = ip.segments()[0];
    ip.is_loopback()
        || ip.is_unspecified()
        // fc00::/7 unique local, fe80::/10 link local
        || (first & 0xfe00) == 0xfc00
        || (first & 0xffc0) == 0xfe80
}
