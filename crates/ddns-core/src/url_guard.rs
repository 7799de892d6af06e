// # URL Guard
//
// Validates every network-bound URL (check-IP lookup, provider update) before
// any request is made.
//
// A URL passes when:
// - it parses as an absolute URL
// - its scheme is `https`
// - it has a hostname
// - the hostname is not `localhost` and, if it is an IP literal, the address
//   is not loopback, private, link-local, reserved, multicast or unspecified
// - the lowercased hostname is in the allowlist, when an allowlist is given
//
// Hostnames are not resolved. Validation is pure and has no side effects.

use std::collections::BTreeSet;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use thiserror::Error;
use url::{Host, Url};

/// Reason a URL was rejected
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UrlRejection {
    /// The URL could not be parsed
    #[error("URL is not well-formed: {0}")]
    Malformed(String),

    /// The scheme is not `https`
    #[error("URL must use https:// (got {0})")]
    SchemeRejected(String),

    /// The URL has no hostname
    #[error("URL must include a hostname")]
    HostMissing,

    /// The hostname is localhost or a non-public IP literal
    #[error("URL hostname {0} cannot be a loopback, private or reserved address")]
    HostRejected(String),

    /// The hostname is not in the configured allowlist
    #[error("URL host {0} is not in the allowlist")]
    HostNotAllowlisted(String),
}

/// Case-insensitive set of permitted hostnames
///
/// An empty allowlist permits every host that passes the other checks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostAllowlist {
    hosts: BTreeSet<String>,
}

impl HostAllowlist {
    /// Parse a comma-separated list, ignoring blanks
    pub fn parse(raw: Option<&str>) -> Self {
        let hosts = raw
            .unwrap_or_default()
            .split(',')
            .map(|host| host.trim().to_ascii_lowercase())
            .filter(|host| !host.is_empty())
            .collect();
        Self { hosts }
    }

    /// Build from an explicit list of hosts
    pub fn from_hosts<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            hosts: hosts
                .into_iter()
                .map(|host| host.as_ref().trim().to_ascii_lowercase())
                .filter(|host| !host.is_empty())
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    /// Exact, case-insensitive membership. No wildcard or subdomain matching.
    pub fn contains(&self, host: &str) -> bool {
        self.hosts.contains(&host.to_ascii_lowercase())
    }
}

/// Validate a URL and return it parsed
pub fn validate(raw: &str, allowed_hosts: &HostAllowlist) -> Result<Url, UrlRejection> {
    let url = match Url::parse(raw) {
        Ok(url) => url,
        Err(url::ParseError::EmptyHost) => {
            return Err(match raw.split_once(':') {
                Some((scheme, _)) if scheme.eq_ignore_ascii_case("https") => {
                    UrlRejection::HostMissing
                }
                Some((scheme, _)) => UrlRejection::SchemeRejected(scheme.to_ascii_lowercase()),
                None => UrlRejection::Malformed(url::ParseError::EmptyHost.to_string()),
            });
        }
        Err(err) => return Err(UrlRejection::Malformed(err.to_string())),
    };

    if url.scheme() != "https" {
        return Err(UrlRejection::SchemeRejected(url.scheme().to_string()));
    }

    let host_name = match url.host() {
        None => return Err(UrlRejection::HostMissing),
        Some(Host::Domain(domain)) => {
            let domain = domain.to_ascii_lowercase();
            if domain.is_empty() {
                return Err(UrlRejection::HostMissing);
            }
            if domain == "localhost" {
                return Err(UrlRejection::HostRejected(domain));
            }
            domain
        }
        Some(Host::Ipv4(addr)) => {
            reject_non_public(IpAddr::V4(addr))?;
            addr.to_string()
        }
        Some(Host::Ipv6(addr)) => {
            reject_non_public(IpAddr::V6(addr))?;
            addr.to_string()
        }
    };

    if !allowed_hosts.is_empty() && !allowed_hosts.contains(&host_name) {
        return Err(UrlRejection::HostNotAllowlisted(host_name));
    }

    Ok(url)
}

fn reject_non_public(addr: IpAddr) -> Result<(), UrlRejection> {
    if is_non_public(addr) {
        Err(UrlRejection::HostRejected(addr.to_string()))
    } else {
        Ok(())
    }
}

/// IPv4 blocks that are private, loopback, link-local, reserved, multicast,
/// unspecified or otherwise not globally routable.
const V4_BLOCKED: &[(Ipv4Addr, u8)] = &[
    (Ipv4Addr::new(0, 0, 0, 0), 8),
    (Ipv4Addr::new(10, 0, 0, 0), 8),
    (Ipv4Addr::new(100, 64, 0, 0), 10),
    (Ipv4Addr::new(127, 0, 0, 0), 8),
    (Ipv4Addr::new(169, 254, 0, 0), 16),
    (Ipv4Addr::new(172, 16, 0, 0), 12),
    (Ipv4Addr::new(192, 0, 0, 0), 24),
    (Ipv4Addr::new(192, 0, 2, 0), 24),
    (Ipv4Addr::new(192, 168, 0, 0), 16),
    (Ipv4Addr::new(198, 18, 0, 0), 15),
    (Ipv4Addr::new(198, 51, 100, 0), 24),
    (Ipv4Addr::new(203, 0, 113, 0), 24),
    (Ipv4Addr::new(224, 0, 0, 0), 4),
    (Ipv4Addr::new(240, 0, 0, 0), 4),
];

/// IPv6 counterparts, including the IETF reserved ranges outside 2000::/3.
const V6_BLOCKED: &[(Ipv6Addr, u8)] = &[
    // ::/8 covers ::, ::1 and IPv4-mapped/compatible space
    (Ipv6Addr::new(0, 0, 0, 0, 0, 0, 0, 0), 8),
    (Ipv6Addr::new(0x0100, 0, 0, 0, 0, 0, 0, 0), 8),
    (Ipv6Addr::new(0x0200, 0, 0, 0, 0, 0, 0, 0), 7),
    (Ipv6Addr::new(0x0400, 0, 0, 0, 0, 0, 0, 0), 6),
    (Ipv6Addr::new(0x0800, 0, 0, 0, 0, 0, 0, 0), 5),
    (Ipv6Addr::new(0x1000, 0, 0, 0, 0, 0, 0, 0), 4),
    (Ipv6Addr::new(0x2001, 0, 0, 0, 0, 0, 0, 0), 23),
    (Ipv6Addr::new(0x2001, 0x0db8, 0, 0, 0, 0, 0, 0), 32),
    (Ipv6Addr::new(0x4000, 0, 0, 0, 0, 0, 0, 0), 2),
    (Ipv6Addr::new(0x8000, 0, 0, 0, 0, 0, 0, 0), 2),
    (Ipv6Addr::new(0xc000, 0, 0, 0, 0, 0, 0, 0), 3),
    (Ipv6Addr::new(0xe000, 0, 0, 0, 0, 0, 0, 0), 4),
    (Ipv6Addr::new(0xf000, 0, 0, 0, 0, 0, 0, 0), 5),
    (Ipv6Addr::new(0xf800, 0, 0, 0, 0, 0, 0, 0), 6),
    (Ipv6Addr::new(0xfc00, 0, 0, 0, 0, 0, 0, 0), 7),
    (Ipv6Addr::new(0xfe00, 0, 0, 0, 0, 0, 0, 0), 9),
    (Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 0), 10),
    (Ipv6Addr::new(0xfec0, 0, 0, 0, 0, 0, 0, 0), 10),
    (Ipv6Addr::new(0xff00, 0, 0, 0, 0, 0, 0, 0), 8),
];

/// Whether an address falls in any non-public block
pub fn is_non_public(addr: IpAddr) -> bool {
    match addr {
        IpAddr::V4(v4) => V4_BLOCKED
            .iter()
            .any(|(net, prefix)| in_block(u32::from(v4).into(), u32::from(*net).into(), *prefix, 32)),
        IpAddr::V6(v6) => V6_BLOCKED
            .iter()
            .any(|(net, prefix)| in_block(u128::from(v6), u128::from(*net), *prefix, 128)),
    }
}

fn in_block(addr: u128, net: u128, prefix: u8, width: u32) -> bool {
    if prefix == 0 {
        return true;
    }
    let shift = width - u32::from(prefix);
    (addr >> shift) == (net >> shift)
}
