//! Outbound target safety.
//!
//! # Responsibilities
//! - Restrict targets to http/https
//! - Reject loopback, private, link-local and other non-public hosts
//! - Re-check every redirect hop
//! - Drop non-public addresses at DNS resolution time
//!
//! # Design Decisions
//! - Literal IP hosts and `localhost` names are rejected while resolving
//!   the target, before any I/O
//! - Hostnames are checked again after DNS so a public name pointing at a
//!   private address is still refused

use std::net::{IpAddr, SocketAddr};

use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use url::{Host, Url};

/// A target that the policy refuses.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyViolation {
    #[error("scheme '{0}' is not allowed, only http and https")]
    Scheme(String),
    #[error("URL has no host")]
    MissingHost,
    #[error("host '{0}' is not publicly routable")]
    NonPublicHost(String),
}

/// Raised by [`PublicResolver`] when a name resolves only to blocked addresses.
#[derive(Debug, thiserror::Error)]
#[error("host '{host}' resolves only to non-public addresses")]
pub struct BlockedAddress {
    pub host: String,
}

/// Which outbound targets the proxy may contact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetPolicy {
    allow_private: bool,
}

impl TargetPolicy {
    pub fn new(allow_private: bool) -> Self {
        Self { allow_private }
    }

    /// Public internet only.
    pub fn strict() -> Self {
        Self::new(false)
    }

    pub fn allows_private(&self) -> bool {
        self.allow_private
    }

    /// Check scheme and host of an absolute URL.
    pub fn check(&self, url: &Url) -> Result<(), PolicyViolation> {
        if !matches!(url.scheme(), "http" | "https") {
            return Err(PolicyViolation::Scheme(url.scheme().to_string()));
        }
        let host = url.host().ok_or(PolicyViolation::MissingHost)?;
        if self.allow_private {
            return Ok(());
        }
        let blocked = match &host {
            Host::Domain(name) => is_local_name(name),
            Host::Ipv4(ip) => is_private_ip(&IpAddr::V4(*ip)),
            Host::Ipv6(ip) => is_private_ip(&IpAddr::V6(*ip)),
        };
        if blocked {
            Err(PolicyViolation::NonPublicHost(host.to_string()))
        } else {
            Ok(())
        }
    }
}

impl Default for TargetPolicy {
    fn default() -> Self {
        Self::strict()
    }
}

fn is_local_name(name: &str) -> bool {
    let name = name.trim_end_matches('.').to_ascii_lowercase();
    name == "localhost" || name.ends_with(".localhost")
}

/// Check if an IP address is private/reserved and must not be contacted.
pub fn is_private_ip(addr: &IpAddr) -> bool {
    match addr {
        IpAddr::V4(ip) => {
            let octets = ip.octets();
            ip.is_private()
                || ip.is_loopback()
                || ip.is_link_local()
                || ip.is_broadcast()
                || ip.is_unspecified()
                || ip.is_multicast()
                || octets[0] == 0
                // CGNAT 100.64.0.0/10
                || (octets[0] == 100 && (octets[1] & 0xC0) == 64)
        }
        IpAddr::V6(ip) => {
            if let Some(mapped) = ip.to_ipv4_mapped() {
                return is_private_ip(&IpAddr::V4(mapped));
            }
            let first = ip.segments()[0];
            ip.is_loopback()
                || ip.is_unspecified()
                || ip.is_multicast()
                // ULA fc00::/7
                || (first & 0xfe00) == 0xfc00
                // link-local fe80::/10
                || (first & 0xffc0) == 0xfe80
        }
    }
}

/// DNS resolver that only hands public addresses to the connector.
#[derive(Debug, Clone, Copy, Default)]
pub struct PublicResolver;

impl Resolve for PublicResolver {
    fn resolve(&self, name: Name) -> Resolving {
        Box::pin(resolve_public(name.as_str().to_string()))
    }
}

async fn resolve_public(host: String) -> Result<Addrs, Box<dyn std::error::Error + Send + Sync>> {
    let resolved: Vec<SocketAddr> = tokio::net::lookup_host((host.as_str(), 0))
        .await?
        .collect();
    let public: Vec<SocketAddr> = resolved
        .into_iter()
        .filter(|addr| !is_private_ip(&addr.ip()))
        .collect();
    if public.is_empty() {
        tracing::warn!(host = %host, "Refusing to connect: no public addresses");
        return Err(Box::new(BlockedAddress { host }));
    }
    Ok(Box::new(public.into_iter()))
}
