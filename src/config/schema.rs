//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address, TLS).
    pub listener: ListenerConfig,

    /// Route layout and proxy URL encoding.
    pub proxy: ProxyRouteConfig,

    /// Outbound fetch settings.
    pub upstream: UpstreamConfig,

    /// Body and request limits.
    pub limits: LimitsConfig,

    /// Target safety and response hardening.
    pub security: SecurityConfig,

    /// Response compression.
    pub compression: CompressionConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Service identity reported by `/` and the status endpoint.
    pub service: ServiceConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:3000").
    pub bind_address: String,

    /// Optional TLS configuration.
    pub tls: Option<TlsConfig>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_string(),
            tls: None,
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

/// Where the proxy routes live and how proxy URLs are spelled.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProxyRouteConfig {
    /// Base path all proxy routes hang off (e.g., "/proxy").
    pub base_path: String,

    /// Query parameter carrying the target in query mode.
    pub query_param: String,

    /// Absolute origin to prefix rewritten playlist references with.
    /// When unset, rewritten references are origin-relative.
    pub public_base_url: Option<String>,
}

impl Default for ProxyRouteConfig {
    fn default() -> Self {
        Self {
            base_path: "/proxy".to_string(),
            query_param: "url".to_string(),
            public_base_url: None,
        }
    }
}

/// Outbound fetch configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Connection establishment timeout in seconds.
    pub connect_timeout_secs: u64,

    /// Deadline for the upstream to produce response headers, in seconds.
    /// Buffered playlist bodies get the same budget again.
    pub timeout_secs: u64,

    /// Maximum redirects followed per fetch (0 disables following).
    pub max_redirects: usize,

    /// User-Agent sent when the caller supplied none.
    pub user_agent: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10,
            timeout_secs: 30,
            max_redirects: 5,
            user_agent: concat!("shinra-proxy/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Request and body limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum inbound request body forwarded upstream, in bytes.
    pub max_body_bytes: usize,

    /// Largest playlist buffered for rewriting, in bytes.
    pub max_playlist_bytes: usize,

    /// Whole-request timeout applied to inbound handling, in seconds.
    pub request_timeout_secs: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: 10 * 1024 * 1024,
            max_playlist_bytes: 8 * 1024 * 1024,
            request_timeout_secs: 60,
        }
    }
}

/// Security hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Add hardening response headers.
    pub security_headers: bool,

    /// Allow loopback, private and link-local targets. Only for local testing.
    pub allow_private_targets: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            security_headers: true,
            allow_private_targets: false,
        }
    }
}

/// Response compression configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CompressionConfig {
    /// Compress text responses (playlists, JSON).
    pub enabled: bool,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Service identity.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Display name.
    pub name: String,

    /// Deployment environment label (development, production, ...).
    pub environment: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "Shinra Proxy".to_string(),
            environment: "development".to_string(),
        }
    }
}
