//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, limits > 0)
//! - Check addresses and URLs parse
//! - Keep the proxy base path from shadowing `/`
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use url::Url;

use crate::config::schema::ProxyConfig;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field}: invalid socket address '{value}'")]
    InvalidAddress { field: &'static str, value: String },
    #[error("proxy.base_path must start with '/', must not end with '/' and must not be '/' (got '{0}')")]
    InvalidBasePath(String),
    #[error("proxy.query_param must not be empty")]
    EmptyQueryParam,
    #[error("proxy.public_base_url must be an absolute http(s) URL without query (got '{0}')")]
    InvalidPublicBaseUrl(String),
    #[error("{0} must be greater than zero")]
    NotPositive(&'static str),
}

/// Validate a fully-populated configuration.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "listener.bind_address",
            value: config.listener.bind_address.clone(),
        });
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidAddress {
            field: "observability.metrics_address",
            value: config.observability.metrics_address.clone(),
        });
    }

    let base = &config.proxy.base_path;
    if !base.starts_with('/') || base.ends_with('/') || base.contains(['?', '#']) {
        errors.push(ValidationError::InvalidBasePath(base.clone()));
    }

    if config.proxy.query_param.trim().is_empty() {
        errors.push(ValidationError::EmptyQueryParam);
    }

    if let Some(public) = &config.proxy.public_base_url {
        let ok = Url::parse(public)
            .map(|u| matches!(u.scheme(), "http" | "https") && u.query().is_none())
            .unwrap_or(false);
        if !ok {
            errors.push(ValidationError::InvalidPublicBaseUrl(public.clone()));
        }
    }

    let positives: [(&'static str, u64); 5] = [
        ("upstream.connect_timeout_secs", config.upstream.connect_timeout_secs),
        ("upstream.timeout_secs", config.upstream.timeout_secs),
        ("limits.request_timeout_secs", config.limits.request_timeout_secs),
        ("limits.max_body_bytes", config.limits.max_body_bytes as u64),
        ("limits.max_playlist_bytes", config.limits.max_playlist_bytes as u64),
    ];
    for (field, value) in positives {
        if value == 0 {
            errors.push(ValidationError::NotPositive(field));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
