//! Configuration loading from disk and environment.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::schema::ProxyConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
///
/// Environment overrides are applied between parsing and validation.
pub fn load_config(path: &Path) -> Result<ProxyConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config = parse_config(&content)?;
    finalize(config)
}

/// Parse a TOML document without touching the environment or validating.
pub fn parse_config(content: &str) -> Result<ProxyConfig, ConfigError> {
    Ok(toml::from_str(content)?)
}

/// Apply environment overrides to `config`, then validate it.
pub fn finalize(mut config: ProxyConfig) -> Result<ProxyConfig, ConfigError> {
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Overlay well-known environment variables on top of file values.
///
/// `PORT` keeps the configured host and replaces the port; `HOST` does the
/// reverse.
pub fn apply_env_overrides<F>(config: &mut ProxyConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let (mut host, mut port) = split_bind(&config.listener.bind_address);

    if let Some(value) = lookup("HOST").filter(|v| !v.is_empty()) {
        host = value;
    }
    if let Some(value) = lookup("PORT").filter(|v| !v.is_empty()) {
        port = value;
    }
    config.listener.bind_address = format!("{}:{}", host, port);

    if let Some(value) = lookup("PROXY_BASE_PATH").filter(|v| !v.is_empty()) {
        config.proxy.base_path = value;
    }
    if let Some(value) = lookup("LOG_LEVEL").filter(|v| !v.is_empty()) {
        config.observability.log_level = value;
    }
    if let Some(value) = lookup("APP_ENV")
        .or_else(|| lookup("NODE_ENV"))
        .filter(|v| !v.is_empty())
    {
        config.service.environment = value;
    }
}

fn split_bind(bind: &str) -> (String, String) {
    match bind.rsplit_once(':') {
        Some((host, port)) => (host.to_string(), port.to_string()),
        None => (bind.to_string(), "3000".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn parses_partial_file_with_defaults() {
        let config = parse_config(
            r#"
            [proxy]
            base_path = "/relay"

            [upstream]
            timeout_secs = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.proxy.base_path, "/relay");
        assert_eq!(config.proxy.query_param, "url");
        assert_eq!(config.upstream.timeout_secs, 5);
        assert_eq!(config.upstream.max_redirects, 5);
    }

    #[test]
    fn port_override_keeps_host() {
        let mut config = ProxyConfig::default();
        config.listener.bind_address = "127.0.0.1:3000".into();
        apply_env_overrides(&mut config, env(&[("PORT", "8088")]));
        assert_eq!(config.listener.bind_address, "127.0.0.1:8088");
    }

    #[test]
    fn environment_prefers_app_env() {
        let mut config = ProxyConfig::default();
        apply_env_overrides(
            &mut config,
            env(&[("NODE_ENV", "staging"), ("APP_ENV", "production")]),
        );
        assert_eq!(config.service.environment, "production");

        let mut config = ProxyConfig::default();
        apply_env_overrides(&mut config, env(&[("NODE_ENV", "staging")]));
        assert_eq!(config.service.environment, "staging");
    }

    #[test]
    fn rejects_unparseable_toml() {
        assert!(matches!(
            parse_config("[proxy\nbase_path = 1"),
            Err(ConfigError::Parse(_))
        ));
    }
}
