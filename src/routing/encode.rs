//! Proxy URL construction, the inverse of target resolution.
//!
//! Every URL built here resolves back to the same target through
//! [`resolve`](crate::routing::target::resolve).

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS, NON_ALPHANUMERIC};
use url::Url;

use crate::config::ProxyRouteConfig;
use crate::routing::target::AddressingMode;

/// Query values: everything but unreserved characters and `:` `/`, so that
/// `+`, `&`, `=` and `%` survive form decoding.
const QUERY_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~')
    .remove(b':')
    .remove(b'/');

/// Path tokens: characters that would end the path or be altered by
/// percent-decoding.
const PATH_TOKEN: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Builds proxy-relative URLs for a given route layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyUrlEncoder {
    /// Optional public origin followed by the base path, no trailing slash.
    prefix: String,
    query_param: String,
}

impl ProxyUrlEncoder {
    pub fn new(base_path: &str, query_param: &str, public_base_url: Option<&str>) -> Self {
        let origin = public_base_url.map(|u| u.trim_end_matches('/')).unwrap_or("");
        Self {
            prefix: format!("{}{}", origin, base_path.trim_end_matches('/')),
            query_param: query_param.to_string(),
        }
    }

    pub fn from_config(config: &ProxyRouteConfig) -> Self {
        Self::new(
            &config.base_path,
            &config.query_param,
            config.public_base_url.as_deref(),
        )
    }

    /// Proxy URL for an absolute target.
    pub fn encode(&self, mode: AddressingMode, target: &Url) -> String {
        self.encode_raw(mode, target.as_str())
    }

    /// Proxy URL for a target given as text, without URL normalisation.
    pub fn encode_raw(&self, mode: AddressingMode, target: &str) -> String {
        match mode {
            AddressingMode::Query => format!(
                "{}?{}={}",
                self.prefix,
                utf8_percent_encode(&self.query_param, QUERY_VALUE),
                utf8_percent_encode(target, QUERY_VALUE)
            ),
            AddressingMode::Path => {
                format!("{}/{}", self.prefix, utf8_percent_encode(target, PATH_TOKEN))
            }
            AddressingMode::Base64Path => {
                format!("{}/base64/{}", self.prefix, STANDARD.encode(target))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoder() -> ProxyUrlEncoder {
        ProxyUrlEncoder::new("/proxy", "url", None)
    }

    #[test]
    fn encodes_each_mode() {
        let target = Url::parse("https://example.com/segment1.ts").unwrap();
        assert_eq!(
            encoder().encode(AddressingMode::Query, &target),
            "/proxy?url=https://example.com/segment1.ts"
        );
        assert_eq!(
            encoder().encode(AddressingMode::Path, &target),
            "/proxy/https://example.com/segment1.ts"
        );
        assert_eq!(
            encoder().encode(AddressingMode::Base64Path, &target),
            "/proxy/base64/aHR0cHM6Ly9leGFtcGxlLmNvbS9zZWdtZW50MS50cw=="
        );
    }

    #[test]
    fn query_mode_protects_reserved_characters() {
        let target = Url::parse("https://example.com/a.ts?x=1&y=a+b%20c").unwrap();
        assert_eq!(
            encoder().encode(AddressingMode::Query, &target),
            "/proxy?url=https://example.com/a.ts%3Fx%3D1%26y%3Da%2Bb%2520c"
        );
    }

    #[test]
    fn path_mode_escapes_query_and_percent() {
        let target = Url::parse("https://example.com/a%20b.ts?sig=1").unwrap();
        assert_eq!(
            encoder().encode(AddressingMode::Path, &target),
            "/proxy/https://example.com/a%2520b.ts%3Fsig=1"
        );
    }

    #[test]
    fn public_base_url_makes_absolute_links() {
        let encoder = ProxyUrlEncoder::new("/proxy", "url", Some("https://relay.example.net/"));
        assert_eq!(
            encoder.encode_raw(AddressingMode::Path, "https://example.com"),
            "https://relay.example.net/proxy/https://example.com"
        );
    }
}
