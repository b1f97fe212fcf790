//! Target resolution.
//!
//! Turns the raw token carried by an inbound request into a validated
//! absolute http(s) URL.
//!
//! ```text
//! TargetRef { mode, token }
//!     → decode per mode (query: as-is, path: percent-decode,
//!       base64: percent-decode → base64-decode)
//!     → trim
//!     → require an explicit scheme
//!     → parse absolute URL
//!     → TargetPolicy (http/https, public host)
//!     → ResolvedTarget
//! ```

use std::fmt;
use std::str::FromStr;

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine as _;
use percent_encoding::percent_decode_str;
use url::Url;

use crate::error::ProxyError;
use crate::security::TargetPolicy;

/// Standard alphabet, padding optional on decode.
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// How a caller spelled the target in the inbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressingMode {
    /// `{base}?url=<target>`
    Query,
    /// `{base}/<target>`
    Path,
    /// `{base}/base64/<base64(target)>`
    Base64Path,
}

impl AddressingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AddressingMode::Query => "query",
            AddressingMode::Path => "path",
            AddressingMode::Base64Path => "base64",
        }
    }
}

impl fmt::Display for AddressingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AddressingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "query" => Ok(AddressingMode::Query),
            "path" => Ok(AddressingMode::Path),
            "base64" | "base64path" => Ok(AddressingMode::Base64Path),
            other => Err(format!("unknown addressing mode '{other}'")),
        }
    }
}

/// The addressing half of an inbound proxy request: which mode matched and
/// the still-encoded token it carried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetRef {
    pub mode: AddressingMode,
    /// Raw token as it appeared in the request (query value already
    /// form-decoded, path and base64 tokens still percent-encoded).
    pub token: String,
    /// Inbound query string, appended to path-mode targets.
    pub carried_query: Option<String>,
}

impl TargetRef {
    pub fn new(mode: AddressingMode, token: impl Into<String>) -> Self {
        Self {
            mode,
            token: token.into(),
            carried_query: None,
        }
    }

    pub fn with_query(mut self, query: Option<&str>) -> Self {
        self.carried_query = query.filter(|q| !q.is_empty()).map(str::to_owned);
        self
    }
}

/// A validated absolute http(s) target. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    url: Url,
    original_token: String,
    mode: AddressingMode,
}

impl ResolvedTarget {
    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn original_token(&self) -> &str {
        &self.original_token
    }

    pub fn mode(&self) -> AddressingMode {
        self.mode
    }
}

/// Resolve a [`TargetRef`] under `policy`.
pub fn resolve(target: &TargetRef, policy: &TargetPolicy) -> Result<ResolvedTarget, ProxyError> {
    let decoded = decode_token(target.mode, &target.token)?;
    let mut candidate = decoded.trim().to_string();

    if candidate.is_empty() {
        return Err(ProxyError::InvalidTarget(format!(
            "no target URL supplied ({} mode)",
            target.mode
        )));
    }

    if target.mode == AddressingMode::Path {
        if let Some(query) = &target.carried_query {
            candidate.push(if candidate.contains('?') { '&' } else { '?' });
            candidate.push_str(query);
        }
    }

    if !has_scheme(&candidate) {
        return Err(ProxyError::InvalidTarget(format!(
            "'{candidate}' is not an absolute URL"
        )));
    }

    let url = Url::parse(&candidate)
        .map_err(|e| ProxyError::InvalidTarget(format!("'{candidate}': {e}")))?;

    policy
        .check(&url)
        .map_err(|violation| ProxyError::InvalidTarget(violation.to_string()))?;

    Ok(ResolvedTarget {
        url,
        original_token: target.token.clone(),
        mode: target.mode,
    })
}

fn decode_token(mode: AddressingMode, token: &str) -> Result<String, ProxyError> {
    match mode {
        AddressingMode::Query => Ok(token.to_string()),
        AddressingMode::Path => percent_decode(token),
        AddressingMode::Base64Path => {
            let encoded = percent_decode(token)?;
            let raw = LENIENT_BASE64
                .decode(encoded.trim())
                .map_err(|e| ProxyError::InvalidTarget(format!("invalid base64 target: {e}")))?;
            String::from_utf8(raw)
                .map_err(|_| ProxyError::InvalidTarget("base64 target is not UTF-8".into()))
        }
    }
}

fn percent_decode(token: &str) -> Result<String, ProxyError> {
    percent_decode_str(token)
        .decode_utf8()
        .map(|s| s.into_owned())
        .map_err(|_| ProxyError::InvalidTarget("target is not valid UTF-8 once decoded".into()))
}

/// `scheme ":"` per RFC 3986: ALPHA *( ALPHA / DIGIT / "+" / "-" / "." ).
fn has_scheme(candidate: &str) -> bool {
    let Some((scheme, _)) = candidate.split_once(':') else {
        return false;
    };
    let mut chars = scheme.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}
