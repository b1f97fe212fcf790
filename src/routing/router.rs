//! Route lookup and dispatch.
//!
//! # Responsibilities
//! - Split the inbound URI into service routes and the three addressing modes
//! - Return matched route or explicit no-match
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - Routes are disjoint by construction: `{base}` is query mode,
//!   `{base}/status` and `{base}/base64/…` are reserved, everything else
//!   under `{base}/` is path mode (a path-mode target always starts with a
//!   scheme, so it can never be `status` or `base64/…`)
//! - Explicit NotFound rather than silent default

use axum::http::Uri;
use url::form_urlencoded;

use crate::config::ProxyRouteConfig;
use crate::routing::target::{AddressingMode, TargetRef};

const STATUS_SEGMENT: &str = "status";
const BASE64_SEGMENT: &str = "base64";

/// What an inbound URI asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteMatch {
    /// `GET /`: service descriptor.
    Descriptor,
    /// `GET {base}/status`: health report.
    Status,
    /// One of the proxy addressing routes.
    Proxy(TargetRef),
    NotFound,
}

/// Compiled route table for one configuration.
#[derive(Debug, Clone)]
pub struct ProxyRouter {
    base_path: String,
    query_param: String,
}

impl ProxyRouter {
    pub fn from_config(config: &ProxyRouteConfig) -> Self {
        Self {
            base_path: config.base_path.trim_end_matches('/').to_string(),
            query_param: config.query_param.clone(),
        }
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    /// Classify a request URI.
    pub fn match_uri(&self, uri: &Uri) -> RouteMatch {
        let path = uri.path();
        if path == "/" {
            return RouteMatch::Descriptor;
        }

        let Some(rest) = path.strip_prefix(self.base_path.as_str()) else {
            return RouteMatch::NotFound;
        };

        if rest.is_empty() {
            let token = uri
                .query()
                .and_then(|q| self.query_target(q))
                .unwrap_or_default();
            return RouteMatch::Proxy(TargetRef::new(AddressingMode::Query, token));
        }

        // `/proxyfoo` shares the prefix but is a different route.
        let Some(rest) = rest.strip_prefix('/') else {
            return RouteMatch::NotFound;
        };

        if rest == STATUS_SEGMENT {
            return RouteMatch::Status;
        }

        if rest == BASE64_SEGMENT {
            return RouteMatch::Proxy(TargetRef::new(AddressingMode::Base64Path, ""));
        }
        if let Some(token) = rest
            .strip_prefix(BASE64_SEGMENT)
            .and_then(|r| r.strip_prefix('/'))
        {
            return RouteMatch::Proxy(TargetRef::new(AddressingMode::Base64Path, token));
        }

        RouteMatch::Proxy(TargetRef::new(AddressingMode::Path, rest).with_query(uri.query()))
    }

    fn query_target(&self, query: &str) -> Option<String> {
        form_urlencoded::parse(query.as_bytes())
            .find(|(key, _)| key == self.query_param.as_str())
            .map(|(_, value)| value.into_owned())
    }
}
