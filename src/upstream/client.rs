//! reqwest-backed upstream client.
//!
//! Redirects are followed here, each hop re-checked against the
//! [`TargetPolicy`]. Without private targets allowed, DNS goes through
//! [`PublicResolver`] so a public name cannot smuggle in a private address.

use std::error::Error as _;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{StreamExt, TryStreamExt};
use reqwest::redirect;

use crate::config::UpstreamConfig;
use crate::error::ProxyError;
use crate::resilience::with_deadline;
use crate::security::target_policy::{BlockedAddress, PublicResolver};
use crate::security::{PolicyViolation, TargetPolicy};
use crate::upstream::{BoxError, OutboundRequest, UpstreamResponse};

/// Shared outbound client. Cheap to clone.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    http: reqwest::Client,
    timeout: Duration,
}

impl UpstreamClient {
    pub fn new(config: &UpstreamConfig, policy: TargetPolicy) -> Result<Self, reqwest::Error> {
        let mut builder = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            // Idle bound per read, so a body that stalls mid-stream errors out
            // and the connection is dropped.
            .read_timeout(Duration::from_secs(config.timeout_secs))
            .redirect(redirect_policy(config.max_redirects, policy))
            .no_proxy();

        if !policy.allows_private() {
            builder = builder.dns_resolver(Arc::new(PublicResolver));
        }

        Ok(Self {
            http: builder.build()?,
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    /// Deadline for response headers, again for buffered bodies, and the
    /// longest pause allowed between body reads.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Send `request` and wait for the response headers.
    ///
    /// The body is returned unread. A caller-supplied `user-agent` wins over
    /// the configured default.
    pub async fn fetch(&self, request: OutboundRequest) -> Result<UpstreamResponse, ProxyError> {
        let mut builder = self
            .http
            .request(request.method, request.target)
            .headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = with_deadline(self.timeout, builder.send())
            .await
            .map_err(|elapsed| ProxyError::UpstreamTimeout(elapsed.0))?
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        let headers = response.headers().clone();
        let final_url = response.url().clone();
        let body = response
            .bytes_stream()
            .map_err(|e| Box::new(e) as BoxError)
            .boxed();

        Ok(UpstreamResponse {
            status,
            headers,
            final_url,
            body,
        })
    }

    fn classify(&self, err: reqwest::Error) -> ProxyError {
        let mut source = err.source();
        while let Some(cause) = source {
            if let Some(violation) = cause.downcast_ref::<PolicyViolation>() {
                return ProxyError::InvalidTarget(format!("redirect refused: {violation}"));
            }
            if let Some(blocked) = cause.downcast_ref::<BlockedAddress>() {
                return ProxyError::InvalidTarget(blocked.to_string());
            }
            source = cause.source();
        }

        if err.is_timeout() {
            ProxyError::UpstreamTimeout(self.timeout)
        } else if err.is_connect() {
            ProxyError::UpstreamUnreachable(err.to_string())
        } else {
            ProxyError::UpstreamProtocolError(err.to_string())
        }
    }
}

fn redirect_policy(max_redirects: usize, policy: TargetPolicy) -> redirect::Policy {
    if max_redirects == 0 {
        return redirect::Policy::none();
    }
    redirect::Policy::custom(move |attempt| {
        if attempt.previous().len() > max_redirects {
            // Hand the last 3xx back to the caller unchanged.
            attempt.stop()
        } else if let Err(violation) = policy.check(attempt.url()) {
            attempt.error(violation)
        } else {
            attempt.follow()
        }
    })
}
