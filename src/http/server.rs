//! HTTP server setup and request dispatch.
//!
//! # Responsibilities
//! - Create the Axum router with one catch-all route
//! - Wire up middleware (request ID, tracing, timeout, CORS, compression,
//!   security headers)
//! - Dispatch requests to the route classifier
//! - Forward proxy requests upstream and emit the response
//! - Swap per-config state when the config file changes

use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use axum::{
    error_handling::HandleErrorLayer,
    extract::{Request, State},
    http::{header, Extensions, HeaderMap, HeaderName, Method, StatusCode, Uri, Version},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::any,
    Json, Router,
};
use bytes::Bytes;
use futures_util::{stream, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower::{timeout::error::Elapsed, ServiceBuilder};
use tower_http::{
    compression::{
        predicate::{DefaultPredicate, Predicate},
        CompressionLayer,
    },
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::config::ProxyConfig;
use crate::error::ProxyError;
use crate::health::{ServiceDescriptor, StatusReport};
use crate::http::request::{make_request_span, X_REQUEST_ID};
use crate::http::response::{compressible, emit, Payload};
use crate::observability::metrics;
use crate::playlist::{charset, classify, ContentClass, PlaylistRewriter};
use crate::resilience::with_deadline;
use crate::routing::{resolve, AddressingMode, ProxyRouter, ProxyUrlEncoder, RouteMatch, TargetRef};
use crate::security::headers::{apply_security_headers, forward_request_headers};
use crate::security::limits::{collect_bounded, read_request_body, Collected};
use crate::security::TargetPolicy;
use crate::upstream::{BoxError, OutboundRequest, UpstreamClient, UpstreamResponse};
use url::Url;

/// Errors that stop the server from starting or serving.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("failed to build upstream client: {0}")]
    Client(#[from] reqwest::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Everything derived from one loaded configuration.
pub struct AppInner {
    pub config: ProxyConfig,
    pub router: ProxyRouter,
    pub encoder: ProxyUrlEncoder,
    pub policy: TargetPolicy,
    pub upstream: UpstreamClient,
}

impl AppInner {
    pub fn from_config(config: ProxyConfig) -> Result<Self, ServerError> {
        let policy = TargetPolicy::new(config.security.allow_private_targets);
        let upstream = UpstreamClient::new(&config.upstream, policy)?;
        Ok(Self {
            router: ProxyRouter::from_config(&config.proxy),
            encoder: ProxyUrlEncoder::from_config(&config.proxy),
            policy,
            upstream,
            config,
        })
    }
}

/// Application state injected into handlers.
///
/// Each request loads one snapshot of [`AppInner`] and uses it throughout,
/// so a reload never mixes two configurations within a request.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<ArcSwap<AppInner>>,
    started_at: Instant,
}

impl AppState {
    pub fn new(inner: AppInner) -> Self {
        Self {
            inner: Arc::new(ArcSwap::from_pointee(inner)),
            started_at: Instant::now(),
        }
    }

    pub fn current(&self) -> Arc<AppInner> {
        self.inner.load_full()
    }

    pub fn replace(&self, inner: AppInner) {
        self.inner.store(Arc::new(inner));
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }
}

/// HTTP server for the forwarding proxy.
pub struct HttpServer {
    router: Router,
    state: AppState,
    config: ProxyConfig,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: ProxyConfig) -> Result<Self, ServerError> {
        let state = AppState::new(AppInner::from_config(config.clone())?);
        let router = Self::build_router(&config, state.clone());
        Ok(Self {
            router,
            state,
            config,
        })
    }

    /// Build the Axum router with all middleware layers.
    ///
    /// Layers are listed innermost first; the request ID is assigned before
    /// the trace span opens.
    fn build_router(config: &ProxyConfig, state: AppState) -> Router {
        let request_timeout = Duration::from_secs(config.limits.request_timeout_secs);
        let compression_state = state.clone();
        let compress_when = move |status: StatusCode,
                                  _version: Version,
                                  headers: &HeaderMap,
                                  _extensions: &Extensions| {
            compression_state.current().config.compression.enabled
                && compressible(status, headers)
        };

        Router::new()
            .route("/", any(dispatch))
            .route("/{*path}", any(dispatch))
            .layer(
                ServiceBuilder::new()
                    .layer(HandleErrorLayer::new(move |uri: Uri, err: BoxError| async move {
                        request_failed(uri, err, request_timeout)
                    }))
                    .timeout(request_timeout),
            )
            .layer(middleware::from_fn_with_state(
                state.clone(),
                security_headers_middleware,
            ))
            .layer(CompressionLayer::new().compress_when(DefaultPredicate::new().and(compress_when)))
            .layer(cors_layer())
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http().make_span_with(make_request_span))
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .with_state(state)
    }

    /// Run the server on a plain TCP listener until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        config_updates: mpsc::UnboundedReceiver<ProxyConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ServerError> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            base_path = %self.config.proxy.base_path,
            "HTTP server starting"
        );

        spawn_config_updates(self.state.clone(), config_updates, shutdown.resubscribe());

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Draining in-flight requests");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Run the server with TLS termination until `shutdown` fires.
    pub async fn run_tls(
        self,
        listener: TcpListener,
        tls: axum_server::tls_rustls::RustlsConfig,
        config_updates: mpsc::UnboundedReceiver<ProxyConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ServerError> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTPS server starting");

        spawn_config_updates(self.state.clone(), config_updates, shutdown.resubscribe());

        let handle = axum_server::Handle::new();
        let drain = handle.clone();
        tokio::spawn(async move {
            let _ = shutdown.recv().await;
            tracing::info!("Draining in-flight requests");
            drain.graceful_shutdown(Some(Duration::from_secs(30)));
        });

        let std_listener = listener.into_std()?;
        std_listener.set_nonblocking(true)?;
        axum_server::from_tcp_rustls(std_listener, tls)
            .handle(handle)
            .serve(self.router.into_make_service())
            .await?;

        tracing::info!("HTTPS server stopped");
        Ok(())
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Configuration the server was started with.
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers([
            header::CONTENT_LENGTH,
            header::CONTENT_RANGE,
            header::CONTENT_TYPE,
            header::ACCEPT_RANGES,
            header::ETAG,
            header::LAST_MODIFIED,
            HeaderName::from_static(X_REQUEST_ID),
        ])
        .max_age(Duration::from_secs(86_400))
}

/// Apply every validated config pushed by the watcher until shutdown.
fn spawn_config_updates(
    state: AppState,
    mut updates: mpsc::UnboundedReceiver<ProxyConfig>,
    mut shutdown: broadcast::Receiver<()>,
) {
    tokio::spawn(async move {
        loop {
            let config = tokio::select! {
                update = updates.recv() => match update {
                    Some(config) => config,
                    None => break,
                },
                _ = shutdown.recv() => break,
            };

            let previous_bind = state.current().config.listener.bind_address.clone();
            if config.listener.bind_address != previous_bind {
                tracing::warn!(
                    current = %previous_bind,
                    requested = %config.listener.bind_address,
                    "Listener address changes take effect after a restart"
                );
            }

            match AppInner::from_config(config) {
                Ok(inner) => {
                    state.replace(inner);
                    tracing::info!("Configuration reloaded");
                }
                Err(e) => {
                    tracing::error!(error = %e, "Reloaded configuration could not be applied");
                }
            }
        }
    });
}

/// Envelope for a request the whole-request deadline cut short. Dropping the
/// handler future also drops its outbound fetch.
fn request_failed(uri: Uri, err: BoxError, budget: Duration) -> Response {
    let error = if err.is::<Elapsed>() {
        ProxyError::UpstreamTimeout(budget)
    } else {
        ProxyError::Internal(err.to_string())
    };
    tracing::warn!(path = %uri.path(), error = %error, "Request aborted");
    metrics::record_upstream_error(error.kind());
    error.at(uri.path()).into_response()
}

async fn security_headers_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let enabled = state.current().config.security.security_headers;
    let mut response = next.run(request).await;
    if enabled {
        apply_security_headers(response.headers_mut());
    }
    response
}

/// Single entry point for every inbound request.
async fn dispatch(State(state): State<AppState>, request: Request) -> Response {
    let app = state.current();
    let path = request.uri().path().to_string();
    let readable = matches!(*request.method(), Method::GET | Method::HEAD);

    match app.router.match_uri(request.uri()) {
        RouteMatch::Descriptor if readable => Json(ServiceDescriptor::new(
            &app.config.service,
            &app.encoder,
            app.router.base_path(),
        ))
        .into_response(),
        RouteMatch::Status if readable => {
            Json(StatusReport::collect(&app.config.service, state.uptime())).into_response()
        }
        RouteMatch::Proxy(target) => {
            let started = Instant::now();
            let mode = target.mode;
            let response = match proxy_request(&app, target, request).await {
                Ok(response) => response,
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        kind = e.kind(),
                        mode = %mode,
                        "Proxy request failed"
                    );
                    metrics::record_upstream_error(e.kind());
                    e.at(path).into_response()
                }
            };
            metrics::record_request(mode.as_str(), response.status().as_u16(), started);
            response
        }
        _ => {
            tracing::debug!(path = %path, "No route matched");
            ProxyError::NotFound.at(path).into_response()
        }
    }
}

/// Resolve, forward, classify, and emit one proxy request.
async fn proxy_request(
    app: &AppInner,
    target: TargetRef,
    request: Request,
) -> Result<Response, ProxyError> {
    let resolved = resolve(&target, &app.policy)?;
    let (parts, body) = request.into_parts();
    let body = read_request_body(body, &parts.headers, app.config.limits.max_body_bytes).await?;

    tracing::debug!(
        target = %resolved.url(),
        mode = %resolved.mode(),
        method = %parts.method,
        "Forwarding request"
    );

    let upstream = app
        .upstream
        .fetch(OutboundRequest {
            target: resolved.url().clone(),
            method: parts.method.clone(),
            headers: forward_request_headers(&parts.headers),
            body,
        })
        .await?;

    let class = delivery_class(&parts.method, &upstream, resolved.url());

    tracing::debug!(
        status = upstream.status.as_u16(),
        class = class.as_str(),
        final_url = %upstream.final_url,
        "Upstream responded"
    );

    match class {
        ContentClass::Passthrough => Ok(emit(
            upstream.status,
            &upstream.headers,
            Payload::Stream(upstream.body),
            false,
        )),
        ContentClass::Playlist => deliver_playlist(app, resolved.mode(), upstream).await,
    }
}

/// How an upstream response reaches the caller.
///
/// HEAD has no body to rewrite, error pages are never playlists and a
/// partial body cannot be rewritten without invalidating its range.
fn delivery_class(method: &Method, upstream: &UpstreamResponse, target: &Url) -> ContentClass {
    let ranged = upstream.status == StatusCode::PARTIAL_CONTENT
        || upstream.headers.contains_key(header::CONTENT_RANGE);
    if method == Method::HEAD || !upstream.status.is_success() || ranged {
        ContentClass::Passthrough
    } else {
        classify(upstream.content_type(), target)
    }
}

/// Buffer, rewrite and emit a playlist. Falls back to the original bytes
/// whenever the rewrite is not certain.
async fn deliver_playlist(
    app: &AppInner,
    mode: AddressingMode,
    upstream: UpstreamResponse,
) -> Result<Response, ProxyError> {
    let charset = upstream.content_type().and_then(charset);
    let UpstreamResponse {
        status,
        headers,
        final_url,
        mut body,
    } = upstream;

    let limit = app.config.limits.max_playlist_bytes;
    let collected = with_deadline(app.upstream.timeout(), collect_bounded(&mut body, limit))
        .await
        .map_err(|elapsed| ProxyError::UpstreamTimeout(elapsed.0))?
        .map_err(|e| ProxyError::UpstreamProtocolError(format!("reading playlist body: {e}")))?;

    let bytes = match collected {
        Collected::Complete(bytes) => bytes,
        Collected::Overflow(prefix) => {
            tracing::warn!(limit, "Playlist exceeds size limit, streaming unmodified");
            metrics::record_rewrite("oversize");
            let replay = stream::iter(prefix.into_iter().map(Ok::<Bytes, BoxError>));
            return Ok(emit(
                status,
                &headers,
                Payload::Stream(replay.chain(body).boxed()),
                false,
            ));
        }
    };

    match PlaylistRewriter::new(&app.encoder, mode).rewrite(&bytes, charset.as_deref(), &final_url) {
        Ok(rewritten) => {
            metrics::record_rewrite("rewritten");
            Ok(emit(status, &headers, Payload::Buffered(Bytes::from(rewritten)), true))
        }
        Err(e) => {
            tracing::warn!(error = %e, base = %final_url, "Playlist rewrite failed, serving original");
            metrics::record_rewrite("failed");
            Ok(emit(status, &headers, Payload::Buffered(bytes), false))
        }
    }
}
