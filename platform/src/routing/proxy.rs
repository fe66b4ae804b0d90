//! Reverse proxy serving deployments from the artifact store

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    http::{header, HeaderName},
    response::Response,
    Router,
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::app::options::ProxyOptions;
use crate::errors::{PlatformError, RoutingError};
use crate::routing::resolver::{RoutingResolver, RoutingTarget};

/// State for the proxy handler
pub struct ProxyState {
    pub resolver: Arc<RoutingResolver>,
    pub client: reqwest::Client,
    pub max_body_bytes: usize,
}

impl ProxyState {
    pub fn new(resolver: Arc<RoutingResolver>, options: &ProxyOptions) -> Result<Self, PlatformError> {
        Ok(Self {
            resolver,
            client: upstream_client(options.request_timeout)?,
            max_body_bytes: options.max_body_bytes,
        })
    }
}

/// Client for the artifact store. Redirects are relayed to the caller, not followed.
pub fn upstream_client(timeout: Duration) -> Result<reqwest::Client, PlatformError> {
    Ok(reqwest::Client::builder()
        .timeout(timeout)
        .redirect(reqwest::redirect::Policy::none())
        .build()?)
}

/// Router sending every request through the resolver
pub fn router(state: Arc<ProxyState>) -> Router {
    Router::new()
        .fallback(proxy_handler)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Start the proxy server
pub async fn serve(
    options: &ProxyOptions,
    state: Arc<ProxyState>,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<JoinHandle<Result<(), PlatformError>>, PlatformError> {
    let app = router(state);

    let addr = format!("{}:{}", options.host, options.port);
    info!("Starting routing proxy on {}", addr);

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| PlatformError::ServerError(e.to_string()))?;

    let handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| PlatformError::ServerError(e.to_string()))
    });

    Ok(handle)
}

/// Resolve the request host and relay the request to the artifact store
pub async fn proxy_handler(
    State(state): State<Arc<ProxyState>>,
    request: Request,
) -> Result<Response, RoutingError> {
    let host = request
        .headers()
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .or_else(|| request.uri().host())
        .map(str::to_string)
        .ok_or_else(|| RoutingError::BadRequest("missing Host header".to_string()))?;

    let target = match state.resolver.resolve(&host, request.uri().path()).await {
        Ok(target) => target,
        Err(e) => {
            warn!("Cannot route {}{}: {}", host, request.uri().path(), e);
            return Err(e);
        }
    };

    forward(&state, &target, request).await
}

async fn forward(
    state: &ProxyState,
    target: &RoutingTarget,
    request: Request,
) -> Result<Response, RoutingError> {
    let mut url = url::Url::parse(&target.url())
        .map_err(|e| RoutingError::Internal(format!("bad artifact URL {}: {}", target.url(), e)))?;
    let upstream_host = match (url.host_str(), url.port()) {
        (Some(host), Some(port)) => format!("{}:{}", host, port),
        (Some(host), None) => host.to_string(),
        (None, _) => {
            return Err(RoutingError::Internal(format!(
                "artifact URL {} has no host",
                url
            )))
        }
    };

    let (parts, body) = request.into_parts();
    url.set_query(parts.uri.query());

    let body = to_bytes(body, state.max_body_bytes)
        .await
        .map_err(|e| RoutingError::BadRequest(format!("unreadable body: {}", e)))?;

    let mut outbound = state.client.request(parts.method, url);
    for (name, value) in &parts.headers {
        if name != header::HOST && !is_hop_by_hop(name) {
            outbound = outbound.header(name, value);
        }
    }
    outbound = outbound.header(header::HOST, upstream_host);

    let upstream = outbound
        .body(body)
        .send()
        .await
        .map_err(|e| RoutingError::Upstream(e.to_string()))?;

    let mut response = Response::builder().status(upstream.status());
    for (name, value) in upstream.headers() {
        if !is_hop_by_hop(name) {
            response = response.header(name, value);
        }
    }
    // Artifacts are streamed through, never buffered whole
    response
        .body(Body::from_stream(upstream.bytes_stream()))
        .map_err(|e| RoutingError::Internal(e.to_string()))
}

/// Connection-scoped headers plus `content-length`, which the client recomputes
fn is_hop_by_hop(name: &HeaderName) -> bool {
    matches!(
        name.as_str(),
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "te"
            | "trailer"
            | "transfer-encoding"
            | "upgrade"
            | "content-length"
    )
}
