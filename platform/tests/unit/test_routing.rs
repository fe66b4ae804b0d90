//! Routing resolver and proxy tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use tower::ServiceExt;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use launchpad::cache::slug::SlugCache;
use launchpad::errors::RoutingError;
use launchpad::http::client::HttpClient;
use launchpad::routing::proxy::{router, upstream_client, ProxyState};
use launchpad::routing::{ApiSlugLookup, CachedSlugLookup, RoutingResolver, SlugLookup};

/// Fixed slug table counting how often it is asked
struct StaticLookup {
    slug: &'static str,
    deployment_id: &'static str,
    calls: AtomicUsize,
}

impl StaticLookup {
    fn new(slug: &'static str, deployment_id: &'static str) -> Self {
        Self {
            slug,
            deployment_id,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl SlugLookup for StaticLookup {
    async fn lookup(&self, slug: &str) -> Result<Option<String>, RoutingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok((slug == self.slug).then(|| self.deployment_id.to_string()))
    }
}

fn asset_dirs() -> Vec<String> {
    ["assets", "images", "static", "media", "_next", "js", "css"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn proxy(lookup: Arc<dyn SlugLookup>, artifact_root: &str) -> axum::Router {
    let resolver = Arc::new(RoutingResolver::new(lookup, artifact_root, asset_dirs()));
    router(Arc::new(ProxyState {
        resolver,
        client: upstream_client(Duration::from_secs(2)).unwrap(),
        max_body_bytes: 1024 * 1024,
    }))
}

fn get(host: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("host", host)
        .body(Body::empty())
        .unwrap()
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

// ================================ RESOLVER ================================= //

#[tokio::test]
async fn test_resolver_rewrites_spa_paths() {
    let resolver = RoutingResolver::new(
        Arc::new(StaticLookup::new("brave-solid-otter", "d123")),
        "http://artifacts/__output/",
        asset_dirs(),
    );

    let cases = [
        ("/", "http://artifacts/__output/d123/index.html"),
        ("/about", "http://artifacts/__output/d123/about"),
        ("/dashboard/settings", "http://artifacts/__output/d123/settings"),
        ("/assets/app.js", "http://artifacts/__output/d123/assets/app.js"),
        ("/_next/static/chunk.js", "http://artifacts/__output/d123/_next/static/chunk.js"),
        ("/docs/", "http://artifacts/__output/d123/index.html"),
    ];
    for (path, expected) in cases {
        let target = resolver
            .resolve("brave-solid-otter.example.com:8000", path)
            .await
            .unwrap();
        assert_eq!(target.url(), expected, "path {}", path);
    }
}

#[tokio::test]
async fn test_resolver_unknown_slug_and_bad_host() {
    let resolver = RoutingResolver::new(
        Arc::new(StaticLookup::new("brave-solid-otter", "d123")),
        "http://artifacts/__output",
        asset_dirs(),
    );

    assert!(matches!(
        resolver.resolve("calm-rapid-owl.example.com", "/").await,
        Err(RoutingError::NotFound(_))
    ));
    assert!(matches!(
        resolver.resolve("bad_host!.example.com", "/").await,
        Err(RoutingError::BadRequest(_))
    ));
    assert!(matches!(
        resolver.resolve("", "/").await,
        Err(RoutingError::BadRequest(_))
    ));
}

// ================================= LOOKUPS ================================= //

#[tokio::test]
async fn test_api_lookup() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/resolve/brave-solid-otter"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "deploymentId": "d123"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/resolve/calm-rapid-owl"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/resolve/wild-icy-yak"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let lookup = ApiSlugLookup::new(HttpClient::new(&server.uri(), Duration::from_secs(2)).unwrap());

    assert_eq!(
        lookup.lookup("brave-solid-otter").await.unwrap().as_deref(),
        Some("d123")
    );
    assert_eq!(lookup.lookup("calm-rapid-owl").await.unwrap(), None);
    assert!(matches!(
        lookup.lookup("wild-icy-yak").await,
        Err(RoutingError::Lookup(_))
    ));
}

#[tokio::test]
async fn test_cached_lookup_serves_repeat_hits() {
    let inner = Arc::new(StaticLookup::new("brave-solid-otter", "d123"));
    let cached = CachedSlugLookup::new(inner.clone(), SlugCache::new(16, Duration::from_secs(60)));

    for _ in 0..3 {
        assert_eq!(
            cached.lookup("brave-solid-otter").await.unwrap().as_deref(),
            Some("d123")
        );
    }
    assert_eq!(inner.calls.load(Ordering::SeqCst), 1);

    // misses are not cached
    assert_eq!(cached.lookup("calm-rapid-owl").await.unwrap(), None);
    assert_eq!(cached.lookup("calm-rapid-owl").await.unwrap(), None);
    assert_eq!(inner.calls.load(Ordering::SeqCst), 3);
    assert_eq!(cached.cache().len(), 1);
}

// ================================== PROXY ================================== //

#[tokio::test]
async fn test_proxy_serves_index_for_slug_host() {
    let artifacts = MockServer::start().await;
    let upstream_host = artifacts
        .uri()
        .trim_start_matches("http://")
        .to_string();
    Mock::given(method("GET"))
        .and(path("/__output/d123/index.html"))
        .and(header("host", upstream_host.as_str()))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html")
                .set_body_string("<h1>hello</h1>"),
        )
        .expect(1)
        .mount(&artifacts)
        .await;

    let app = proxy(
        Arc::new(StaticLookup::new("brave-solid-otter", "d123")),
        &format!("{}/__output", artifacts.uri()),
    );
    let response = app
        .oneshot(get("brave-solid-otter.example.com", "/"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "text/html"
    );
    assert_eq!(body_text(response).await, "<h1>hello</h1>");
}

#[tokio::test]
async fn test_proxy_keeps_query_and_asset_paths() {
    let artifacts = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/__output/d123/assets/app.js"))
        .and(query_param("v", "42"))
        .respond_with(ResponseTemplate::new(200).set_body_string("console.log(1)"))
        .expect(1)
        .mount(&artifacts)
        .await;

    let app = proxy(
        Arc::new(StaticLookup::new("brave-solid-otter", "d123")),
        &format!("{}/__output", artifacts.uri()),
    );
    let response = app
        .oneshot(get("d123.example.com", "/assets/app.js?v=42"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "console.log(1)");
}

#[tokio::test]
async fn test_proxy_relays_artifact_status() {
    let artifacts = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404).set_body_string("missing"))
        .mount(&artifacts)
        .await;

    let app = proxy(
        Arc::new(StaticLookup::new("brave-solid-otter", "d123")),
        &format!("{}/__output", artifacts.uri()),
    );
    let response = app
        .oneshot(get("d123.example.com", "/favicon.ico"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_text(response).await, "missing");
}

#[tokio::test]
async fn test_proxy_relays_redirects_without_following() {
    let artifacts = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/__output/d123/old"))
        .respond_with(ResponseTemplate::new(302).insert_header("location", "/new"))
        .expect(1)
        .mount(&artifacts)
        .await;
    Mock::given(method("GET"))
        .and(path("/new"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&artifacts)
        .await;

    let app = proxy(
        Arc::new(StaticLookup::new("brave-solid-otter", "d123")),
        &format!("{}/__output", artifacts.uri()),
    );
    let response = app
        .oneshot(get("d123.example.com", "/old"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(response.headers().get("location").unwrap(), "/new");
}

#[tokio::test]
async fn test_proxy_unknown_slug_is_not_found() {
    let app = proxy(
        Arc::new(StaticLookup::new("brave-solid-otter", "d123")),
        "http://127.0.0.1:9/__output",
    );
    let response = app
        .oneshot(get("calm-rapid-owl.example.com", "/"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_text(response).await, "No deployment found");
}

#[tokio::test]
async fn test_proxy_lookup_failure_is_bad_gateway() {
    let api = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&api)
        .await;

    let lookup = Arc::new(ApiSlugLookup::new(
        HttpClient::new(&api.uri(), Duration::from_secs(2)).unwrap(),
    ));
    let app = proxy(lookup, "http://127.0.0.1:9/__output");
    let response = app
        .oneshot(get("brave-solid-otter.example.com", "/"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(body_text(response).await, "Failed to resolve deployment");
}

#[tokio::test]
async fn test_proxy_unreachable_artifacts_is_bad_gateway() {
    // nothing listens on the discard port
    let app = proxy(
        Arc::new(StaticLookup::new("brave-solid-otter", "d123")),
        "http://127.0.0.1:9/__output",
    );
    let response = app
        .oneshot(get("brave-solid-otter.example.com", "/"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(
        body_text(response).await,
        "Failed to reach deployment artifacts"
    );
}

#[tokio::test]
async fn test_proxy_bad_artifact_root_is_internal_error() {
    let app = proxy(
        Arc::new(StaticLookup::new("brave-solid-otter", "d123")),
        "not a url",
    );
    let response = app
        .oneshot(get("brave-solid-otter.example.com", "/"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_proxy_invalid_host_is_bad_request() {
    let app = proxy(
        Arc::new(StaticLookup::new("brave-solid-otter", "d123")),
        "http://127.0.0.1:9/__output",
    );
    let response = app
        .oneshot(get("bad_host!.example.com", "/"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
