//! Slug to deployment lookups for the router

use std::sync::Arc;

use async_trait::async_trait;
use openapi_client::models::SlugResolution;
use reqwest::{Method, StatusCode};
use tracing::debug;

use crate::cache::slug::SlugCache;
use crate::deploy::registry::DeploymentRegistry;
use crate::errors::{PlatformError, RoutingError};
use crate::http::client::HttpClient;

/// Resolves a project slug to the deployment to serve
#[async_trait]
pub trait SlugLookup: Send + Sync {
    /// `None` when the slug is unknown or has nothing to serve
    async fn lookup(&self, slug: &str) -> Result<Option<String>, RoutingError>;
}

/// In-process lookup against the registry
pub struct RegistryLookup {
    registry: Arc<DeploymentRegistry>,
}

impl RegistryLookup {
    pub fn new(registry: Arc<DeploymentRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl SlugLookup for RegistryLookup {
    async fn lookup(&self, slug: &str) -> Result<Option<String>, RoutingError> {
        match self.registry.resolve_slug(slug).await {
            Ok(deployment_id) => Ok(Some(deployment_id)),
            Err(PlatformError::NotFound(_)) => Ok(None),
            Err(e) => Err(RoutingError::Lookup(e.to_string())),
        }
    }
}

/// Lookup through a remote control API, `GET <api>/resolve/<slug>`
pub struct ApiSlugLookup {
    client: HttpClient,
}

impl ApiSlugLookup {
    pub fn new(client: HttpClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SlugLookup for ApiSlugLookup {
    async fn lookup(&self, slug: &str) -> Result<Option<String>, RoutingError> {
        let response = self
            .client
            .request(Method::GET, &format!("/resolve/{}", slug))
            .send()
            .await
            .map_err(|e| RoutingError::Lookup(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(RoutingError::Lookup(format!(
                "control API returned {} for {}",
                status, slug
            )));
        }

        let resolution: SlugResolution = response
            .json()
            .await
            .map_err(|e| RoutingError::Lookup(format!("bad resolve reply: {}", e)))?;
        if resolution.deployment_id.is_empty() {
            return Ok(None);
        }
        Ok(Some(resolution.deployment_id))
    }
}

/// Caches positive answers of another lookup
pub struct CachedSlugLookup {
    inner: Arc<dyn SlugLookup>,
    cache: SlugCache,
}

impl CachedSlugLookup {
    pub fn new(inner: Arc<dyn SlugLookup>, cache: SlugCache) -> Self {
        Self { inner, cache }
    }

    pub fn cache(&self) -> &SlugCache {
        &self.cache
    }
}

#[async_trait]
impl SlugLookup for CachedSlugLookup {
    async fn lookup(&self, slug: &str) -> Result<Option<String>, RoutingError> {
        if let Some(deployment_id) = self.cache.get(slug) {
            debug!("Slug {} served from cache", slug);
            return Ok(Some(deployment_id));
        }

        let resolved = self.inner.lookup(slug).await?;
        match &resolved {
            Some(deployment_id) => self.cache.insert(slug, deployment_id),
            None => {
                self.cache.remove(slug);
            }
        }
        Ok(resolved)
    }
}
