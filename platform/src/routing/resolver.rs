//! Hostname and path resolution to artifact locations

use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use crate::errors::RoutingError;
use crate::models::slug::is_slug;
use crate::routing::lookup::SlugLookup;

/// Where a request is served from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingTarget {
    pub deployment_id: String,

    /// `<artifact_root>/<deployment_id>/`
    pub base_url: String,

    /// Rewritten request path, always starting with `/`
    pub path: String,
}

impl RoutingTarget {
    /// Full artifact URL of the request
    pub fn url(&self) -> String {
        format!("{}{}", self.base_url, self.path.trim_start_matches('/'))
    }
}

/// Maps inbound hosts to deployments and request paths to artifact paths
pub struct RoutingResolver {
    lookup: Arc<dyn SlugLookup>,
    artifact_root: String,
    asset_dirs: HashSet<String>,
}

impl RoutingResolver {
    pub fn new(
        lookup: Arc<dyn SlugLookup>,
        artifact_root: &str,
        asset_dirs: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            lookup,
            artifact_root: artifact_root.trim_end_matches('/').to_string(),
            asset_dirs: asset_dirs.into_iter().collect(),
        }
    }

    /// Resolve the target for a request to `hostname` at `request_path`
    pub async fn resolve(
        &self,
        hostname: &str,
        request_path: &str,
    ) -> Result<RoutingTarget, RoutingError> {
        let subdomain = subdomain(hostname)
            .ok_or_else(|| RoutingError::BadRequest(format!("unroutable host {:?}", hostname)))?;

        let deployment_id = if is_slug(&subdomain) {
            self.lookup
                .lookup(&subdomain)
                .await?
                .ok_or_else(|| RoutingError::NotFound(format!("no deployment for {}", subdomain)))?
        } else {
            subdomain
        };

        let target = RoutingTarget {
            base_url: format!("{}/{}/", self.artifact_root, deployment_id),
            path: rewrite_path(request_path, &self.asset_dirs),
            deployment_id,
        };
        debug!("{}{} resolves to {}", hostname, request_path, target.url());
        Ok(target)
    }
}

/// First label of a host, port stripped and lowercased.
///
/// `None` when the label is empty or is not a valid DNS label.
pub fn subdomain(hostname: &str) -> Option<String> {
    let host = hostname.trim();
    let host = host.rsplit_once(':').map_or(host, |(name, port)| {
        if port.chars().all(|c| c.is_ascii_digit()) {
            name
        } else {
            host
        }
    });

    let label = host.split('.').next()?.to_ascii_lowercase();
    let valid = !label.is_empty()
        && label.len() <= 63
        && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
    valid.then_some(label)
}

/// Rewrite a request path for single-page apps.
///
/// `/` becomes `/index.html`; a nested path whose first segment is not a
/// known asset directory loses that segment, so `/dashboard/settings` is
/// served from `/settings`. Single-segment paths are left alone.
pub fn rewrite_path(path: &str, asset_dirs: &HashSet<String>) -> String {
    if path.is_empty() || path == "/" {
        return "/index.html".to_string();
    }

    let Some((first, rest)) = path.strip_prefix('/').and_then(|p| p.split_once('/')) else {
        return path.to_string();
    };
    if first.is_empty() || asset_dirs.contains(first) {
        return path.to_string();
    }
    if rest.is_empty() {
        return "/index.html".to_string();
    }
    format!("/{}", rest)
}
