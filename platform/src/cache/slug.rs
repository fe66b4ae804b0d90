//! Slug resolution cache

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

/// Slug cache entry
#[derive(Debug, Clone)]
pub struct SlugCacheEntry {
    pub deployment_id: String,
    pub cached_at: Instant,
}

/// In-memory slug to deployment cache with a TTL and a capacity bound.
///
/// Only the routing proxy reads it; entries are never authoritative.
pub struct SlugCache {
    entries: RwLock<HashMap<String, SlugCacheEntry>>,
    capacity: usize,
    ttl: Duration,
}

impl SlugCache {
    /// Create a new slug cache
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            capacity,
            ttl,
        }
    }

    /// Get a live entry
    pub fn get(&self, slug: &str) -> Option<String> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries
            .get(slug)
            .filter(|entry| entry.cached_at.elapsed() < self.ttl)
            .map(|entry| entry.deployment_id.clone())
    }

    /// Insert a resolution, evicting expired entries and then the oldest one when full
    pub fn insert(&self, slug: &str, deployment_id: &str) {
        if self.capacity == 0 {
            return;
        }
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());

        if entries.len() >= self.capacity && !entries.contains_key(slug) {
            let ttl = self.ttl;
            entries.retain(|_, entry| entry.cached_at.elapsed() < ttl);
        }
        if entries.len() >= self.capacity && !entries.contains_key(slug) {
            if let Some(oldest) = entries
                .iter()
                .min_by_key(|(_, e)| e.cached_at)
                .map(|(slug, _)| slug.clone())
            {
                entries.remove(&oldest);
            }
        }

        entries.insert(
            slug.to_string(),
            SlugCacheEntry {
                deployment_id: deployment_id.to_string(),
                cached_at: Instant::now(),
            },
        );
    }

    /// Remove a slug from cache
    pub fn remove(&self, slug: &str) -> Option<SlugCacheEntry> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.remove(slug)
    }

    /// Clear the cache
    pub fn clear(&self) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.clear();
    }

    /// Get cache size, expired entries included
    pub fn len(&self) -> usize {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.len()
    }

    /// Check if cache is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
