//! Named response caches shared by every page the worker controls
//!
//! Two versioned namespaces: static (shell assets, filled at install) and
//! dynamic (filled at runtime). Entries are never evicted one by one; a
//! namespace is dropped wholesale when the worker version changes. Writes
//! are last-writer-wins per key.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use hyper::header::{HeaderMap, HeaderName, HeaderValue};
use hyper::StatusCode;
use std::sync::Arc;
use tracing::debug;

use super::upstream::FetchResponse;

pub const STATIC_CACHE_PREFIX: &str = "pocket-static-v";
pub const DYNAMIC_CACHE_PREFIX: &str = "pocket-dynamic-v";

/// Stored copy of a response
#[derive(Debug, Clone, PartialEq)]
pub struct CachedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    pub captured_at: DateTime<Utc>,
}

impl CachedResponse {
    pub fn capture(response: &FetchResponse) -> Self {
        let headers = response
            .headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        Self {
            status: response.status.as_u16(),
            headers,
            body: response.body.clone(),
            captured_at: Utc::now(),
        }
    }

    pub fn to_response(&self) -> FetchResponse {
        let mut headers = HeaderMap::new();
        for (name, value) in &self.headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                headers.append(name, value);
            }
        }
        FetchResponse {
            status: StatusCode::from_u16(self.status).unwrap_or(StatusCode::OK),
            headers,
            body: self.body.clone(),
        }
    }
}

/// Current cache names for a worker version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheNames {
    pub static_name: String,
    pub dynamic_name: String,
}

impl CacheNames {
    pub fn for_version(version: u32) -> Self {
        Self {
            static_name: format!("{}{}", STATIC_CACHE_PREFIX, version),
            dynamic_name: format!("{}{}", DYNAMIC_CACHE_PREFIX, version),
        }
    }

    pub fn is_current(&self, name: &str) -> bool {
        name == self.static_name || name == self.dynamic_name
    }
}

type Cache = DashMap<String, CachedResponse>;

/// Cache key for a URL: the fragment never reaches the network
pub fn normalize_key(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(mut parsed) => {
            parsed.set_fragment(None);
            parsed.to_string()
        }
        Err(_) => url.split('#').next().unwrap_or(url).to_string(),
    }
}

/// All named caches of one origin
#[derive(Debug, Default)]
pub struct CacheStorage {
    caches: DashMap<String, Arc<Cache>>,
}

impl CacheStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn open(&self, name: &str) -> Arc<Cache> {
        self.caches
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(DashMap::new()))
            .clone()
    }

    pub fn put(&self, cache_name: &str, url: &str, response: &FetchResponse) {
        let key = normalize_key(url);
        debug!(cache = cache_name, key = %key, "Caching response");
        self.open(cache_name)
            .insert(key, CachedResponse::capture(response));
    }

    pub fn get(&self, cache_name: &str, url: &str) -> Option<CachedResponse> {
        let cache = self.caches.get(cache_name)?.clone();
        let entry = cache.get(&normalize_key(url))?;
        Some(entry.clone())
    }

    /// First match across the given caches, in order
    pub fn match_in(&self, cache_names: &[&str], url: &str) -> Option<CachedResponse> {
        cache_names.iter().find_map(|name| self.get(name, url))
    }

    pub fn has(&self, cache_name: &str) -> bool {
        self.caches.contains_key(cache_name)
    }

    pub fn delete(&self, cache_name: &str) -> bool {
        self.caches.remove(cache_name).is_some()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.caches.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self, cache_name: &str) -> usize {
        self.caches.get(cache_name).map(|c| c.len()).unwrap_or(0)
    }
}
