//! Named cache partitions (`caches` / `Cache` in the page-facing API).

use bytes::Bytes;
use chrono::{DateTime, Utc};
use hashbrown::HashMap;
use http::{HeaderMap, Method, StatusCode};
use indexmap::IndexMap;
use makerhub_net::Response;
use serde::Serialize;
use url::Url;

/// A cached request/response pair.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Request URL (the lookup key).
    pub url: Url,

    /// Request method.
    pub method: Method,

    /// Response status.
    pub status: StatusCode,

    /// Response headers.
    pub headers: HeaderMap,

    /// Response body.
    pub body: Bytes,

    /// When the entry was written.
    pub cached_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Snapshot a response for storage under `url`.
    pub fn from_response(url: &Url, response: &Response) -> Self {
        Self {
            url: url.clone(),
            method: Method::GET,
            status: response.status,
            headers: response.headers.clone(),
            body: response.body.clone(),
            cached_at: Utc::now(),
        }
    }

    /// Rebuild a response from the stored entry.
    pub fn to_response(&self) -> Response {
        Response {
            url: self.url.clone(),
            status: self.status,
            headers: self.headers.clone(),
            body: self.body.clone(),
        }
    }
}

/// One named partition.
#[derive(Debug, Default)]
pub struct Cache {
    /// Physical cache name, e.g. `static-v1.0.0`.
    pub name: String,

    entries: HashMap<String, CacheEntry>,
}

impl Cache {
    /// Create a new cache.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: HashMap::new(),
        }
    }

    /// Match a request URL.
    pub fn match_url(&self, url: &Url) -> Option<&CacheEntry> {
        self.entries.get(url.as_str())
    }

    /// Store a response under `url`, replacing any previous entry.
    pub fn put(&mut self, url: &Url, response: &Response) {
        self.entries
            .insert(url.as_str().to_string(), CacheEntry::from_response(url, response));
    }

    /// Store several already-fetched responses.
    pub fn put_all<'a>(&mut self, pairs: impl IntoIterator<Item = (&'a Url, &'a Response)>) {
        for (url, response) in pairs {
            self.put(url, response);
        }
    }

    /// Delete entry.
    pub fn delete(&mut self, url: &Url) -> bool {
        self.entries.remove(url.as_str()).is_some()
    }

    /// All keys (URLs), sorted.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.entries.keys().map(|s| s.as_str()).collect();
        keys.sort_unstable();
        keys
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Summary of one partition for diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct PartitionSummary {
    pub name: String,
    pub entries: Vec<String>,
}

/// All partitions, in creation order.
#[derive(Debug, Default)]
pub struct CacheStorage {
    caches: IndexMap<String, Cache>,
}

impl CacheStorage {
    /// Create new cache storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a cache (creates if doesn't exist).
    pub fn open(&mut self, name: &str) -> &mut Cache {
        self.caches
            .entry(name.to_string())
            .or_insert_with(|| Cache::new(name))
    }

    /// Get an existing cache.
    pub fn get(&self, name: &str) -> Option<&Cache> {
        self.caches.get(name)
    }

    /// Check if cache exists.
    pub fn has(&self, name: &str) -> bool {
        self.caches.contains_key(name)
    }

    /// Delete a cache.
    pub fn delete(&mut self, name: &str) -> bool {
        self.caches.shift_remove(name).is_some()
    }

    /// All cache names, in creation order.
    pub fn keys(&self) -> Vec<String> {
        self.caches.keys().cloned().collect()
    }

    /// Match across all caches; the oldest partition wins.
    pub fn match_url(&self, url: &Url) -> Option<&CacheEntry> {
        self.caches.values().find_map(|cache| cache.match_url(url))
    }

    /// Match within one named cache.
    pub fn match_in(&self, name: &str, url: &Url) -> Option<&CacheEntry> {
        self.caches.get(name).and_then(|cache| cache.match_url(url))
    }

    pub fn summaries(&self) -> Vec<PartitionSummary> {
        self.caches
            .values()
            .map(|cache| PartitionSummary {
                name: cache.name.clone(),
                entries: cache.keys().into_iter().map(String::from).collect(),
            })
            .collect()
    }
}
