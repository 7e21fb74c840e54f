//! Worker configuration.
//!
//! Everything the worker treats as a fixed constant lives here so a host (or a
//! test) can inject its own version and origin instead of relying on globals.

use std::path::Path;
use std::time::Duration;

use makerhub_common::{BackoffPolicy, MakerHubError, ResultExt};
use regex::RegexSet;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::partitions::PartitionNames;

/// Deployed cache version.
pub const DEFAULT_VERSION: &str = "v1.0.0";

const DEFAULT_ORIGIN: &str = "http://localhost:3000/";

/// Worker configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Origin the worker is registered for; relative paths resolve against it.
    pub origin: Url,

    /// Version suffix embedded in every partition name.
    pub version: String,

    /// Paths precached into the `static` partition at install.
    pub static_assets: Vec<String>,

    /// Offline fallback page, also stored in the `offline` partition.
    pub offline_page: String,

    /// Regular expressions selecting the API strategy.
    pub api_patterns: Vec<String>,

    /// Prefix for product detail pages opened from notifications.
    pub product_path: String,

    /// Base notification shape for push messages.
    pub notifications: NotificationDefaults,

    /// Host-side retry policy for background sync.
    pub sync: SyncSettings,
}

/// Fixed fields every push notification starts from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationDefaults {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub vibrate: Vec<u32>,
    pub primary_key: u64,
    pub explore_title: String,
    pub close_title: String,
}

/// Background sync rescheduling, as the host applies it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Upper bound for a single sync dispatch.
    pub dispatch_timeout_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            origin: Url::parse(DEFAULT_ORIGIN).expect("default origin is a valid URL"),
            version: DEFAULT_VERSION.to_string(),
            static_assets: [
                "/",
                "/manifest.json",
                "/icons/icon-192x192.png",
                "/icons/icon-512x512.png",
                "/fonts/inter-var.woff2",
                "/offline.html",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            offline_page: "/offline.html".to_string(),
            api_patterns: vec![
                r"/api/newsletters".to_string(),
                r"/api/products".to_string(),
                r"/api/user".to_string(),
            ],
            product_path: "/products/".to_string(),
            notifications: NotificationDefaults::default(),
            sync: SyncSettings::default(),
        }
    }
}

impl Default for NotificationDefaults {
    fn default() -> Self {
        Self {
            title: "3D Maker Hub".to_string(),
            body: "Tienes nuevas actualizaciones".to_string(),
            icon: "/icons/icon-192x192.png".to_string(),
            badge: "/icons/icon-72x72.png".to_string(),
            vibrate: vec![100, 50, 100],
            primary_key: 1,
            explore_title: "Ver detalles".to_string(),
            close_title: "Cerrar".to_string(),
        }
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 30_000,
            max_delay_ms: 300_000,
            dispatch_timeout_ms: 300_000,
        }
    }
}

impl SyncSettings {
    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy {
            max_attempts: self.max_attempts,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            backoff_multiplier: 2.0,
        }
    }

    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_millis(self.dispatch_timeout_ms)
    }
}

impl WorkerConfig {
    /// Config for a given version, everything else default.
    pub fn with_version(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            ..Default::default()
        }
    }

    /// Parse a JSON document; missing fields keep their defaults.
    pub fn from_json_str(json: &str) -> makerhub_common::Result<Self> {
        let config: Self = serde_json::from_str(json).config_context("invalid worker config")?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON config file.
    pub fn from_file(path: impl AsRef<Path>) -> makerhub_common::Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json).map_err(|e| {
            MakerHubError::config_with_source(format!("failed to load {}", path.display()), e)
        })
    }

    /// Reject configs the worker cannot run with.
    pub fn validate(&self) -> makerhub_common::Result<()> {
        if self.version.trim().is_empty() || self.version.contains(char::is_whitespace) {
            return Err(MakerHubError::config(format!(
                "version must be a non-empty token, got {:?}",
                self.version
            )));
        }

        if self.origin.cannot_be_a_base() || !matches!(self.origin.scheme(), "http" | "https") {
            return Err(MakerHubError::config(format!(
                "origin must be an http(s) URL, got {}",
                self.origin
            )));
        }

        if !self.static_assets.iter().any(|p| p == &self.offline_page) {
            return Err(MakerHubError::config(format!(
                "offline page {} is not part of the static manifest",
                self.offline_page
            )));
        }

        if !self.product_path.starts_with('/') {
            return Err(MakerHubError::config("product_path must start with '/'"));
        }

        RegexSet::new(&self.api_patterns).config_context("invalid API pattern")?;

        Ok(())
    }

    /// Physical partition names for this version.
    pub fn partition_names(&self) -> PartitionNames {
        PartitionNames::new(&self.version)
    }

    /// Resolve a path (or absolute URL) against the origin.
    pub fn resolve(&self, path: &str) -> Result<Url, url::ParseError> {
        self.origin.join(path)
    }
}
