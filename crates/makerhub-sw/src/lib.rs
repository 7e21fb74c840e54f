//! # MakerHub Offline Worker
//!
//! Offline caching and request interception for the 3D Maker Hub site.
//!
//! ## Features
//!
//! - **Versioned partitions**: `static-*`, `dynamic-*` and `offline-*` caches,
//!   precached on install and rotated on activate
//! - **Request classification**: one strategy per intercepted GET request
//! - **Strategies**: network-first pages and API calls, cache-first assets and
//!   images, with offline page and image placeholder fallbacks
//! - **Background sync**: replay of queued wishlist, newsletter and comment
//!   actions, plus the host-side retry registry
//! - **Push**: notifications from push messages and click routing to windows
//!
//! ## Architecture
//!
//! ```text
//! OfflineWorker (one deployed version)
//!     ├── PartitionManager ── install / activate
//!     ├── RequestClassifier ── Strategy
//!     ├── Strategies ──────── Fetcher (network)
//!     │       └── CacheStorage (shared across versions)
//!     │               └── Cache ── Url → CacheEntry
//!     ├── SyncReplayer
//!     ├── NotificationCenter
//!     └── Clients
//!
//! SyncRegistry (host side) ── run_ready ──> OfflineWorker::sync
//! ```

use makerhub_common::MakerHubError;
use makerhub_net::NetError;
use thiserror::Error;

pub mod cache;
pub mod classify;
pub mod clients;
pub mod config;
pub mod partitions;
pub mod push;
pub mod strategy;
pub mod sync;
pub mod worker;

#[cfg(test)]
mod testing;

pub use cache::{Cache, CacheEntry, CacheStorage, PartitionSummary};
pub use classify::{RequestClassifier, Strategy};
pub use clients::{Client, ClientMatchOptions, ClientType, Clients};
pub use config::{NotificationDefaults, SyncSettings, WorkerConfig, DEFAULT_VERSION};
pub use partitions::{ActivateReport, InstallReport, PartitionManager, PartitionNames};
pub use push::{
    Notification, NotificationAction, NotificationCenter, NotificationClick, NotificationOptions,
    PushPayload, AUTO_DISMISS,
};
pub use strategy::{FetchResponse, ResponseSource, Strategies};
pub use sync::{SyncOutcome, SyncRegistry, SyncReplayer, SyncRunReport, SyncTag, SyncTask};
pub use worker::{
    ClickOutcome, EventOutcome, FetchOutcome, OfflineWorker, WorkerEvent, WorkerMessage,
    WorkerState,
};

/// Errors that can occur in worker operations.
#[derive(Error, Debug)]
pub enum ServiceWorkerError {
    #[error("Install failed: {0}")]
    InstallFailed(String),

    #[error("Network error: {0}")]
    Network(#[from] NetError),

    #[error("State error: {0}")]
    StateError(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Sync {tag} failed: {reason}")]
    SyncFailed { tag: String, reason: String },

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error(transparent)]
    Common(#[from] MakerHubError),
}

impl ServiceWorkerError {
    /// Whether the host should try the same event again later.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::SyncFailed { .. } => true,
            Self::Common(e) => e.is_retryable(),
            _ => false,
        }
    }
}
