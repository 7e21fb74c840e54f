//! Versioned partition lifecycle: precache on install, evict stale versions on activate.

use std::sync::Arc;

use makerhub_net::{Fetcher, Request, Response};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use url::Url;

use crate::cache::CacheStorage;
use crate::config::WorkerConfig;
use crate::ServiceWorkerError;

/// Physical names of the three partitions belonging to one version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionNames {
    /// The umbrella version, e.g. `v1.0.0`.
    pub version: String,
    pub static_assets: String,
    pub dynamic: String,
    pub offline: String,
}

impl PartitionNames {
    pub fn new(version: &str) -> Self {
        Self {
            version: version.to_string(),
            static_assets: format!("static-{version}"),
            dynamic: format!("dynamic-{version}"),
            offline: format!("offline-{version}"),
        }
    }

    pub fn current(&self) -> [&str; 3] {
        [&self.static_assets, &self.dynamic, &self.offline]
    }

    /// Whether `name` belongs to this version.
    pub fn is_current(&self, name: &str) -> bool {
        self.current().contains(&name)
    }
}

/// Outcome of a successful install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    /// Number of manifest entries written to the static partition.
    pub precached: usize,
}

/// Outcome of activation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivateReport {
    /// Stale partitions that were removed.
    pub deleted: Vec<String>,
}

/// Creates, populates and evicts the partitions of one version.
pub struct PartitionManager {
    names: PartitionNames,
    caches: Arc<RwLock<CacheStorage>>,
    fetcher: Arc<dyn Fetcher>,
    manifest: Vec<Url>,
    offline_url: Url,
}

impl PartitionManager {
    pub fn new(
        config: &WorkerConfig,
        caches: Arc<RwLock<CacheStorage>>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Result<Self, ServiceWorkerError> {
        let manifest = config
            .static_assets
            .iter()
            .map(|path| config.resolve(path))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            names: config.partition_names(),
            caches,
            fetcher,
            manifest,
            offline_url: config.resolve(&config.offline_page)?,
        })
    }

    pub fn names(&self) -> &PartitionNames {
        &self.names
    }

    /// Precache the static manifest and the offline page.
    ///
    /// The static manifest is all-or-nothing: nothing is written unless every
    /// asset came back with a success status.
    pub async fn install(&self) -> Result<InstallReport, ServiceWorkerError> {
        info!(version = %self.names.version, assets = self.manifest.len(), "Precaching static assets");

        let fetched = self.fetch_all(&self.manifest).await?;
        {
            let mut caches = self.caches.write().await;
            caches
                .open(&self.names.static_assets)
                .put_all(self.manifest.iter().zip(fetched.iter()));
        }

        let offline = self.fetch_all(std::slice::from_ref(&self.offline_url)).await?;
        {
            let mut caches = self.caches.write().await;
            caches
                .open(&self.names.offline)
                .put_all(std::iter::once(&self.offline_url).zip(offline.iter()));
        }

        info!(version = %self.names.version, "Install complete");
        Ok(InstallReport {
            precached: fetched.len(),
        })
    }

    /// Delete every partition that does not belong to the current version.
    ///
    /// The current three partitions exist afterwards even if nothing was
    /// written to them yet.
    pub async fn activate(&self) -> ActivateReport {
        let mut caches = self.caches.write().await;
        let mut report = ActivateReport::default();

        for name in caches.keys() {
            if self.names.is_current(&name) {
                continue;
            }
            if caches.delete(&name) {
                debug!(partition = %name, "Deleted stale partition");
                report.deleted.push(name);
            } else {
                warn!(partition = %name, "Failed to delete stale partition");
            }
        }

        for name in self.names.current() {
            caches.open(name);
        }

        info!(
            version = %self.names.version,
            deleted = report.deleted.len(),
            "Partitions activated"
        );
        report
    }

    async fn fetch_all(&self, urls: &[Url]) -> Result<Vec<Response>, ServiceWorkerError> {
        let mut fetched = Vec::with_capacity(urls.len());
        for url in urls {
            let response = self
                .fetcher
                .fetch(Request::get(url.clone()))
                .await
                .map_err(|e| ServiceWorkerError::InstallFailed(format!("{url}: {e}")))?;

            if !response.ok() {
                return Err(ServiceWorkerError::InstallFailed(format!(
                    "{url}: status {}",
                    response.status
                )));
            }
            fetched.push(response);
        }
        Ok(fetched)
    }
}
