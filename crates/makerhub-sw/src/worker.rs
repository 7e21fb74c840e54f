//! The offline worker: lifecycle state and event dispatch.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use bytes::Bytes;
use makerhub_net::{Fetcher, Request};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, error, info};
use url::Url;

use crate::cache::CacheStorage;
use crate::classify::RequestClassifier;
use crate::clients::{Client, ClientMatchOptions, ClientType, Clients};
use crate::config::WorkerConfig;
use crate::partitions::{ActivateReport, InstallReport, PartitionManager, PartitionNames};
use crate::push::{click_target, notification_for_push, Notification, NotificationCenter, NotificationClick};
use crate::strategy::{FetchResponse, Strategies};
use crate::sync::{SyncOutcome, SyncReplayer};
use crate::ServiceWorkerError;

/// Worker lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WorkerState {
    /// Initial state, nothing installed yet.
    #[default]
    Parsed,
    /// Precaching.
    Installing,
    /// Precache done, waiting for activation.
    Installed,
    /// Evicting stale partitions.
    Activating,
    /// Intercepting fetches.
    Activated,
    /// Install failed, or a newer version took over.
    Redundant,
}

/// Events the host delivers to the worker.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    Install,
    Activate,
    Fetch(Request),
    Sync { tag: String },
    Push { data: Option<Bytes> },
    NotificationClick(NotificationClick),
}

/// What the host should do with an intercepted request.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    /// Not intercepted; the host performs the request itself.
    PassThrough,
    Respond(FetchResponse),
}

/// Result of a notification click.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickOutcome {
    Dismissed,
    Focused(Client),
    Opened(Client),
}

/// Result of a dispatched event.
#[derive(Debug, Clone)]
pub enum EventOutcome {
    Installed(InstallReport),
    Activated(ActivateReport),
    Fetch(FetchOutcome),
    Sync(SyncOutcome),
    Notified(Notification),
    Click(ClickOutcome),
}

/// Messages from the worker to its host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerMessage {
    StateChange { version: String, state: WorkerState },
    ControllerChange { client_id: String },
    WindowOpened { client_id: String, url: Url },
    NotificationShown { id: u64, title: String },
}

/// One deployed version of the offline worker.
pub struct OfflineWorker {
    config: WorkerConfig,
    state: RwLock<WorkerState>,
    skip_waiting: AtomicBool,

    /// Shared with other versions of the worker on the same origin.
    caches: Arc<RwLock<CacheStorage>>,
    clients: Arc<RwLock<Clients>>,
    notifications: Arc<RwLock<NotificationCenter>>,

    partitions: PartitionManager,
    classifier: RequestClassifier,
    strategies: Strategies,
    replayer: SyncReplayer,

    event_tx: mpsc::UnboundedSender<WorkerMessage>,
}

impl OfflineWorker {
    /// Worker with its own empty storage.
    pub fn new(
        config: WorkerConfig,
        fetcher: Arc<dyn Fetcher>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<WorkerMessage>), ServiceWorkerError> {
        Self::with_storage(
            config,
            fetcher,
            Arc::new(RwLock::new(CacheStorage::new())),
            Arc::new(RwLock::new(Clients::new())),
        )
    }

    /// Worker sharing partitions and clients with previous versions.
    pub fn with_storage(
        config: WorkerConfig,
        fetcher: Arc<dyn Fetcher>,
        caches: Arc<RwLock<CacheStorage>>,
        clients: Arc<RwLock<Clients>>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<WorkerMessage>), ServiceWorkerError> {
        config.validate()?;
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let worker = Self {
            partitions: PartitionManager::new(&config, caches.clone(), fetcher.clone())?,
            classifier: RequestClassifier::new(&config)?,
            strategies: Strategies::new(&config, caches.clone(), fetcher.clone())?,
            replayer: SyncReplayer::new(fetcher, config.origin.clone()),
            config,
            state: RwLock::new(WorkerState::Parsed),
            skip_waiting: AtomicBool::new(false),
            caches,
            clients,
            notifications: Arc::new(RwLock::new(NotificationCenter::new())),
            event_tx,
        };
        Ok((worker, event_rx))
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn partition_names(&self) -> &PartitionNames {
        self.partitions.names()
    }

    /// Current state. An activated worker whose clients were claimed by
    /// another version becomes redundant here.
    pub async fn state(&self) -> WorkerState {
        let state = *self.state.read().await;
        if state == WorkerState::Activated && self.superseded().await {
            return self.retire().await;
        }
        state
    }

    /// Set by a successful install so activation does not wait for old tabs.
    pub fn skips_waiting(&self) -> bool {
        self.skip_waiting.load(Ordering::SeqCst)
    }

    pub fn caches(&self) -> Arc<RwLock<CacheStorage>> {
        self.caches.clone()
    }

    pub fn clients(&self) -> Arc<RwLock<Clients>> {
        self.clients.clone()
    }

    pub fn notifications(&self) -> Arc<RwLock<NotificationCenter>> {
        self.notifications.clone()
    }

    /// Dispatch one event.
    pub async fn handle(&self, event: WorkerEvent) -> Result<EventOutcome, ServiceWorkerError> {
        match event {
            WorkerEvent::Install => self.install().await.map(EventOutcome::Installed),
            WorkerEvent::Activate => self.activate().await.map(EventOutcome::Activated),
            WorkerEvent::Fetch(request) => self.fetch(request).await.map(EventOutcome::Fetch),
            WorkerEvent::Sync { tag } => self.sync(&tag).await.map(EventOutcome::Sync),
            WorkerEvent::Push { data } => Ok(EventOutcome::Notified(self.push(data.as_deref()).await)),
            WorkerEvent::NotificationClick(click) => {
                self.notification_click(click).await.map(EventOutcome::Click)
            }
        }
    }

    /// Precache this version. Failure makes the worker redundant.
    pub async fn install(&self) -> Result<InstallReport, ServiceWorkerError> {
        self.transition(WorkerState::Parsed, WorkerState::Installing).await?;

        match self.partitions.install().await {
            Ok(report) => {
                self.skip_waiting.store(true, Ordering::SeqCst);
                self.set_state(WorkerState::Installed).await;
                Ok(report)
            }
            Err(e) => {
                error!(version = %self.config.version, error = %e, "Install failed");
                self.set_state(WorkerState::Redundant).await;
                Err(e)
            }
        }
    }

    /// Evict stale partitions and take control of open clients.
    pub async fn activate(&self) -> Result<ActivateReport, ServiceWorkerError> {
        self.transition(WorkerState::Installed, WorkerState::Activating).await?;

        let report = self.partitions.activate().await;

        let claimed = self.clients.write().await.claim(&self.config.version);
        for client_id in claimed {
            let _ = self.event_tx.send(WorkerMessage::ControllerChange { client_id });
        }

        self.set_state(WorkerState::Activated).await;
        Ok(report)
    }

    /// Route a request through its strategy.
    pub async fn fetch(&self, request: Request) -> Result<FetchOutcome, ServiceWorkerError> {
        if self.state().await != WorkerState::Activated {
            return Ok(FetchOutcome::PassThrough);
        }

        let Some(strategy) = self.classifier.classify(&request) else {
            return Ok(FetchOutcome::PassThrough);
        };

        debug!(url = %request.url, strategy = strategy.as_str(), "Intercepted fetch");
        self.strategies
            .handle(strategy, request)
            .await
            .map(FetchOutcome::Respond)
    }

    pub async fn sync(&self, tag: &str) -> Result<SyncOutcome, ServiceWorkerError> {
        self.replayer.replay(tag).await
    }

    /// Always shows exactly one notification, after dismissing expired ones.
    pub async fn push(&self, data: Option<&[u8]>) -> Notification {
        let (title, options) = notification_for_push(&self.config, data);
        let notification = {
            let mut notifications = self.notifications.write().await;
            let now = tokio::time::Instant::now().into_std();
            notifications.prune_expired(now);
            notifications.show(title, options, now)
        };

        let _ = self.event_tx.send(WorkerMessage::NotificationShown {
            id: notification.id,
            title: notification.title.clone(),
        });
        notification
    }

    /// Close the notification, then focus or open the target window.
    pub async fn notification_click(
        &self,
        click: NotificationClick,
    ) -> Result<ClickOutcome, ServiceWorkerError> {
        {
            let mut notifications = self.notifications.write().await;
            notifications.prune_expired(tokio::time::Instant::now().into_std());
            notifications.close(click.notification.id);
        }

        let Some(target) = click_target(&self.config, click.action.as_deref(), &click.notification)?
        else {
            return Ok(ClickOutcome::Dismissed);
        };

        let mut clients = self.clients.write().await;
        let windows = ClientMatchOptions {
            include_uncontrolled: true,
            client_type: ClientType::Window,
        };
        let existing = clients
            .match_all(&windows)
            .into_iter()
            .find(|c| c.url == target)
            .map(|c| c.id.clone());
        if let Some(id) = existing {
            return clients.focus(&id).map(ClickOutcome::Focused);
        }

        let client = clients.open_window(target);
        info!(url = %client.url, "Opened window from notification");
        let _ = self.event_tx.send(WorkerMessage::WindowOpened {
            client_id: client.id.clone(),
            url: client.url.clone(),
        });
        Ok(ClickOutcome::Opened(client))
    }

    /// Move from `from` to `to` under one write guard.
    async fn transition(&self, from: WorkerState, to: WorkerState) -> Result<(), ServiceWorkerError> {
        {
            let mut state = self.state.write().await;
            if *state != from {
                return Err(ServiceWorkerError::StateError(format!(
                    "cannot move to {to:?} from {:?}",
                    *state
                )));
            }
            *state = to;
        }
        self.announce(to);
        Ok(())
    }

    async fn superseded(&self) -> bool {
        self.clients.read().await.active_version() != Some(self.config.version.as_str())
    }

    async fn retire(&self) -> WorkerState {
        if self
            .transition(WorkerState::Activated, WorkerState::Redundant)
            .await
            .is_ok()
        {
            info!(version = %self.config.version, "Superseded by a newer version");
        }
        *self.state.read().await
    }

    async fn set_state(&self, state: WorkerState) {
        *self.state.write().await = state;
        self.announce(state);
    }

    fn announce(&self, state: WorkerState) {
        debug!(version = %self.config.version, ?state, "Worker state changed");
        let _ = self.event_tx.send(WorkerMessage::StateChange {
            version: self.config.version.clone(),
            state,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncSettings;
    use crate::push::AUTO_DISMISS;
    use crate::strategy::ResponseSource;
    use crate::sync::SyncRegistry;
    use crate::testing::MockNetwork;
    use http::{Method, StatusCode};
    use makerhub_net::Destination;
    use std::time::{Duration, Instant};

    async fn activated(network: &Arc<MockNetwork>, version: &str) -> OfflineWorker {
        let (worker, _rx) =
            OfflineWorker::new(WorkerConfig::with_version(version), network.clone()).unwrap();
        worker.install().await.unwrap();
        worker.activate().await.unwrap();
        worker
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<WorkerMessage>) -> Vec<WorkerMessage> {
        let mut messages = Vec::new();
        while let Ok(message) = rx.try_recv() {
            messages.push(message);
        }
        messages
    }

    #[tokio::test]
    async fn test_lifecycle_states() {
        let network = Arc::new(MockNetwork::with_site());
        let (worker, mut rx) =
            OfflineWorker::new(WorkerConfig::with_version("life-1"), network).unwrap();
        assert_eq!(worker.state().await, WorkerState::Parsed);

        worker.handle(WorkerEvent::Install).await.unwrap();
        assert!(worker.skips_waiting());
        worker.handle(WorkerEvent::Activate).await.unwrap();

        let states: Vec<WorkerState> = drain(&mut rx)
            .into_iter()
            .filter_map(|m| match m {
                WorkerMessage::StateChange { state, .. } => Some(state),
                _ => None,
            })
            .collect();
        assert_eq!(
            states,
            vec![
                WorkerState::Installing,
                WorkerState::Installed,
                WorkerState::Activating,
                WorkerState::Activated
            ]
        );
        assert!(worker.activate().await.is_err());
    }

    #[tokio::test]
    async fn test_failed_install_is_redundant() {
        let network = Arc::new(MockNetwork::with_site());
        network.remove("/manifest.json");
        let (worker, _rx) =
            OfflineWorker::new(WorkerConfig::with_version("broken-1"), network).unwrap();

        assert!(worker.install().await.is_err());
        assert_eq!(worker.state().await, WorkerState::Redundant);
        assert!(!worker.skips_waiting());
        assert!(worker.activate().await.is_err());
    }

    #[tokio::test]
    async fn test_fetch_passes_through_until_activated() {
        let network = Arc::new(MockNetwork::with_site());
        let (worker, _rx) =
            OfflineWorker::new(WorkerConfig::with_version("early-1"), network.clone()).unwrap();

        let outcome = worker.fetch(Request::get(MockNetwork::url("/manifest.json"))).await.unwrap();
        assert!(matches!(outcome, FetchOutcome::PassThrough));
    }

    #[tokio::test]
    async fn test_non_get_passes_through() {
        let network = Arc::new(MockNetwork::with_site());
        let worker = activated(&network, "post-1").await;
        let before = network.requests().len();

        let request = Request::post(MockNetwork::url("/api/products"), Bytes::from_static(b"{}"));
        let outcome = worker.fetch(request).await.unwrap();

        assert!(matches!(outcome, FetchOutcome::PassThrough));
        assert_eq!(network.requests().len(), before);
    }

    #[tokio::test]
    async fn test_static_hits_after_install_without_network() {
        let network = Arc::new(MockNetwork::with_site());
        let worker = activated(&network, "static-hits").await;
        network.set_online(false);

        for path in WorkerConfig::default().static_assets {
            let outcome = worker.fetch(Request::get(MockNetwork::url(&path))).await.unwrap();
            let FetchOutcome::Respond(response) = outcome else {
                panic!("{path} was not intercepted");
            };
            assert_eq!(response.source, ResponseSource::Cache, "{path}");
        }
    }

    #[tokio::test]
    async fn test_offline_navigation_scenarios() {
        let network = Arc::new(MockNetwork::with_site());
        network.route("/blog/benchy", StatusCode::OK, "text/html", "<h1>Benchy</h1>");
        let worker = activated(&network, "nav-1").await;

        worker
            .fetch(Request::navigate(MockNetwork::url("/blog/benchy")))
            .await
            .unwrap();
        network.set_online(false);

        let Ok(FetchOutcome::Respond(seen)) =
            worker.fetch(Request::navigate(MockNetwork::url("/blog/benchy"))).await
        else {
            panic!("navigation not intercepted");
        };
        assert_eq!(seen.response.text().unwrap(), "<h1>Benchy</h1>");

        let Ok(FetchOutcome::Respond(unseen)) =
            worker.fetch(Request::navigate(MockNetwork::url("/blog/unseen"))).await
        else {
            panic!("navigation not intercepted");
        };
        assert_eq!(unseen.response.text().unwrap(), MockNetwork::OFFLINE_PAGE);
    }

    #[tokio::test]
    async fn test_offline_image_placeholder() {
        let network = Arc::new(MockNetwork::with_site());
        let worker = activated(&network, "img-1").await;
        network.set_online(false);

        let request = Request::get(MockNetwork::url("/prints/benchy.jpg")).destination(Destination::Image);
        let Ok(FetchOutcome::Respond(response)) = worker.fetch(request).await else {
            panic!("image not intercepted");
        };
        assert_eq!(response.source, ResponseSource::Placeholder);
        assert_eq!(response.response.header("content-type"), Some("image/svg+xml"));
    }

    #[tokio::test]
    async fn test_version_rotation_evicts_old_partitions() {
        let network = Arc::new(MockNetwork::with_site());
        let caches = Arc::new(RwLock::new(CacheStorage::new()));
        let clients = Arc::new(RwLock::new(Clients::new()));

        let (v1, _rx1) = OfflineWorker::with_storage(
            WorkerConfig::with_version("v1.0.0"),
            network.clone(),
            caches.clone(),
            clients.clone(),
        )
        .unwrap();
        v1.install().await.unwrap();
        v1.activate().await.unwrap();

        let (v2, _rx2) = OfflineWorker::with_storage(
            WorkerConfig::with_version("v2.0.0"),
            network.clone(),
            caches.clone(),
            clients,
        )
        .unwrap();
        v2.install().await.unwrap();
        let report = v2.activate().await.unwrap();

        assert_eq!(report.deleted.len(), 3);
        let mut names = caches.read().await.keys();
        names.sort();
        assert_eq!(names, vec!["dynamic-v2.0.0", "offline-v2.0.0", "static-v2.0.0"]);
        assert_eq!(v2.partition_names().static_assets, "static-v2.0.0");
    }

    #[tokio::test]
    async fn test_superseded_version_retires_and_hands_over_clients() {
        let network = Arc::new(MockNetwork::with_site());
        network.route("/blog", StatusCode::OK, "text/html", "<h1>Blog</h1>");
        let caches = Arc::new(RwLock::new(CacheStorage::new()));
        let clients = Arc::new(RwLock::new(Clients::new()));
        let tab = Client::window(MockNetwork::url("/blog"));
        let tab_id = tab.id.clone();
        clients.write().await.add(tab);

        let (v1, mut rx1) = OfflineWorker::with_storage(
            WorkerConfig::with_version("v1.0.0"),
            network.clone(),
            caches.clone(),
            clients.clone(),
        )
        .unwrap();
        v1.install().await.unwrap();
        v1.activate().await.unwrap();
        drain(&mut rx1);

        let (v2, mut rx2) = OfflineWorker::with_storage(
            WorkerConfig::with_version("v2.0.0"),
            network.clone(),
            caches.clone(),
            clients.clone(),
        )
        .unwrap();
        v2.install().await.unwrap();
        v2.activate().await.unwrap();

        assert!(drain(&mut rx2).contains(&WorkerMessage::ControllerChange {
            client_id: tab_id.clone()
        }));
        let controller = clients.read().await.get(&tab_id).unwrap().controller.clone();
        assert_eq!(controller.as_deref(), Some("v2.0.0"));

        let outcome = v1.fetch(Request::navigate(MockNetwork::url("/blog"))).await.unwrap();
        assert!(matches!(outcome, FetchOutcome::PassThrough));
        assert_eq!(v1.state().await, WorkerState::Redundant);
        assert!(drain(&mut rx1).contains(&WorkerMessage::StateChange {
            version: "v1.0.0".into(),
            state: WorkerState::Redundant,
        }));

        let mut names = caches.read().await.keys();
        names.sort();
        assert_eq!(names, vec!["dynamic-v2.0.0", "offline-v2.0.0", "static-v2.0.0"]);
        assert_eq!(v2.state().await, WorkerState::Activated);
    }

    #[tokio::test]
    async fn test_concurrent_installs_run_once() {
        let network = Arc::new(MockNetwork::with_site());
        let (worker, mut rx) =
            OfflineWorker::new(WorkerConfig::with_version("twice-1"), network.clone()).unwrap();

        let (first, second) = tokio::join!(worker.install(), worker.install());

        assert_eq!([first.is_ok(), second.is_ok()].iter().filter(|ok| **ok).count(), 1);
        assert_eq!(worker.state().await, WorkerState::Installed);
        assert_eq!(network.hits("/manifest.json"), 1);
        let installing = drain(&mut rx)
            .into_iter()
            .filter(|m| {
                matches!(m, WorkerMessage::StateChange { state: WorkerState::Installing, .. })
            })
            .count();
        assert_eq!(installing, 1);
    }

    #[tokio::test]
    async fn test_activate_claims_open_clients() {
        let network = Arc::new(MockNetwork::with_site());
        let (worker, mut rx) =
            OfflineWorker::new(WorkerConfig::with_version("claim-1"), network).unwrap();
        let tab = Client::window(MockNetwork::url("/"));
        let tab_id = tab.id.clone();
        worker.clients().write().await.add(tab);

        worker.install().await.unwrap();
        worker.activate().await.unwrap();

        let clients = worker.clients();
        let tab = clients.read().await.get(&tab_id).cloned().unwrap();
        assert_eq!(tab.controller.as_deref(), Some("claim-1"));
        assert!(drain(&mut rx).contains(&WorkerMessage::ControllerChange { client_id: tab_id }));
    }

    #[tokio::test]
    async fn test_sync_event() {
        let network = Arc::new(MockNetwork::with_site());
        network.route("/api/sync/wishlist", StatusCode::OK, "application/json", "{}");
        let worker = activated(&network, "sync-1").await;

        let outcome = worker
            .handle(WorkerEvent::Sync { tag: "wishlist-sync".into() })
            .await
            .unwrap();

        assert!(matches!(outcome, EventOutcome::Sync(SyncOutcome::Replayed(_))));
        let posts: Vec<_> = network
            .requests()
            .into_iter()
            .filter(|(method, _)| *method == Method::POST)
            .collect();
        assert_eq!(posts, vec![(Method::POST, MockNetwork::url("/api/sync/wishlist"))]);
    }

    #[tokio::test]
    async fn test_push_then_explore_click_opens_product() {
        let network = Arc::new(MockNetwork::with_site());
        let (worker, mut rx) =
            OfflineWorker::new(WorkerConfig::with_version("push-1"), network).unwrap();

        let outcome = worker
            .handle(WorkerEvent::Push {
                data: Some(Bytes::from_static(br#"{"body":"Nuevo modelo","productId":"abc"}"#)),
            })
            .await
            .unwrap();
        let EventOutcome::Notified(notification) = outcome else {
            panic!("push did not notify");
        };
        assert_eq!(notification.title, "3D Maker Hub");
        assert_eq!(worker.notifications().read().await.active().len(), 1);

        let click = NotificationClick::new(Some("explore"), notification);
        let outcome = worker.notification_click(click).await.unwrap();

        let ClickOutcome::Opened(client) = outcome else {
            panic!("expected a new window");
        };
        assert_eq!(client.url.path(), "/products/abc");
        assert!(worker.notifications().read().await.active().is_empty());

        let opened: Vec<_> = drain(&mut rx)
            .into_iter()
            .filter(|m| matches!(m, WorkerMessage::WindowOpened { .. }))
            .collect();
        assert_eq!(opened.len(), 1);
    }

    #[tokio::test]
    async fn test_click_focuses_existing_window() {
        let network = Arc::new(MockNetwork::with_site());
        let (worker, _rx) =
            OfflineWorker::new(WorkerConfig::with_version("focus-1"), network).unwrap();
        let tab = Client::window(MockNetwork::url("/products/abc"));
        worker.clients().write().await.add(tab.clone());

        let notification = worker.push(Some(br#"{"productId":"abc"}"#)).await;
        let outcome = worker
            .notification_click(NotificationClick::new(Some("explore"), notification))
            .await
            .unwrap();

        assert!(matches!(outcome, ClickOutcome::Focused(ref c) if c.id == tab.id && c.focused));
        assert_eq!(worker.clients().read().await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_notifications_are_dismissed() {
        let network = Arc::new(MockNetwork::with_site());
        let (worker, _rx) =
            OfflineWorker::new(WorkerConfig::with_version("dismiss-1"), network).unwrap();

        worker.push(None).await;
        tokio::time::advance(Duration::from_millis(5200)).await;
        let fresh = worker.push(Some(br#"{"title":"Nuevo"}"#)).await;

        let notifications = worker.notifications();
        let active: Vec<u64> = notifications.read().await.active().iter().map(|n| n.id).collect();
        assert_eq!(active, vec![fresh.id]);

        let stale = worker.push(None).await;
        tokio::time::advance(AUTO_DISMISS).await;
        worker
            .notification_click(NotificationClick::new(Some("close"), stale))
            .await
            .unwrap();
        assert!(notifications.read().await.active().is_empty());
    }

    #[tokio::test]
    async fn test_close_action_only_dismisses() {
        let network = Arc::new(MockNetwork::with_site());
        let (worker, _rx) =
            OfflineWorker::new(WorkerConfig::with_version("close-1"), network).unwrap();

        let notification = worker.push(None).await;
        let outcome = worker
            .notification_click(NotificationClick::new(Some("close"), notification))
            .await
            .unwrap();

        assert_eq!(outcome, ClickOutcome::Dismissed);
        assert!(worker.clients().read().await.is_empty());
        assert!(worker.notifications().read().await.active().is_empty());
    }

    #[tokio::test]
    async fn test_registry_replays_when_back_online() {
        let network = Arc::new(MockNetwork::with_site());
        network.route("/api/sync/comments", StatusCode::OK, "application/json", "{}");
        let worker = activated(&network, "registry-1").await;
        let mut registry = SyncRegistry::new(&SyncSettings::default());
        let start = Instant::now();

        registry.set_online(false, start);
        registry.register("comment-sync", start);
        assert!(registry.run_ready(&worker, start).await.is_empty());

        registry.set_online(true, start);
        let report = registry.run_ready(&worker, start).await;

        assert_eq!(report.completed, vec!["comment-sync"]);
        assert!(registry.is_empty());
        assert_eq!(network.hits("/api/sync/comments"), 1);
    }

    #[tokio::test]
    async fn test_registry_backoff_then_discard() {
        let network = Arc::new(MockNetwork::with_site());
        network.route("/api/sync/wishlist", StatusCode::SERVICE_UNAVAILABLE, "text/plain", "");
        let worker = activated(&network, "registry-2").await;
        let mut registry = SyncRegistry::new(&SyncSettings::default());
        let start = Instant::now();
        registry.register("wishlist-sync", start);

        let first = registry.run_ready(&worker, start).await;
        assert_eq!(first.rescheduled, vec![("wishlist-sync".to_string(), Duration::from_secs(30))]);

        // Not due yet.
        assert!(registry.run_ready(&worker, start + Duration::from_secs(10)).await.is_empty());

        let t2 = start + Duration::from_secs(30);
        let second = registry.run_ready(&worker, t2).await;
        assert_eq!(second.rescheduled, vec![("wishlist-sync".to_string(), Duration::from_secs(60))]);

        let third = registry.run_ready(&worker, t2 + Duration::from_secs(60)).await;
        assert_eq!(third.discarded, vec!["wishlist-sync"]);
        assert!(registry.is_empty());
        assert_eq!(network.hits("/api/sync/wishlist"), 3);
    }

    #[tokio::test]
    async fn test_registry_unknown_tag_completes() {
        let network = Arc::new(MockNetwork::with_site());
        let worker = activated(&network, "registry-3").await;
        let mut registry = SyncRegistry::new(&SyncSettings::default());
        let now = Instant::now();
        registry.register("cart-sync", now);

        let report = registry.run_ready(&worker, now).await;
        assert_eq!(report.completed, vec!["cart-sync"]);
    }
}
