//! Background sync.
//!
//! The worker side replays a queued action with a single POST per tag. The
//! host side ([`SyncRegistry`]) keeps registered tags, waits for
//! connectivity, and reschedules failed replays with exponential backoff.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::HeaderValue;
use indexmap::IndexMap;
use makerhub_common::{with_timeout, BackoffPolicy};
use makerhub_net::{Fetcher, Request};
use tracing::{debug, info, warn};
use url::Url;

use crate::config::SyncSettings;
use crate::worker::OfflineWorker;
use crate::ServiceWorkerError;

/// Tags the worker knows how to replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncTag {
    Wishlist,
    Newsletter,
    Comment,
}

impl SyncTag {
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "wishlist-sync" => Some(Self::Wishlist),
            "newsletter-sync" => Some(Self::Newsletter),
            "comment-sync" => Some(Self::Comment),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Wishlist => "wishlist-sync",
            Self::Newsletter => "newsletter-sync",
            Self::Comment => "comment-sync",
        }
    }

    /// Replay endpoint, relative to the origin.
    pub fn endpoint(&self) -> &'static str {
        match self {
            Self::Wishlist => "/api/sync/wishlist",
            Self::Newsletter => "/api/sync/newsletters",
            Self::Comment => "/api/sync/comments",
        }
    }
}

/// Result of a sync event inside the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Replayed(SyncTag),
    /// Unknown tag; nothing to do.
    Ignored,
}

/// Replays queued actions against the origin.
pub struct SyncReplayer {
    fetcher: Arc<dyn Fetcher>,
    origin: Url,
}

impl SyncReplayer {
    pub fn new(fetcher: Arc<dyn Fetcher>, origin: Url) -> Self {
        Self { fetcher, origin }
    }

    /// One POST, no body. A transport error or non-2xx status fails the
    /// event so the host can reschedule it.
    pub async fn replay(&self, tag: &str) -> Result<SyncOutcome, ServiceWorkerError> {
        let Some(known) = SyncTag::parse(tag) else {
            debug!(tag, "Ignoring unknown sync tag");
            return Ok(SyncOutcome::Ignored);
        };

        let url = self.origin.join(known.endpoint())?;
        let request = Request::post(url, Bytes::new())
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let response = self
            .fetcher
            .fetch(request)
            .await
            .map_err(|e| ServiceWorkerError::SyncFailed {
                tag: tag.to_string(),
                reason: e.to_string(),
            })?;

        if !response.ok() {
            return Err(ServiceWorkerError::SyncFailed {
                tag: tag.to_string(),
                reason: format!("status {}", response.status),
            });
        }

        info!(tag, "Background sync replayed");
        Ok(SyncOutcome::Replayed(known))
    }
}

/// A registered sync task, as the host tracks it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncTask {
    pub tag: String,
    /// Failed dispatches so far.
    pub failures: u32,
    /// Earliest time the next dispatch may run.
    pub next_attempt: Instant,
}

/// What one [`SyncRegistry::run_ready`] pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncRunReport {
    pub completed: Vec<String>,
    /// Tags retried later, with the delay applied.
    pub rescheduled: Vec<(String, Duration)>,
    /// Tags dropped after using up their attempts.
    pub discarded: Vec<String>,
}

impl SyncRunReport {
    pub fn is_empty(&self) -> bool {
        self.completed.is_empty() && self.rescheduled.is_empty() && self.discarded.is_empty()
    }
}

/// Host-side registry of pending sync tags.
#[derive(Debug)]
pub struct SyncRegistry {
    tasks: IndexMap<String, SyncTask>,
    online: bool,
    policy: BackoffPolicy,
    dispatch_timeout: Duration,
}

impl SyncRegistry {
    pub fn new(settings: &SyncSettings) -> Self {
        Self {
            tasks: IndexMap::new(),
            online: true,
            policy: settings.backoff(),
            dispatch_timeout: settings.dispatch_timeout(),
        }
    }

    /// Register `tag`. Registering an existing tag resets its attempts.
    pub fn register(&mut self, tag: &str, now: Instant) {
        let task = SyncTask {
            tag: tag.to_string(),
            failures: 0,
            next_attempt: now,
        };
        if self.tasks.insert(tag.to_string(), task).is_some() {
            debug!(tag, "Sync tag re-registered");
        }
    }

    pub fn unregister(&mut self, tag: &str) -> bool {
        self.tasks.shift_remove(tag).is_some()
    }

    /// Coming back online makes every pending task due immediately.
    pub fn set_online(&mut self, online: bool, now: Instant) {
        if online && !self.online {
            for task in self.tasks.values_mut() {
                task.next_attempt = now;
            }
        }
        self.online = online;
    }

    pub fn is_online(&self) -> bool {
        self.online
    }

    pub fn tags(&self) -> Vec<&str> {
        self.tasks.keys().map(String::as_str).collect()
    }

    pub fn get(&self, tag: &str) -> Option<&SyncTask> {
        self.tasks.get(tag)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Dispatch every due task through `worker`. Does nothing while offline.
    pub async fn run_ready(&mut self, worker: &OfflineWorker, now: Instant) -> SyncRunReport {
        let mut report = SyncRunReport::default();
        if !self.online {
            return report;
        }

        let due: Vec<String> = self
            .tasks
            .values()
            .filter(|t| t.next_attempt <= now)
            .map(|t| t.tag.clone())
            .collect();

        for tag in due {
            let error = match with_timeout(self.dispatch_timeout, worker.sync(&tag)).await {
                Ok(Ok(_)) => None,
                Ok(Err(e)) => Some(e.to_string()),
                Err(e) => Some(e.to_string()),
            };

            let Some(error) = error else {
                self.tasks.shift_remove(&tag);
                report.completed.push(tag);
                continue;
            };

            let Some(task) = self.tasks.get_mut(&tag) else {
                continue;
            };
            task.failures += 1;

            if self.policy.exhausted(task.failures) {
                warn!(tag = %tag, failures = task.failures, %error, "Discarding sync task");
                self.tasks.shift_remove(&tag);
                report.discarded.push(tag);
            } else {
                let delay = self.policy.delay_after_failures(task.failures);
                task.next_attempt = now + delay;
                debug!(tag = %tag, ?delay, %error, "Sync failed, rescheduled");
                report.rescheduled.push((tag, delay));
            }
        }

        report
    }
}
