//! Push messages and the notifications they raise.

use std::time::{Duration, Instant};

use chrono::Utc;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};
use url::Url;

use crate::config::WorkerConfig;

/// Shown notifications are dismissed after this long.
pub const AUTO_DISMISS: Duration = Duration::from_secs(5);

/// Action that opens the product behind a notification.
pub const ACTION_EXPLORE: &str = "explore";

/// Action that only dismisses.
pub const ACTION_CLOSE: &str = "close";

/// JSON body of a push message. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushPayload {
    pub title: Option<String>,
    pub body: Option<String>,
    pub icon: Option<String>,
    pub badge: Option<String>,
    pub image: Option<String>,
    pub tag: Option<String>,
    pub vibrate: Option<Vec<u32>>,
    /// Click target, copied into `data.url`.
    pub url: Option<String>,
    /// Product to open on "explore", copied into `data.productId`.
    pub product_id: Option<Value>,
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl PushPayload {
    pub fn parse(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// A notification button.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationAction {
    pub action: String,
    pub title: String,
}

/// Display options of a notification.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationOptions {
    pub body: String,
    pub icon: String,
    pub badge: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub vibrate: Vec<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    pub data: Map<String, Value>,
    pub actions: Vec<NotificationAction>,
}

/// Title and options for a push message.
///
/// A missing or empty payload shows the default text. A malformed payload
/// does too, after logging a warning.
pub fn notification_for_push(
    config: &WorkerConfig,
    payload: Option<&[u8]>,
) -> (String, NotificationOptions) {
    let defaults = &config.notifications;
    let payload = match payload.filter(|bytes| !bytes.is_empty()) {
        None => PushPayload::default(),
        Some(bytes) => PushPayload::parse(bytes).unwrap_or_else(|error| {
            warn!(%error, "Malformed push payload, showing default notification");
            PushPayload::default()
        }),
    };

    let mut data = Map::new();
    data.insert("dateOfArrival".into(), Value::from(Utc::now().timestamp_millis()));
    data.insert("primaryKey".into(), Value::from(defaults.primary_key));
    data.extend(payload.data);
    if let Some(url) = payload.url {
        data.insert("url".into(), Value::String(url));
    }
    if let Some(product_id) = payload.product_id {
        data.insert("productId".into(), product_id);
    }

    let options = NotificationOptions {
        body: payload.body.unwrap_or_else(|| defaults.body.clone()),
        icon: payload.icon.unwrap_or_else(|| defaults.icon.clone()),
        badge: payload.badge.unwrap_or_else(|| defaults.badge.clone()),
        image: payload.image,
        vibrate: payload.vibrate.unwrap_or_else(|| defaults.vibrate.clone()),
        tag: payload.tag,
        data,
        actions: vec![
            NotificationAction {
                action: ACTION_EXPLORE.into(),
                title: defaults.explore_title.clone(),
            },
            NotificationAction {
                action: ACTION_CLOSE.into(),
                title: defaults.close_title.clone(),
            },
        ],
    };

    (payload.title.unwrap_or_else(|| defaults.title.clone()), options)
}

/// Where a click on `notification` should take the user, if anywhere.
///
/// `data.url` wins, then the product page for "explore" clicks carrying a
/// `data.productId`, then the site root.
pub fn click_target(
    config: &WorkerConfig,
    action: Option<&str>,
    notification: &Notification,
) -> Result<Option<Url>, url::ParseError> {
    if action == Some(ACTION_CLOSE) {
        return Ok(None);
    }

    let data = &notification.options.data;
    if let Some(url) = data.get("url").and_then(Value::as_str) {
        return config.resolve(url).map(Some);
    }

    if action == Some(ACTION_EXPLORE) {
        let product_id = match data.get("productId") {
            Some(Value::String(id)) if !id.is_empty() => Some(id.clone()),
            Some(Value::Number(id)) => Some(id.to_string()),
            _ => None,
        };
        if let Some(id) = product_id {
            return config
                .resolve(&format!("{}{}", config.product_path, id))
                .map(Some);
        }
    }

    config.resolve("/").map(Some)
}

/// A notification currently on screen.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub id: u64,
    pub title: String,
    pub options: NotificationOptions,
    pub shown_at: Instant,
}

/// A click on a notification or one of its actions.
#[derive(Debug, Clone)]
pub struct NotificationClick {
    /// `None` for a click on the notification body.
    pub action: Option<String>,
    pub notification: Notification,
}

impl NotificationClick {
    pub fn new(action: Option<&str>, notification: Notification) -> Self {
        Self {
            action: action.filter(|a| !a.is_empty()).map(String::from),
            notification,
        }
    }
}

/// Notifications shown by the worker.
#[derive(Debug, Default)]
pub struct NotificationCenter {
    shown: IndexMap<u64, Notification>,
    next_id: u64,
}

impl NotificationCenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Show a notification, replacing any other one with the same tag.
    pub fn show(&mut self, title: String, options: NotificationOptions, now: Instant) -> Notification {
        if let Some(tag) = &options.tag {
            self.shown.retain(|_, n| n.options.tag.as_ref() != Some(tag));
        }

        self.next_id += 1;
        let notification = Notification {
            id: self.next_id,
            title,
            options,
            shown_at: now,
        };
        debug!(id = notification.id, title = %notification.title, "Showing notification");
        self.shown.insert(notification.id, notification.clone());
        notification
    }

    pub fn close(&mut self, id: u64) -> Option<Notification> {
        self.shown.shift_remove(&id)
    }

    pub fn get(&self, id: u64) -> Option<&Notification> {
        self.shown.get(&id)
    }

    /// Drop notifications older than [`AUTO_DISMISS`].
    pub fn prune_expired(&mut self, now: Instant) -> Vec<Notification> {
        let expired: Vec<u64> = self
            .shown
            .values()
            .filter(|n| now.saturating_duration_since(n.shown_at) >= AUTO_DISMISS)
            .map(|n| n.id)
            .collect();

        expired
            .into_iter()
            .filter_map(|id| self.shown.shift_remove(&id))
            .collect()
    }

    /// Oldest first.
    pub fn active(&self) -> Vec<&Notification> {
        self.shown.values().collect()
    }
}
