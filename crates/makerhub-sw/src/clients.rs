//! Window clients seen by the worker.

use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use url::Url;

use crate::ServiceWorkerError;

/// A client (controlled page).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Client {
    /// Client ID.
    pub id: String,

    /// Client URL.
    pub url: Url,

    /// Client type.
    pub client_type: ClientType,

    /// Whether focused.
    pub focused: bool,

    /// Version of the worker controlling the client, if any.
    pub controller: Option<String>,
}

/// Client type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClientType {
    #[default]
    Window,
    Worker,
    All,
}

impl Client {
    /// An uncontrolled window at `url`.
    pub fn window(url: Url) -> Self {
        Self {
            id: next_client_id(),
            url,
            client_type: ClientType::Window,
            focused: false,
            controller: None,
        }
    }

    pub fn is_controlled(&self) -> bool {
        self.controller.is_some()
    }
}

/// Options for [`Clients::match_all`].
#[derive(Debug, Clone, Default)]
pub struct ClientMatchOptions {
    pub include_uncontrolled: bool,
    pub client_type: ClientType,
}

/// Clients API.
///
/// Shared by every version of the worker on an origin. The version that
/// last claimed the clients is the active one.
#[derive(Debug, Default)]
pub struct Clients {
    clients: IndexMap<String, Client>,
    active_version: Option<String>,
}

impl Clients {
    /// Create new clients manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a client by ID.
    pub fn get(&self, id: &str) -> Option<&Client> {
        self.clients.get(id)
    }

    /// Version that controls the clients, set by [`Clients::claim`].
    pub fn active_version(&self) -> Option<&str> {
        self.active_version.as_deref()
    }

    /// Clients in the order they appeared.
    pub fn match_all(&self, options: &ClientMatchOptions) -> Vec<&Client> {
        self.clients
            .values()
            .filter(|c| options.include_uncontrolled || c.is_controlled())
            .filter(|c| match options.client_type {
                ClientType::All => true,
                t => c.client_type == t,
            })
            .collect()
    }

    /// Focus a window, unfocusing every other one.
    pub fn focus(&mut self, id: &str) -> Result<Client, ServiceWorkerError> {
        match self.clients.get(id) {
            None => return Err(ServiceWorkerError::StateError(format!("no client {id}"))),
            Some(c) if c.client_type != ClientType::Window => {
                return Err(ServiceWorkerError::StateError(
                    "Can only focus window clients".to_string(),
                ));
            }
            Some(_) => {}
        }

        let mut focused = None;
        for client in self.clients.values_mut() {
            client.focused = client.id == id;
            if client.focused {
                focused = Some(client.clone());
            }
        }
        focused.ok_or_else(|| ServiceWorkerError::StateError(format!("no client {id}")))
    }

    /// Open a focused window controlled by the active version.
    pub fn open_window(&mut self, url: Url) -> Client {
        for client in self.clients.values_mut() {
            client.focused = false;
        }
        let client = Client {
            focused: true,
            controller: self.active_version.clone(),
            ..Client::window(url)
        };
        self.clients.insert(client.id.clone(), client.clone());
        client
    }

    /// Make `version` the active one and hand it every client.
    ///
    /// Returns the IDs whose controller changed, including clients taken
    /// over from an older version.
    pub fn claim(&mut self, version: &str) -> Vec<String> {
        self.active_version = Some(version.to_string());

        let mut claimed = Vec::new();
        for client in self
            .clients
            .values_mut()
            .filter(|c| c.controller.as_deref() != Some(version))
        {
            client.controller = Some(version.to_string());
            claimed.push(client.id.clone());
        }
        claimed
    }

    /// Add a client.
    pub fn add(&mut self, client: Client) {
        self.clients.insert(client.id.clone(), client);
    }

    /// Remove a client.
    pub fn remove(&mut self, id: &str) -> Option<Client> {
        self.clients.shift_remove(id)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

fn next_client_id() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(1);
    format!("client-{}", COUNTER.fetch_add(1, Ordering::Relaxed))
}
