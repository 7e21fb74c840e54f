//! Scripted in-memory network for tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use hashbrown::HashMap;
use http::header::CONTENT_TYPE;
use http::{HeaderValue, Method, StatusCode};
use makerhub_net::{Fetcher, NetError, Request, Response};
use url::Url;

use crate::config::WorkerConfig;

#[derive(Clone)]
struct Route {
    status: StatusCode,
    content_type: &'static str,
    body: Bytes,
}

/// A fake origin that can be taken offline and records every request.
pub(crate) struct MockNetwork {
    routes: Mutex<HashMap<String, Route>>,
    online: AtomicBool,
    log: Mutex<Vec<(Method, Url)>>,
}

impl MockNetwork {
    pub const OFFLINE_PAGE: &'static str = "<html><body>Sin conexión</body></html>";

    pub fn new() -> Self {
        Self {
            routes: Mutex::new(HashMap::new()),
            online: AtomicBool::new(true),
            log: Mutex::new(Vec::new()),
        }
    }

    /// Serves every static manifest entry.
    pub fn with_site() -> Self {
        let network = Self::new();
        for path in WorkerConfig::default().static_assets {
            let body = if path == "/offline.html" {
                Self::OFFLINE_PAGE.to_string()
            } else {
                format!("asset {path}")
            };
            network.route(&path, StatusCode::OK, "text/plain", body);
        }
        network
    }

    /// Absolute URL on the default origin.
    pub fn url(path: &str) -> Url {
        WorkerConfig::default().resolve(path).unwrap()
    }

    pub fn route(
        &self,
        path: &str,
        status: StatusCode,
        content_type: &'static str,
        body: impl Into<Bytes>,
    ) {
        self.routes.lock().unwrap().insert(
            Self::url(path).to_string(),
            Route {
                status,
                content_type,
                body: body.into(),
            },
        );
    }

    pub fn remove(&self, path: &str) {
        self.routes.lock().unwrap().remove(Self::url(path).as_str());
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub fn requests(&self) -> Vec<(Method, Url)> {
        self.log.lock().unwrap().clone()
    }

    /// Requests that reached (or tried to reach) `path`.
    pub fn hits(&self, path: &str) -> usize {
        let url = Self::url(path);
        self.log.lock().unwrap().iter().filter(|(_, u)| *u == url).count()
    }
}

#[async_trait]
impl Fetcher for MockNetwork {
    async fn fetch(&self, request: Request) -> Result<Response, NetError> {
        self.log
            .lock()
            .unwrap()
            .push((request.method.clone(), request.url.clone()));

        if !self.online.load(Ordering::SeqCst) {
            return Err(NetError::Offline(request.url.to_string()));
        }

        let route = self.routes.lock().unwrap().get(request.url.as_str()).cloned();
        Ok(match route {
            Some(route) => Response::new(request.url, route.status)
                .with_header(CONTENT_TYPE, HeaderValue::from_static(route.content_type))
                .with_body(route.body),
            None => Response::new(request.url, StatusCode::NOT_FOUND),
        })
    }
}
