//! Request classification: pick exactly one strategy per intercepted request.

use http::Method;
use makerhub_net::{Destination, Request};
use regex::RegexSet;

use crate::config::WorkerConfig;
use crate::ServiceWorkerError;

/// Caching strategy applied to an intercepted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// Network-first, falling back to any cached copy, then the offline page.
    Page,
    /// Cache-first, writing network results into the static partition.
    Static,
    /// Network-first, caching only successful responses.
    Api,
    /// Cache-first, with a placeholder graphic when everything fails.
    Image,
    /// Network-first with a read-only cache fallback.
    Generic,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Page => "page",
            Self::Static => "static",
            Self::Api => "api",
            Self::Image => "image",
            Self::Generic => "generic",
        }
    }
}

/// Routes requests to strategies. First match wins.
#[derive(Debug, Clone)]
pub struct RequestClassifier {
    static_paths: Vec<String>,
    api_patterns: RegexSet,
}

impl RequestClassifier {
    pub fn new(config: &WorkerConfig) -> Result<Self, ServiceWorkerError> {
        let api_patterns = RegexSet::new(&config.api_patterns)
            .map_err(|e| ServiceWorkerError::Config(e.to_string()))?;

        Ok(Self {
            static_paths: config.static_assets.clone(),
            api_patterns,
        })
    }

    /// `None` means the request is not intercepted at all.
    pub fn classify(&self, request: &Request) -> Option<Strategy> {
        if request.method != Method::GET {
            return None;
        }

        let strategy = if request.destination == Destination::Document {
            Strategy::Page
        } else if self.is_static_asset(request) {
            Strategy::Static
        } else if self.api_patterns.is_match(request.url.path()) {
            Strategy::Api
        } else if request.destination == Destination::Image {
            Strategy::Image
        } else {
            Strategy::Generic
        };

        Some(strategy)
    }

    /// The root entry only matches the root itself; every URL contains "/".
    fn is_static_asset(&self, request: &Request) -> bool {
        let url = request.url.as_str();
        self.static_paths.iter().any(|path| {
            if path == "/" {
                request.url.path() == "/"
            } else {
                url.contains(path.as_str())
            }
        })
    }
}
