//! Process-wide wiring of clients, cache and resolver.
//!
//! One cache, two clients and one resolver exist per process. They are built
//! here from [`Config`] and handed to the server explicitly.

use std::sync::Arc;

use crate::api_client::ApiClient;
use crate::cache::ResponseCache;
use crate::config::Config;
use crate::error::LookoutError;
use crate::resolver::EntityResolver;

/// Configured default Docs entities.
#[derive(Debug, Clone, Default)]
pub struct Defaults {
    /// Site used when a reference does not match.
    pub site_id: Option<String>,
    /// Collection used when a reference does not match.
    pub collection_id: Option<String>,
}

/// Shared services for tool handlers.
#[derive(Clone)]
pub struct AppContext {
    /// Conversations/mailbox API client.
    pub api: Arc<ApiClient>,
    /// Docs API client.
    pub docs: Arc<ApiClient>,
    /// Site/collection resolver backed by the Docs client.
    pub resolver: Arc<EntityResolver>,
    /// Response cache shared by both clients.
    pub cache: Arc<ResponseCache>,
    /// Default Docs entities.
    pub defaults: Defaults,
    secrets: Arc<Vec<String>>,
}

impl AppContext {
    /// Builds every service from configuration.
    ///
    /// # Errors
    ///
    /// Returns `LookoutError::HttpClient` if an HTTP client fails to initialize.
    pub fn from_config(config: &Config) -> Result<Self, LookoutError> {
        let cache = Arc::new(ResponseCache::new(&config.cache));
        let api = Arc::new(ApiClient::mailbox(config, Arc::clone(&cache))?);
        let docs = Arc::new(ApiClient::docs(config, Arc::clone(&cache))?);
        let resolver = Arc::new(EntityResolver::new(docs.clone(), config.directory_refresh));

        Ok(Self {
            api,
            docs,
            resolver,
            cache,
            defaults: Defaults {
                site_id: config.default_site_id.clone(),
                collection_id: config.default_collection_id.clone(),
            },
            secrets: Arc::new(config.secrets()),
        })
    }

    /// Secrets to strip from anything returned to callers.
    pub fn secrets(&self) -> Vec<&str> {
        self.secrets.iter().map(String::as_str).collect()
    }

    /// Drains both connection pools.
    pub async fn shutdown(&self) {
        tokio::join!(self.api.shutdown(), self.docs.shutdown());
    }
}
