//! The client context: one authority, cache, registry and orchestrator.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tether_auth::TokenAuthority;
use tether_settings::TetherSettings;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::cache::RequestCache;
use crate::errors::RequestError;
use crate::executor::{DEFAULT_ERROR_FIELD, RequestExecutor};
use crate::fingerprint::QueryFingerprint;
use crate::options::QueryOptions;
use crate::request::{HttpMethod, RequestSpec};
use crate::retry::RetryOrchestrator;
use crate::state::{QueryRegistry, QuerySnapshot, Subscription};

/// Default cap on cached responses.
pub const DEFAULT_CACHE_MAX_SIZE: usize = 100;
/// Default period of the background cache cleanup.
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

// ─────────────────────────────────────────────────────────────────────────────
// Builder
// ─────────────────────────────────────────────────────────────────────────────

/// Builder for [`ApiClient`].
#[derive(Debug)]
pub struct ApiClientBuilder {
    base_url: String,
    http: Option<reqwest::Client>,
    authority: Option<Arc<TokenAuthority>>,
    default_options: QueryOptions,
    cache_max_size: usize,
    cleanup_interval: Duration,
    error_field: String,
    request_timeout: Option<Duration>,
}

impl ApiClientBuilder {
    fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            http: None,
            authority: None,
            default_options: QueryOptions::default(),
            cache_max_size: DEFAULT_CACHE_MAX_SIZE,
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
            error_field: DEFAULT_ERROR_FIELD.to_string(),
            request_timeout: None,
        }
    }

    /// Use a preconfigured `reqwest::Client`.
    #[must_use]
    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.http = Some(client);
        self
    }

    /// Authorize requests through `authority`.
    #[must_use]
    pub fn authority(mut self, authority: Arc<TokenAuthority>) -> Self {
        self.authority = Some(authority);
        self
    }

    /// Options used when a call passes none.
    #[must_use]
    pub fn default_options(mut self, options: QueryOptions) -> Self {
        self.default_options = options;
        self
    }

    /// Cap on cached responses.
    #[must_use]
    pub fn cache_max_size(mut self, max: usize) -> Self {
        self.cache_max_size = max;
        self
    }

    /// Period of the task started by [`ApiClient::spawn_cleanup_task`].
    #[must_use]
    pub fn cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }

    /// Name of the error-indicator field in 2xx bodies.
    #[must_use]
    pub fn error_field(mut self, field: impl Into<String>) -> Self {
        self.error_field = field.into();
        self
    }

    /// Timeout for requests that set none of their own.
    #[must_use]
    pub fn request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Finish the client.
    pub fn build(self) -> Result<ApiClient, RequestError> {
        if self.base_url.trim().is_empty() {
            return Err(RequestError::Config("base URL is required".to_string()));
        }
        if self.cache_max_size == 0 {
            return Err(RequestError::Config("cache max size must be positive".to_string()));
        }

        let http = match self.http {
            Some(client) => client,
            None => reqwest::Client::builder().build()?,
        };

        let executor = Arc::new(
            RequestExecutor::new(http, self.base_url, self.authority.clone())
                .with_error_field(self.error_field)
                .with_default_timeout(self.request_timeout),
        );
        let cache = Arc::new(RequestCache::new());
        let registry = Arc::new(QueryRegistry::new());
        let orchestrator = RetryOrchestrator::new(
            executor,
            Arc::clone(&cache),
            Arc::clone(&registry),
            self.authority.clone(),
            self.cache_max_size,
        );

        Ok(ApiClient {
            authority: self.authority,
            cache,
            registry,
            orchestrator,
            default_options: self.default_options,
            cache_max_size: self.cache_max_size,
            cleanup_interval: self.cleanup_interval,
            cleanup_task: Mutex::new(None),
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Client
// ─────────────────────────────────────────────────────────────────────────────

/// Cached, retried access to one HTTP API.
#[derive(Debug)]
pub struct ApiClient {
    authority: Option<Arc<TokenAuthority>>,
    cache: Arc<RequestCache>,
    registry: Arc<QueryRegistry>,
    orchestrator: RetryOrchestrator,
    default_options: QueryOptions,
    cache_max_size: usize,
    cleanup_interval: Duration,
    cleanup_task: Mutex<Option<JoinHandle<()>>>,
}

impl ApiClient {
    /// Start building a client for `base_url`.
    pub fn builder(base_url: impl Into<String>) -> ApiClientBuilder {
        ApiClientBuilder::new(base_url)
    }

    /// Build a client from settings. An authority is attached when
    /// `auth.account` is set.
    pub fn from_settings(settings: &TetherSettings) -> Result<Self, RequestError> {
        let http = reqwest::Client::builder().build()?;
        let api = &settings.api;

        let mut builder = Self::builder(api.base_url.clone())
            .http_client(http.clone())
            .default_options(QueryOptions::from(&api.query))
            .cache_max_size(api.cache_max_size)
            .cleanup_interval(Duration::from_millis(api.cleanup_interval_ms))
            .error_field(api.error_field.clone())
            .request_timeout(api.request_timeout_ms.map(Duration::from_millis));

        if !settings.auth.account.is_empty() {
            builder = builder.authority(Arc::new(TokenAuthority::from_settings(settings, http)));
        }
        builder.build()
    }

    /// The authority, when requests are authorized.
    pub fn authority(&self) -> Option<&Arc<TokenAuthority>> {
        self.authority.as_ref()
    }

    /// The response cache.
    pub fn cache(&self) -> &Arc<RequestCache> {
        &self.cache
    }

    /// The query state registry.
    pub fn registry(&self) -> &Arc<QueryRegistry> {
        &self.registry
    }

    /// Options applied when a call passes none.
    pub fn default_options(&self) -> &QueryOptions {
        &self.default_options
    }

    // ── Requests ────────────────────────────────────────────────────────

    /// Issue `spec` with caching and retries; query state is untouched.
    pub async fn request(
        &self,
        spec: &RequestSpec,
        options: Option<&QueryOptions>,
    ) -> Result<Value, RequestError> {
        self.orchestrator
            .custom_request(spec, options.unwrap_or(&self.default_options))
            .await
    }

    /// Issue `spec` and record the outcome on its query state.
    pub async fn query(
        &self,
        spec: &RequestSpec,
        options: Option<&QueryOptions>,
    ) -> Result<Value, RequestError> {
        self.orchestrator
            .execute_query(spec, options.unwrap_or(&self.default_options))
            .await
    }

    /// `GET endpoint`, with `params` as the query string.
    pub async fn get(&self, endpoint: &str, params: Option<Value>) -> Result<Value, RequestError> {
        self.send(HttpMethod::Get, endpoint, params).await
    }

    /// `POST endpoint` with a JSON body.
    pub async fn post(&self, endpoint: &str, body: Value) -> Result<Value, RequestError> {
        self.send(HttpMethod::Post, endpoint, Some(body)).await
    }

    /// `PUT endpoint` with a JSON body.
    pub async fn put(&self, endpoint: &str, body: Value) -> Result<Value, RequestError> {
        self.send(HttpMethod::Put, endpoint, Some(body)).await
    }

    /// `PATCH endpoint` with a JSON body.
    pub async fn patch(&self, endpoint: &str, body: Value) -> Result<Value, RequestError> {
        self.send(HttpMethod::Patch, endpoint, Some(body)).await
    }

    /// `DELETE endpoint`, with an optional JSON body.
    pub async fn delete(&self, endpoint: &str, body: Option<Value>) -> Result<Value, RequestError> {
        self.send(HttpMethod::Delete, endpoint, body).await
    }

    async fn send(
        &self,
        method: HttpMethod,
        endpoint: &str,
        body: Option<Value>,
    ) -> Result<Value, RequestError> {
        let mut spec = RequestSpec::new(method, endpoint);
        if let Some(body) = body {
            spec = spec.with_json(body);
        }
        self.request(&spec, None).await
    }

    // ── State ───────────────────────────────────────────────────────────

    /// Current state of `spec`'s query, if it was ever queried or observed.
    pub fn query_state(&self, spec: &RequestSpec) -> Option<QuerySnapshot> {
        self.registry
            .get(&QueryFingerprint::of(spec))
            .map(|state| state.snapshot())
    }

    /// Observe `spec`'s query state, creating it idle if needed.
    pub fn subscribe<F>(&self, spec: &RequestSpec, callback: F) -> Subscription
    where
        F: Fn(&QuerySnapshot) + Send + Sync + 'static,
    {
        self.registry
            .get_or_create(&QueryFingerprint::of(spec))
            .subscribe(callback)
    }

    /// Drop the cached response for `spec` so the next call refetches.
    pub fn invalidate_query(&self, spec: &RequestSpec) -> bool {
        let fingerprint = QueryFingerprint::of(spec);
        let removed = self.cache.remove(&fingerprint);
        debug!(%fingerprint, removed, "query invalidated");
        removed
    }

    /// Drop every cached response and query state.
    pub fn clear_cache(&self) {
        self.cache.clear();
        self.registry.clear();
    }

    // ── Lifecycle ───────────────────────────────────────────────────────

    /// Start periodic eviction on the current tokio runtime. Calling it
    /// again while the task runs does nothing.
    pub fn spawn_cleanup_task(&self) {
        let mut slot = self.cleanup_task.lock();
        if slot.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }

        let cache = Arc::clone(&self.cache);
        let max_size = self.cache_max_size;
        let cache_time = self.default_options.cache_time;
        let period = self.cleanup_interval;

        *slot = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            let _ = ticker.tick().await;
            loop {
                let _ = ticker.tick().await;
                let removed = cache.evict(max_size, cache_time);
                debug!(removed, "periodic cache cleanup");
            }
        }));
        info!(interval = ?period, "cache cleanup task started");
    }

    /// Stop the cleanup task and drop all cached data and query state.
    pub fn cleanup(&self) {
        if let Some(handle) = self.cleanup_task.lock().take() {
            handle.abort();
        }
        self.clear_cache();
    }
}

impl Drop for ApiClient {
    fn drop(&mut self) {
        if let Some(handle) = self.cleanup_task.get_mut().take() {
            handle.abort();
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
