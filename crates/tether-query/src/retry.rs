//! Bounded retry around the executor, feeding the cache and query state.
//!
//! `retry + 1` attempts at most. Retryable failures (transport and network)
//! sleep `retry_delay(i)` before retry `i`; everything else returns at once.
//! A 401 invalidates the stored token so the next attempt refreshes it.

use std::sync::Arc;

use serde_json::Value;
use tether_auth::TokenAuthority;
use tracing::{debug, error, warn};

use crate::cache::RequestCache;
use crate::errors::RequestError;
use crate::executor::RequestExecutor;
use crate::fingerprint::QueryFingerprint;
use crate::options::QueryOptions;
use crate::request::RequestSpec;
use crate::state::{QueryRegistry, QueryState, QueryStatus};

/// Drives requests through retries, the cache and the registry.
#[derive(Debug, Clone)]
pub struct RetryOrchestrator {
    executor: Arc<RequestExecutor>,
    cache: Arc<RequestCache>,
    registry: Arc<QueryRegistry>,
    authority: Option<Arc<TokenAuthority>>,
    cache_max_size: usize,
}

impl RetryOrchestrator {
    /// Wire an orchestrator to its collaborators.
    pub fn new(
        executor: Arc<RequestExecutor>,
        cache: Arc<RequestCache>,
        registry: Arc<QueryRegistry>,
        authority: Option<Arc<TokenAuthority>>,
        cache_max_size: usize,
    ) -> Self {
        Self {
            executor,
            cache,
            registry,
            authority,
            cache_max_size,
        }
    }

    /// Run `spec` with caching and retries, without touching query state.
    #[tracing::instrument(skip_all, fields(method = %spec.method, endpoint = %spec.endpoint))]
    pub async fn custom_request(
        &self,
        spec: &RequestSpec,
        options: &QueryOptions,
    ) -> Result<Value, RequestError> {
        ensure_endpoint(spec)?;
        let fingerprint = QueryFingerprint::of(spec);

        if let Some(payload) = self.fresh_payload(&fingerprint, options) {
            return Ok(payload);
        }

        let payload = self.run_with_retry(spec, options).await?;
        self.write_through(fingerprint, &payload, options);
        Ok(payload)
    }

    /// Run `spec` like [`custom_request`](Self::custom_request) and record
    /// every transition on the query's state.
    #[tracing::instrument(skip_all, fields(method = %spec.method, endpoint = %spec.endpoint))]
    pub async fn execute_query(
        &self,
        spec: &RequestSpec,
        options: &QueryOptions,
    ) -> Result<Value, RequestError> {
        ensure_endpoint(spec)?;
        let fingerprint = QueryFingerprint::of(spec);
        let state = self.registry.get_or_create(&fingerprint);

        if !options.enabled {
            debug!(%fingerprint, "query disabled");
            return state.snapshot().payload.ok_or(RequestError::Disabled);
        }

        record(&state, QueryStatus::Loading, None, None);

        if let Some(payload) = self.fresh_payload(&fingerprint, options) {
            record(&state, QueryStatus::Success, Some(payload.clone()), None);
            return Ok(payload);
        }

        match self.run_with_retry(spec, options).await {
            Ok(payload) => {
                self.write_through(fingerprint, &payload, options);
                record(&state, QueryStatus::Success, Some(payload.clone()), None);
                Ok(payload)
            }
            Err(e) => {
                record(&state, QueryStatus::Error, None, Some(e.to_info()));
                Err(e)
            }
        }
    }

    fn fresh_payload(&self, fingerprint: &QueryFingerprint, options: &QueryOptions) -> Option<Value> {
        if !options.cache {
            return None;
        }
        let entry = self.cache.get(fingerprint)?;
        if RequestCache::is_valid(&entry, options.stale_time) {
            debug!(%fingerprint, age = ?entry.age(), "cache hit");
            Some(entry.payload)
        } else {
            None
        }
    }

    fn write_through(&self, fingerprint: QueryFingerprint, payload: &Value, options: &QueryOptions) {
        if !options.cache {
            return;
        }
        self.cache.set(fingerprint, payload.clone());
        let _ = self.cache.evict(self.cache_max_size, options.cache_time);
    }

    async fn run_with_retry(
        &self,
        spec: &RequestSpec,
        options: &QueryOptions,
    ) -> Result<Value, RequestError> {
        let max_attempts = options.max_attempts();
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let err = match self
                .executor
                .execute(spec, options.treat_error_message_as_error)
                .await
            {
                Ok(payload) => return Ok(payload),
                Err(e) => e,
            };

            if err.is_auth_failure() {
                if let Some(authority) = &self.authority {
                    authority.invalidate();
                }
            }

            if !err.is_retryable() {
                return Err(err);
            }
            if attempt >= max_attempts {
                if max_attempts > 1 {
                    error!(attempts = attempt, category = err.category(), error = %err, "retries exhausted");
                }
                return Err(err);
            }

            let delay = options.retry_delay.delay_for(attempt - 1);
            warn!(
                attempt,
                max_attempts,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                category = err.category(),
                error = %err,
                "request failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

fn ensure_endpoint(spec: &RequestSpec) -> Result<(), RequestError> {
    if spec.endpoint.trim().is_empty() {
        return Err(RequestError::Config("endpoint is required".to_string()));
    }
    Ok(())
}

/// Apply a transition. Overlapping requests for one fingerprint are not
/// deduplicated, so a late finisher may find the state already resolved;
/// that update is dropped.
fn record(
    state: &QueryState,
    status: QueryStatus,
    payload: Option<Value>,
    error: Option<tether_core::ErrorInfo>,
) {
    if let Err(e) = state.update_status(status, payload, error) {
        warn!(fingerprint = %state.fingerprint(), error = %e, "query update dropped");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
