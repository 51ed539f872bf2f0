//! Token authority: reuse, single-flight refresh and header preparation.
//!
//! A stored token is reused while it is usable. Otherwise the first caller
//! starts a refresh and parks a shared future in a single-slot handle; every
//! concurrent caller attaches to that future instead of starting its own.
//! Whoever observes the completed future first empties the slot, so the next
//! expiry starts a fresh refresh.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use base64::Engine;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use tether_settings::TetherSettings;
use tracing::{debug, info, warn};

use crate::errors::{AuthError, RefreshFailure};
use crate::refresher::{HttpTokenRefresher, TokenRefresher};
use crate::store::{FileSessionStore, MemorySessionStore, SessionStore};
use crate::token::AuthToken;

type SharedRefresh = Shared<BoxFuture<'static, Result<AuthToken, RefreshFailure>>>;

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Where and how to obtain tokens.
#[derive(Clone)]
pub struct AuthConfig {
    /// Base URL the token endpoint is resolved against.
    pub base_url: String,
    /// Token endpoint relative to `base_url`.
    pub token_endpoint: String,
    /// Account name.
    pub account: String,
    /// Account secret.
    pub secret: String,
    /// Endpoints that never carry an `Authorization` header. The token
    /// endpoint is always treated as public in addition to these.
    pub public_endpoints: Vec<String>,
    /// Seconds subtracted from the server-reported expiry.
    pub expiry_buffer_secs: i64,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("base_url", &self.base_url)
            .field("token_endpoint", &self.token_endpoint)
            .field("account", &self.account)
            .field("public_endpoints", &self.public_endpoints)
            .field("expiry_buffer_secs", &self.expiry_buffer_secs)
            .finish_non_exhaustive()
    }
}

impl AuthConfig {
    /// Config with default endpoints and buffer.
    pub fn new(
        base_url: impl Into<String>,
        account: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        let defaults = tether_settings::AuthSettings::default();
        Self {
            base_url: base_url.into(),
            token_endpoint: defaults.token_endpoint,
            account: account.into(),
            secret: secret.into(),
            public_endpoints: defaults.public_endpoints,
            expiry_buffer_secs: defaults.expiry_buffer_secs,
        }
    }

    /// Config from loaded settings.
    pub fn from_settings(settings: &TetherSettings) -> Self {
        Self {
            base_url: settings.api.base_url.clone(),
            token_endpoint: settings.auth.token_endpoint.clone(),
            account: settings.auth.account.clone(),
            secret: settings.auth.secret.clone(),
            public_endpoints: settings.auth.public_endpoints.clone(),
            expiry_buffer_secs: settings.auth.expiry_buffer_secs,
        }
    }

    /// Absolute URL of the token endpoint.
    pub fn token_url(&self) -> String {
        join_url(&self.base_url, &self.token_endpoint)
    }
}

/// Join a base URL and a relative endpoint with exactly one slash.
pub fn join_url(base: &str, endpoint: &str) -> String {
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        return endpoint.to_string();
    }
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        endpoint.trim_start_matches('/')
    )
}

// ─────────────────────────────────────────────────────────────────────────────
// Authority
// ─────────────────────────────────────────────────────────────────────────────

struct InFlight {
    generation: u64,
    future: SharedRefresh,
}

enum Pending {
    Ready(AuthToken),
    Join(u64, SharedRefresh),
}

/// Owns the bearer token for one client.
pub struct TokenAuthority {
    config: AuthConfig,
    refresher: Arc<dyn TokenRefresher>,
    store: Arc<dyn SessionStore>,
    in_flight: Mutex<Option<InFlight>>,
    generation: AtomicU64,
}

impl std::fmt::Debug for TokenAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenAuthority")
            .field("config", &self.config)
            .field("refreshing", &self.in_flight.lock().is_some())
            .finish_non_exhaustive()
    }
}

impl TokenAuthority {
    /// Create an authority from its parts.
    pub fn new(
        config: AuthConfig,
        refresher: Arc<dyn TokenRefresher>,
        store: Arc<dyn SessionStore>,
    ) -> Self {
        Self {
            config,
            refresher,
            store,
            in_flight: Mutex::new(None),
            generation: AtomicU64::new(0),
        }
    }

    /// Create an authority that refreshes over HTTP with `client`.
    pub fn with_http_refresher(
        config: AuthConfig,
        client: reqwest::Client,
        store: Arc<dyn SessionStore>,
    ) -> Self {
        let refresher = HttpTokenRefresher::new(
            client,
            config.token_url(),
            config.account.clone(),
            config.secret.clone(),
            config.expiry_buffer_secs,
        );
        Self::new(config, Arc::new(refresher), store)
    }

    /// Build from settings, choosing a file store when `auth.sessionFile`
    /// is set and an in-memory store otherwise.
    pub fn from_settings(settings: &TetherSettings, client: reqwest::Client) -> Self {
        let store: Arc<dyn SessionStore> = match &settings.auth.session_file {
            Some(path) => Arc::new(FileSessionStore::new(path)),
            None => Arc::new(MemorySessionStore::new()),
        };
        Self::with_http_refresher(AuthConfig::from_settings(settings), client, store)
    }

    /// The config this authority was built with.
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// The stored token if it is usable right now. Never refreshes.
    pub fn current_token(&self) -> Option<AuthToken> {
        self.store
            .load()
            .filter(|t| t.is_usable(tether_core::now_ms()))
    }

    /// A usable token, refreshing if needed.
    ///
    /// Concurrent callers share one refresh and all see its outcome.
    pub async fn get_token(&self) -> Result<AuthToken, AuthError> {
        if let Some(token) = self.current_token() {
            return Ok(token);
        }

        let (generation, future) = match self.join_refresh() {
            Pending::Ready(token) => return Ok(token),
            Pending::Join(generation, future) => (generation, future),
        };

        let result = future.await;

        {
            let mut slot = self.in_flight.lock();
            if slot.as_ref().is_some_and(|f| f.generation == generation) {
                *slot = None;
            }
        }

        result.map_err(AuthError::from)
    }

    /// Attach to the running refresh or start one.
    fn join_refresh(&self) -> Pending {
        let mut slot = self.in_flight.lock();
        if let Some(in_flight) = slot.as_ref() {
            debug!(generation = in_flight.generation, "joining in-flight token refresh");
            return Pending::Join(in_flight.generation, in_flight.future.clone());
        }

        // A refresh may have finished between the caller's check and the lock
        if let Some(token) = self.current_token() {
            return Pending::Ready(token);
        }

        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let refresher = Arc::clone(&self.refresher);
        let store = Arc::clone(&self.store);

        let future = async move {
            match refresher.refresh().await {
                Ok(token) => {
                    if let Err(e) = store.save(&token) {
                        warn!(error = %e, "failed to persist refreshed token");
                    }
                    info!(generation, expires_at = token.expires_at, "token refreshed");
                    Ok(token)
                }
                Err(e) => {
                    if let Err(clear_err) = store.clear() {
                        warn!(error = %clear_err, "failed to clear session store");
                    }
                    warn!(generation, category = e.category(), error = %e, "token refresh failed");
                    Err(RefreshFailure::from(&e))
                }
            }
        }
        .boxed()
        .shared();

        *slot = Some(InFlight {
            generation,
            future: future.clone(),
        });
        Pending::Join(generation, future)
    }

    /// Whether `target_url` is exempt from authorization.
    pub fn is_public(&self, target_url: &str) -> bool {
        let path = strip_query(target_url).trim_end_matches('/');
        std::iter::once(&self.config.token_endpoint)
            .chain(self.config.public_endpoints.iter())
            .map(|ep| strip_query(ep).trim_matches('/'))
            .filter(|ep| !ep.is_empty())
            .any(|ep| path == ep || path.ends_with(&format!("/{ep}")))
    }

    /// Insert `Authorization: Basic base64(account:token)` into `headers`.
    ///
    /// Returns `false` without touching `headers` for public endpoints and
    /// when no token can be obtained; the request then goes out
    /// unauthenticated.
    #[tracing::instrument(skip_all, fields(target = %target_url))]
    pub async fn prepare_auth_header(&self, headers: &mut HeaderMap, target_url: &str) -> bool {
        if self.is_public(target_url) {
            return false;
        }

        let token = match self.get_token().await {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, "proceeding without authorization");
                return false;
            }
        };

        let credentials = base64::engine::general_purpose::STANDARD
            .encode(format!("{}:{}", self.config.account, token.value));
        match HeaderValue::from_str(&format!("Basic {credentials}")) {
            Ok(mut value) => {
                value.set_sensitive(true);
                let _ = headers.insert(AUTHORIZATION, value);
                true
            }
            Err(e) => {
                warn!(error = %e, "token is not a valid header value");
                false
            }
        }
    }

    /// Drop the stored token so the next request refreshes.
    pub fn invalidate(&self) {
        match self.store.clear() {
            Ok(()) => debug!("session token invalidated"),
            Err(e) => warn!(error = %e, "failed to clear session store"),
        }
    }
}

fn strip_query(url: &str) -> &str {
    url.split(['?', '#']).next().unwrap_or(url)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
