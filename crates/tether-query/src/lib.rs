//! # tether-query
//!
//! Request cache, retry loop and observable query state around one HTTP API.
//!
//! Layers, leaves first:
//!
//! - [`cache::RequestCache`]: fingerprint → `{payload, stored_at}` with
//!   staleness checks and bounded eviction
//! - [`state::QueryRegistry`]: fingerprint → [`state::QueryState`], the
//!   `idle → loading → success | error` machine with ordered subscribers
//! - [`executor::RequestExecutor`]: one HTTP attempt, with auth header
//!   preparation and outcome classification
//! - [`retry::RetryOrchestrator`]: bounded exponential retry around the
//!   executor, feeding the registry and the cache
//! - [`client::ApiClient`]: the context object owning all of the above
//!
//! # Example
//!
//! ```no_run
//! use tether_query::{ApiClient, RequestSpec};
//!
//! # async fn demo() -> Result<(), tether_query::RequestError> {
//! let client = ApiClient::builder("https://api.example.com").build()?;
//! let order = client.get("orders/detail", Some(serde_json::json!({"id": 5}))).await?;
//! let sub = client.subscribe(&RequestSpec::get("orders/list"), |snap| {
//!     println!("orders: {:?}", snap.status);
//! });
//! # let _ = (order, sub);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]

pub mod cache;
pub mod client;
pub mod errors;
pub mod executor;
pub mod fingerprint;
pub mod options;
pub mod request;
pub mod retry;
pub mod state;

pub use cache::{CacheEntry, RequestCache};
pub use client::{ApiClient, ApiClientBuilder};
pub use errors::{QueryError, RequestError};
pub use executor::RequestExecutor;
pub use fingerprint::QueryFingerprint;
pub use options::{QueryOptions, RetryDelay};
pub use request::{FetchOverrides, FormField, FormValue, HttpMethod, RequestBody, RequestSpec};
pub use retry::RetryOrchestrator;
pub use state::{QueryRegistry, QuerySnapshot, QueryState, QueryStatus, Subscription};
