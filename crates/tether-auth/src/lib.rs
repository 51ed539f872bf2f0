//! # tether-auth
//!
//! Bearer-token authority for Tether HTTP clients.
//!
//! - [`TokenAuthority`]: hands out a valid token, refreshing it at most once
//!   at a time no matter how many callers ask concurrently, and prepares the
//!   `Authorization` header for outgoing requests
//! - [`TokenRefresher`]: the network call that issues a token
//!   ([`HttpTokenRefresher`] posts credentials to the token endpoint)
//! - [`SessionStore`]: where the current token lives between calls
//!   ([`MemorySessionStore`] or the file-backed [`FileSessionStore`])
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tether_auth::{AuthConfig, MemorySessionStore, TokenAuthority};
//!
//! # async fn demo() {
//! let config = AuthConfig::new("https://api.example.com", "alice", "s3cret");
//! let authority = TokenAuthority::with_http_refresher(
//!     config,
//!     reqwest::Client::new(),
//!     Arc::new(MemorySessionStore::new()),
//! );
//! let mut headers = reqwest::header::HeaderMap::new();
//! let attached = authority.prepare_auth_header(&mut headers, "orders/list").await;
//! # let _ = attached;
//! # }
//! ```

#![deny(unsafe_code)]

pub mod authority;
pub mod errors;
pub mod refresher;
pub mod store;
pub mod token;

pub use authority::{AuthConfig, TokenAuthority};
pub use errors::{AuthError, RefreshFailure};
pub use refresher::{HttpTokenRefresher, TokenRefresher};
pub use store::{FileSessionStore, MemorySessionStore, SessionStore};
pub use token::AuthToken;
