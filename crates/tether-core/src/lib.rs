//! # tether-core
//!
//! Foundation pieces shared by every Tether crate:
//!
//! - **Backoff**: [`retry::BackoffConfig`] and [`retry::calculate_backoff_delay`],
//!   the one doubling-with-cap formula used by both HTTP retries and socket
//!   reconnects
//! - **Error snapshots**: [`errors::ErrorInfo`], the serializable form of a
//!   failure handed to subscribers and state callbacks
//! - **Clock**: [`time::now_ms`] wall-clock milliseconds for persisted expiries
//! - **Logging**: [`logging::init_subscriber`] for the `tracing` subscriber

#![deny(unsafe_code)]

pub mod errors;
pub mod logging;
pub mod retry;
pub mod time;

pub use errors::ErrorInfo;
pub use retry::{BackoffConfig, calculate_backoff_delay};
pub use time::now_ms;
