//! # tether-socket
//!
//! One long-lived WebSocket session that logs in on every open, keeps itself
//! alive with an application heartbeat and reconnects with capped
//! exponential backoff.
//!
//! - [`config`]: identity, timings and the connect URL
//! - [`frame`]: login/ping/pong frames and inbound classification
//! - [`heartbeat`]: idle-ping and reply-watchdog deadlines
//! - [`reconnect`]: the attempt budget and backoff schedule
//! - [`session`]: the handle and the task that owns the socket
//!
//! # Example
//!
//! ```no_run
//! use tether_socket::{SocketConfig, SocketIdentity, SocketSession};
//!
//! # async fn demo() -> Result<(), tether_socket::SocketError> {
//! let config = SocketConfig::new("wss://push.example.com/ws", SocketIdentity::new("key", "42"));
//! let session = SocketSession::builder(config)
//!     .on_message(|msg| println!("{}", msg.text))
//!     .on_state_change(|state| println!("socket {state}"))
//!     .build()?;
//! session.connect().await?;
//! let _ = session.send(&serde_json::json!({"type": "subscribe", "topic": "alarms"}));
//! session.disconnect().await;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]

pub mod config;
pub mod errors;
pub mod frame;
pub mod heartbeat;
pub mod reconnect;
pub mod session;
pub mod state;

pub use config::{SocketConfig, SocketIdentity};
pub use errors::SocketError;
pub use frame::{FrameKind, SocketMessage};
pub use heartbeat::HeartbeatMonitor;
pub use reconnect::{ReconnectDecision, ReconnectPolicy};
pub use session::{MessageHandler, SocketSession, SocketSessionBuilder, StateHandler};
pub use state::{SocketSnapshot, SocketState};
