//! Session handle and the connection task.
//!
//! [`SocketSession`] is a thin handle over one spawned task that owns the
//! WebSocket, the [`HeartbeatMonitor`] and the [`ReconnectPolicy`]. The
//! handle talks to the task over an unbounded command channel and observes
//! it through a `watch` channel and a small counters block.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Once};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep, sleep_until};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::config::SocketConfig;
use crate::errors::SocketError;
use crate::frame::{self, FrameKind, SocketMessage};
use crate::heartbeat::HeartbeatMonitor;
use crate::reconnect::{ReconnectDecision, ReconnectPolicy};
use crate::state::{SocketSnapshot, SocketState};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Callback invoked for every delivered inbound frame.
pub type MessageHandler = Arc<dyn Fn(SocketMessage) + Send + Sync>;

/// Callback invoked on every state transition.
pub type StateHandler = Arc<dyn Fn(SocketState) + Send + Sync>;

/// Time allowed for the server to answer our close frame.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// Close code for a normal shutdown.
const NORMAL_CLOSURE: u16 = 1000;

/// Close code reported when a close frame carried no status.
const NO_STATUS: u16 = 1005;

enum Command {
    Send(String),
    Disconnect,
}

/// How a connected phase ended.
enum Ended {
    /// Closed on purpose; do not reconnect.
    Stopped,
    /// Lost; reconnect if the budget allows.
    Lost(String),
}

// ─────────────────────────────────────────────────────────────────────────────
// Builder
// ─────────────────────────────────────────────────────────────────────────────

/// Builder for [`SocketSession`].
pub struct SocketSessionBuilder {
    config: SocketConfig,
    on_message: Option<MessageHandler>,
    on_state_change: Option<StateHandler>,
}

impl SocketSessionBuilder {
    /// Set the message callback. Required.
    #[must_use]
    pub fn on_message<F>(mut self, f: F) -> Self
    where
        F: Fn(SocketMessage) + Send + Sync + 'static,
    {
        self.on_message = Some(Arc::new(f));
        self
    }

    /// Set a state-change callback.
    #[must_use]
    pub fn on_state_change<F>(mut self, f: F) -> Self
    where
        F: Fn(SocketState) + Send + Sync + 'static,
    {
        self.on_state_change = Some(Arc::new(f));
        self
    }

    /// Validate the config and build the session. Nothing connects yet.
    pub fn build(self) -> Result<SocketSession, SocketError> {
        self.config.validate()?;
        let on_message = self
            .on_message
            .ok_or_else(|| SocketError::Config("a message callback is required".to_string()))?;
        let (state, _) = watch::channel(SocketState::Disconnected);

        Ok(SocketSession {
            shared: Arc::new(Shared {
                config: self.config,
                on_message,
                on_state_change: self.on_state_change,
                state,
                counters: Mutex::new(Counters::default()),
                outbound: Mutex::new(None),
                task: Mutex::new(None),
                cancel: CancellationToken::new(),
                destroyed: AtomicBool::new(false),
            }),
        })
    }
}

impl std::fmt::Debug for SocketSessionBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketSessionBuilder")
            .field("config", &self.config)
            .field("on_message", &self.on_message.is_some())
            .field("on_state_change", &self.on_state_change.is_some())
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Shared state
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct Counters {
    reconnect_attempts: u32,
    current_backoff_delay: Duration,
    heartbeat_armed: bool,
}

struct Shared {
    config: SocketConfig,
    on_message: MessageHandler,
    on_state_change: Option<StateHandler>,
    state: watch::Sender<SocketState>,
    counters: Mutex<Counters>,
    outbound: Mutex<Option<mpsc::UnboundedSender<Command>>>,
    task: Mutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
    destroyed: AtomicBool,
}

impl Shared {
    fn state(&self) -> SocketState {
        *self.state.borrow()
    }

    fn set_state(&self, next: SocketState) {
        let changed = self.state.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
        if !changed {
            return;
        }
        debug!(state = %next, "socket state changed");
        if let Some(callback) = &self.on_state_change {
            if catch_unwind(AssertUnwindSafe(|| callback(next))).is_err() {
                error!(state = %next, "socket state callback panicked");
            }
        }
    }

    fn deliver(&self, message: SocketMessage) {
        if catch_unwind(AssertUnwindSafe(|| (self.on_message)(message))).is_err() {
            error!("socket message callback panicked");
        }
    }

    fn record_policy(&self, policy: &ReconnectPolicy) {
        let mut counters = self.counters.lock();
        counters.reconnect_attempts = policy.attempts();
        counters.current_backoff_delay = policy.current_delay();
    }

    fn set_heartbeat_armed(&self, armed: bool) {
        self.counters.lock().heartbeat_armed = armed;
    }

    fn is_running(&self) -> bool {
        self.task.lock().as_ref().is_some_and(|h| !h.is_finished())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Session handle
// ─────────────────────────────────────────────────────────────────────────────

/// One self-healing WebSocket connection.
///
/// Dropping the handle cancels the connection task.
pub struct SocketSession {
    shared: Arc<Shared>,
}

impl SocketSession {
    /// Start building a session.
    pub fn builder(config: SocketConfig) -> SocketSessionBuilder {
        SocketSessionBuilder {
            config,
            on_message: None,
            on_state_change: None,
        }
    }

    /// Session with only a message callback.
    pub fn new<F>(config: SocketConfig, on_message: F) -> Result<Self, SocketError>
    where
        F: Fn(SocketMessage) + Send + Sync + 'static,
    {
        Self::builder(config).on_message(on_message).build()
    }

    /// Start the connection task and wait for its first attempt.
    ///
    /// A no-op while a task is already running. When the first attempt
    /// fails the error is returned and the task keeps reconnecting.
    pub async fn connect(&self) -> Result<(), SocketError> {
        if self.shared.destroyed.load(Ordering::SeqCst) {
            return Err(SocketError::Destroyed);
        }

        let ready_rx = {
            let mut task = self.shared.task.lock();
            if task.as_ref().is_some_and(|h| !h.is_finished()) {
                debug!("socket task already running");
                return Ok(());
            }
            let (command_tx, command_rx) = mpsc::unbounded_channel();
            let (ready_tx, ready_rx) = oneshot::channel();
            *self.shared.outbound.lock() = Some(command_tx);
            *task = Some(tokio::spawn(run_session(
                Arc::clone(&self.shared),
                command_rx,
                ready_tx,
            )));
            ready_rx
        };

        ready_rx.await.map_err(|_| SocketError::TaskEnded)?
    }

    /// Queue a frame. Strings go out verbatim; anything else as JSON.
    ///
    /// Returns `false` unless the session is connected.
    pub fn send<T: Serialize + ?Sized>(&self, message: &T) -> bool {
        if self.shared.state() != SocketState::Connected {
            return false;
        }
        let text = match frame::encode(message) {
            Ok(text) => text,
            Err(err) => {
                warn!(error = %err, "failed to encode outbound socket message");
                return false;
            }
        };
        self.shared
            .outbound
            .lock()
            .as_ref()
            .is_some_and(|tx| tx.send(Command::Send(text)).is_ok())
    }

    /// Close with code 1000 and stop the task. `connect` may be called again.
    pub async fn disconnect(&self) {
        let sender = self.shared.outbound.lock().clone();
        if let Some(tx) = sender {
            let _ = tx.send(Command::Disconnect);
        }
        self.join_task().await;
        self.shared.set_heartbeat_armed(false);
        self.shared.set_state(SocketState::Disconnected);
    }

    /// Stop for good: cancel the task and refuse later connects.
    pub async fn destroy(&self) {
        if self.shared.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("destroying socket session");
        self.shared.cancel.cancel();
        self.join_task().await;
        *self.shared.outbound.lock() = None;
        self.shared.set_heartbeat_armed(false);
        self.shared.set_state(SocketState::Disconnected);
    }

    /// Current state.
    pub fn state(&self) -> SocketState {
        self.shared.state()
    }

    /// Read-only view of state and counters.
    pub fn snapshot(&self) -> SocketSnapshot {
        let counters = self.shared.counters.lock();
        SocketSnapshot {
            state: self.shared.state(),
            reconnect_attempts: counters.reconnect_attempts,
            current_backoff_delay: counters.current_backoff_delay,
            heartbeat_armed: counters.heartbeat_armed,
            destroyed: self.shared.destroyed.load(Ordering::SeqCst),
        }
    }

    /// Receiver that observes every state change.
    pub fn state_receiver(&self) -> watch::Receiver<SocketState> {
        self.shared.state.subscribe()
    }

    /// Whether the connection task is alive.
    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }

    /// Config this session was built with.
    pub fn config(&self) -> &SocketConfig {
        &self.shared.config
    }

    async fn join_task(&self) {
        let handle = self.shared.task.lock().take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                if err.is_panic() {
                    error!("socket task panicked");
                }
            }
        }
    }
}

impl std::fmt::Debug for SocketSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketSession")
            .field("url", &self.shared.config.url)
            .field("state", &self.shared.state())
            .finish_non_exhaustive()
    }
}

impl Drop for SocketSession {
    fn drop(&mut self) {
        self.shared.cancel.cancel();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Connection task
// ─────────────────────────────────────────────────────────────────────────────

#[tracing::instrument(skip_all, fields(url = %shared.config.url))]
async fn run_session(
    shared: Arc<Shared>,
    mut commands: mpsc::UnboundedReceiver<Command>,
    ready: oneshot::Sender<Result<(), SocketError>>,
) {
    let config = &shared.config;
    let mut policy = ReconnectPolicy::new(
        config.initial_reconnect_delay,
        config.max_reconnect_delay,
        config.max_reconnect_attempts,
    );
    let mut ready = Some(ready);

    loop {
        shared.set_state(SocketState::Connecting);

        let Some(opened) = open_unless_stopped(&shared, &mut commands).await else {
            shared.set_state(SocketState::Disconnected);
            return;
        };

        match opened {
            Ok(ws) => {
                policy.reset();
                shared.record_policy(&policy);
                shared.set_heartbeat_armed(config.enable_heart_check);
                shared.set_state(SocketState::Connected);
                info!("socket connected");
                if let Some(tx) = ready.take() {
                    let _ = tx.send(Ok(()));
                }

                match drive(&shared, ws, &mut commands).await {
                    Ended::Stopped => {
                        shared.set_state(SocketState::Disconnected);
                        return;
                    }
                    Ended::Lost(reason) => {
                        warn!(%reason, "socket connection lost");
                        shared.set_state(SocketState::Error);
                    }
                }
            }
            Err(err) => {
                let retryable = err.is_retryable();
                warn!(error = %err, category = err.category(), retryable, "socket connect failed");
                shared.set_state(SocketState::Error);
                if let Some(tx) = ready.take() {
                    let _ = tx.send(Err(err));
                }
                if !retryable {
                    error!("socket connect error is permanent, not reconnecting");
                    return;
                }
            }
        }

        if shared.destroyed.load(Ordering::SeqCst) {
            policy.disable();
        }
        match policy.schedule() {
            ReconnectDecision::Scheduled { attempt, delay } => {
                shared.record_policy(&policy);
                info!(
                    attempt,
                    max_attempts = config.max_reconnect_attempts,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "socket reconnect scheduled"
                );
                if !wait_for_reconnect(&shared, delay, &mut commands).await {
                    shared.set_state(SocketState::Disconnected);
                    return;
                }
                policy.fire();
            }
            ReconnectDecision::Exhausted => {
                error!(
                    max_attempts = config.max_reconnect_attempts,
                    "socket reconnect attempts exhausted"
                );
                return;
            }
            ReconnectDecision::AlreadyScheduled | ReconnectDecision::Disabled => return,
        }
    }
}

/// Open the socket, or `None` if stopped first.
async fn open_unless_stopped(
    shared: &Shared,
    commands: &mut mpsc::UnboundedReceiver<Command>,
) -> Option<Result<WsStream, SocketError>> {
    let open = open(&shared.config);
    tokio::pin!(open);
    loop {
        tokio::select! {
            biased;
            () = shared.cancel.cancelled() => return None,
            command = commands.recv() => match command {
                Some(Command::Send(_)) => trace!("dropping frame queued before open"),
                Some(Command::Disconnect) | None => return None,
            },
            result = &mut open => return Some(result),
        }
    }
}

async fn open(config: &SocketConfig) -> Result<WsStream, SocketError> {
    install_crypto_provider();
    let url = config.connect_url();
    let handshake = connect_async(url.as_str());
    let (ws, response) = match config.connect_timeout {
        Some(limit) => tokio::time::timeout(limit, handshake)
            .await
            .map_err(|_| SocketError::Timeout {
                timeout_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
            })??,
        None => handshake.await?,
    };
    debug!(status = %response.status(), "socket handshake complete");
    Ok(ws)
}

/// Pick ring as the process TLS provider once; rustls will not choose one
/// itself when more than one is linked in.
fn install_crypto_provider() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// Sleep out a reconnect delay. `false` means stop instead.
async fn wait_for_reconnect(
    shared: &Shared,
    delay: Duration,
    commands: &mut mpsc::UnboundedReceiver<Command>,
) -> bool {
    let timer = sleep(delay);
    tokio::pin!(timer);
    loop {
        tokio::select! {
            biased;
            () = shared.cancel.cancelled() => return false,
            command = commands.recv() => match command {
                Some(Command::Send(_)) => trace!("dropping frame queued while reconnecting"),
                Some(Command::Disconnect) | None => return false,
            },
            () = &mut timer => return true,
        }
    }
}

/// Run one open connection until it closes or is lost.
async fn drive(
    shared: &Shared,
    mut ws: WsStream,
    commands: &mut mpsc::UnboundedReceiver<Command>,
) -> Ended {
    let config = &shared.config;
    let login = frame::login_frame(&config.identity);
    if let Err(err) = ws.send(Message::Text(login.into())).await {
        return Ended::Lost(format!("login send failed: {err}"));
    }

    let mut heartbeat = HeartbeatMonitor::new(
        config.enable_heart_check,
        config.heartbeat_interval,
        config.heartbeat_timeout,
        Instant::now(),
    );

    let ended = loop {
        let idle = sleep_until(heartbeat.idle_deadline());
        tokio::pin!(idle);
        let reply = sleep_until(heartbeat.reply_deadline());
        tokio::pin!(reply);

        tokio::select! {
            biased;

            () = shared.cancel.cancelled() => {
                close_gracefully(shared, &mut ws).await;
                break Ended::Stopped;
            }

            () = &mut reply, if heartbeat.awaiting_reply() => {
                warn!(
                    timeout_ms = u64::try_from(config.heartbeat_timeout.as_millis()).unwrap_or(u64::MAX),
                    "socket heartbeat timed out"
                );
                break Ended::Lost("heartbeat timeout".to_string());
            }

            command = commands.recv() => match command {
                Some(Command::Send(text)) => {
                    if let Err(err) = ws.send(Message::Text(text.into())).await {
                        break Ended::Lost(format!("send failed: {err}"));
                    }
                }
                Some(Command::Disconnect) | None => {
                    close_gracefully(shared, &mut ws).await;
                    break Ended::Stopped;
                }
            },

            () = &mut idle, if heartbeat.is_enabled() && !heartbeat.awaiting_reply() => {
                if let Err(err) = ws.send(Message::Text(frame::ping_frame().into())).await {
                    break Ended::Lost(format!("heartbeat ping failed: {err}"));
                }
                heartbeat.on_ping_sent(Instant::now());
                trace!("socket heartbeat ping sent");
            }

            inbound = ws.next() => {
                heartbeat.on_frame(Instant::now());
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        if let Err(err) = handle_text(shared, &mut ws, text.as_str()).await {
                            break Ended::Lost(format!("reply failed: {err}"));
                        }
                    }
                    Some(Ok(Message::Binary(data))) => match std::str::from_utf8(&data) {
                        Ok(text) => {
                            if let Err(err) = handle_text(shared, &mut ws, text).await {
                                break Ended::Lost(format!("reply failed: {err}"));
                            }
                        }
                        Err(_) => debug!(len = data.len(), "ignoring non-UTF-8 binary frame"),
                    },
                    Some(Ok(Message::Ping(payload))) => {
                        let _ = ws.send(Message::Pong(payload)).await;
                    }
                    Some(Ok(Message::Pong(_) | Message::Frame(_))) => {}
                    Some(Ok(Message::Close(close))) => {
                        let code = close.as_ref().map_or(NO_STATUS, |c| u16::from(c.code));
                        if code == NORMAL_CLOSURE {
                            info!("socket closed by server");
                            break Ended::Stopped;
                        }
                        break Ended::Lost(format!("closed with code {code}"));
                    }
                    Some(Err(err)) => break Ended::Lost(err.to_string()),
                    None => break Ended::Lost("stream ended without close frame (1006)".to_string()),
                }
            }
        }
    };

    shared.set_heartbeat_armed(false);
    ended
}

async fn handle_text(shared: &Shared, ws: &mut WsStream, text: &str) -> Result<(), tungstenite::Error> {
    let message = SocketMessage::parse(text);
    match message.kind {
        FrameKind::Pong => trace!("socket heartbeat pong"),
        FrameKind::Ping => ws.send(Message::Text(frame::pong_frame().into())).await?,
        FrameKind::Error => {
            warn!(frame = %message.text, "server reported socket error");
            shared.deliver(message);
        }
        _ => shared.deliver(message),
    }
    Ok(())
}

async fn close_gracefully(shared: &Shared, ws: &mut WsStream) {
    shared.set_state(SocketState::Disconnecting);
    let frame = CloseFrame {
        code: CloseCode::Normal,
        reason: "client disconnect".to_string().into(),
    };
    if let Err(err) = ws.close(Some(frame)).await {
        debug!(error = %err, "socket close handshake failed");
        return;
    }
    let drain = async { while let Some(Ok(_)) = ws.next().await {} };
    if tokio::time::timeout(CLOSE_GRACE, drain).await.is_err() {
        debug!("socket close handshake timed out");
    }
}
