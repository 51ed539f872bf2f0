//! Idle-ping and reply-watchdog deadlines.
//!
//! While connected the monitor holds two deadlines. After `interval` with no
//! inbound frame a ping is due; once sent, a watchdog expects some frame
//! within `timeout`. Any inbound frame clears the watchdog and pushes the
//! idle deadline out again.

use std::time::Duration;

use tokio::time::Instant;

/// Stand-in for "never" in `sleep_until`.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365);

/// Heartbeat deadlines for one connection.
#[derive(Clone, Debug)]
pub struct HeartbeatMonitor {
    enabled: bool,
    interval: Duration,
    timeout: Duration,
    idle_deadline: Instant,
    reply_deadline: Option<Instant>,
}

impl HeartbeatMonitor {
    /// Create a monitor armed from `now`.
    pub fn new(enabled: bool, interval: Duration, timeout: Duration, now: Instant) -> Self {
        let mut monitor = Self {
            enabled,
            interval,
            timeout,
            idle_deadline: now,
            reply_deadline: None,
        };
        monitor.on_frame(now);
        monitor
    }

    /// Whether pings are sent at all.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether a ping is outstanding.
    pub fn awaiting_reply(&self) -> bool {
        self.reply_deadline.is_some()
    }

    /// When the next ping is due.
    pub fn idle_deadline(&self) -> Instant {
        if self.enabled {
            self.idle_deadline
        } else {
            self.idle_deadline + FAR_FUTURE
        }
    }

    /// When the outstanding ping times out.
    pub fn reply_deadline(&self) -> Instant {
        self.reply_deadline
            .unwrap_or_else(|| self.idle_deadline + FAR_FUTURE)
    }

    /// A frame arrived: cancel the watchdog and restart the idle timer.
    pub fn on_frame(&mut self, now: Instant) {
        self.idle_deadline = now + self.interval;
        self.reply_deadline = None;
    }

    /// A ping went out: start the watchdog.
    pub fn on_ping_sent(&mut self, now: Instant) {
        self.reply_deadline = Some(now + self.timeout);
        self.idle_deadline = now + self.interval;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const INTERVAL: Duration = Duration::from_secs(30);
    const TIMEOUT: Duration = Duration::from_secs(10);

    #[test]
    fn idle_deadline_follows_interval() {
        let start = Instant::now();
        let hb = HeartbeatMonitor::new(true, INTERVAL, TIMEOUT, start);
        assert!(!hb.awaiting_reply());
        assert_eq!(hb.idle_deadline(), start + INTERVAL);
    }

    #[test]
    fn watchdog_fires_without_reply() {
        let start = Instant::now();
        let mut hb = HeartbeatMonitor::new(true, INTERVAL, TIMEOUT, start);
        let ping_at = start + INTERVAL;
        hb.on_ping_sent(ping_at);

        assert!(hb.awaiting_reply());
        assert_eq!(hb.reply_deadline(), ping_at + TIMEOUT);
        assert_eq!(hb.idle_deadline(), ping_at + INTERVAL);
    }

    #[test]
    fn any_frame_cancels_watchdog() {
        let start = Instant::now();
        let mut hb = HeartbeatMonitor::new(true, INTERVAL, TIMEOUT, start);
        hb.on_ping_sent(start + INTERVAL);
        let reply_at = start + INTERVAL + Duration::from_secs(2);
        hb.on_frame(reply_at);

        assert!(!hb.awaiting_reply());
        assert!(hb.reply_deadline() > reply_at + INTERVAL * 100);
        assert_eq!(hb.idle_deadline(), reply_at + INTERVAL);
    }

    #[test]
    fn disabled_monitor_never_pings() {
        let start = Instant::now();
        let hb = HeartbeatMonitor::new(false, INTERVAL, TIMEOUT, start);
        assert!(hb.idle_deadline() > start + INTERVAL * 100);
    }
}
