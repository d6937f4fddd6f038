//! Unsolicited notifications and the keepalive timer.

use std::time::Duration;

use tokio::time::{Instant, Interval, MissedTickBehavior};

use crate::mcp::protocol::OutgoingNotification;
use crate::mcp::types::CapabilityKind;

/// Default time between keepalive pings. Stays under common proxy idle timeouts.
pub const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(20);

/// Farthest deadline any bridge timer is armed for.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Method name of the keepalive notification.
pub const PING_METHOD: &str = "ping";

/// Builds the `list_changed` notification for `kind`.
#[must_use]
pub fn list_changed(kind: CapabilityKind) -> OutgoingNotification {
    OutgoingNotification::new(kind.list_changed_method(), None)
}

/// Builds the keepalive notification.
#[must_use]
pub fn ping() -> OutgoingNotification {
    OutgoingNotification::new(PING_METHOD, None)
}

/// Returns `now + delay`, clamped so the addition cannot overflow.
#[must_use]
pub fn deadline_after(delay: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(delay.min(FAR_FUTURE))
        .or_else(|| now.checked_add(Duration::from_secs(86_400)))
        .unwrap_or(now)
}

/// Periodic keepalive timer. At most one interval is live at a time.
#[derive(Debug)]
pub struct Keepalive {
    period: Duration,
    interval: Option<Interval>,
}

impl Keepalive {
    /// Creates a stopped timer. The period is kept between 1 ms and 30 years.
    #[must_use]
    pub fn new(period: Duration) -> Self {
        Self {
            period: period.clamp(Duration::from_millis(1), FAR_FUTURE),
            interval: None,
        }
    }

    /// Starts (or restarts) the timer; the first tick is one period from now.
    pub fn start(&mut self) {
        let mut interval = tokio::time::interval_at(deadline_after(self.period), self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.interval = Some(interval);
    }

    /// Stops the timer.
    pub fn stop(&mut self) {
        self.interval = None;
    }

    /// Whether the timer is running.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.interval.is_some()
    }

    /// Waits for the next tick. Never completes while stopped.
    pub async fn tick(&mut self) {
        match self.interval.as_mut() {
            Some(interval) => {
                interval.tick().await;
            }
            None => std::future::pending().await,
        }
    }
}
