use crate::config::RateLimitConfig;
use crate::error::RateLimitError;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

pub const SECOND: Duration = Duration::from_secs(1);
pub const MINUTE: Duration = Duration::from_secs(60);

/// Grant timestamps inside a trailing window, oldest at the front.
#[derive(Debug, Clone)]
pub struct RateWindow {
    pub limit: u32,
    pub window: Duration,
    stamps: VecDeque<Instant>,
}

impl RateWindow {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            stamps: VecDeque::new(),
        }
    }

    /// Drops every grant whose age has reached the window span.
    pub fn trim(&mut self, now: Instant) {
        while let Some(&oldest) = self.stamps.front() {
            if now.saturating_duration_since(oldest) < self.window {
                break;
            }
            self.stamps.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.stamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stamps.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.stamps.len() >= self.limit as usize
    }

    pub fn record(&mut self, now: Instant) {
        self.stamps.push_back(now);
    }

    /// Time until the oldest grant leaves the window.
    pub fn wait_from(&self, now: Instant) -> Duration {
        self.stamps
            .front()
            .map(|&oldest| self.window.saturating_sub(now.saturating_duration_since(oldest)))
            .unwrap_or(Duration::ZERO)
    }
}

#[derive(Debug)]
struct Windows {
    second: RateWindow,
    minute: RateWindow,
}

impl Windows {
    fn trim(&mut self, now: Instant) {
        self.second.trim(now);
        self.minute.trim(now);
    }

    /// Records a grant at `now`, or returns how long to sleep before checking again.
    fn admit(&mut self, now: Instant) -> Result<(), Duration> {
        self.trim(now);

        let mut wait = None;
        if self.second.is_full() {
            wait = Some(self.second.wait_from(now));
        }
        if self.minute.is_full() {
            let minute_wait = self.minute.wait_from(now);
            wait = Some(wait.map_or(minute_wait, |w: Duration| w.max(minute_wait)));
        }

        match wait {
            Some(wait) => Err(wait),
            None => {
                self.second.record(now);
                self.minute.record(now);
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateStatus {
    pub second_count: usize,
    pub per_second_limit: u32,
    pub minute_count: usize,
    pub per_minute_limit: u32,
}

/// Admission gate shared by every outbound send.
///
/// Enforces a per-second and a per-minute cap over sliding windows. Both
/// windows live behind one mutex so the dual check is atomic; `acquire`
/// drops the mutex while it sleeps. Admission order under contention is
/// not FIFO.
#[derive(Debug)]
pub struct RateLimiter {
    per_second_limit: u32,
    per_minute_limit: u32,
    windows: Mutex<Windows>,
}

impl RateLimiter {
    pub fn new(per_second_limit: u32, per_minute_limit: u32) -> Result<Self, RateLimitError> {
        if per_second_limit == 0 {
            return Err(RateLimitError::InvalidLimit {
                name: "messages_per_second",
            });
        }
        if per_minute_limit == 0 {
            return Err(RateLimitError::InvalidLimit {
                name: "messages_per_minute",
            });
        }
        Ok(Self {
            per_second_limit,
            per_minute_limit,
            windows: Mutex::new(Windows {
                second: RateWindow::new(per_second_limit, SECOND),
                minute: RateWindow::new(per_minute_limit, MINUTE),
            }),
        })
    }

    pub fn from_config(config: &RateLimitConfig) -> Result<Self, RateLimitError> {
        Self::new(config.messages_per_second, config.messages_per_minute)
    }

    pub fn per_second_limit(&self) -> u32 {
        self.per_second_limit
    }

    pub fn per_minute_limit(&self) -> u32 {
        self.per_minute_limit
    }

    /// Waits until both windows have room, then records the grant.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut windows = self.windows.lock().await;
                match windows.admit(Instant::now()) {
                    Ok(()) => return,
                    Err(wait) => wait,
                }
            };
            debug!(wait_ms = wait.as_millis() as u64, "send capacity exhausted, waiting");
            tokio::time::sleep(wait).await;
        }
    }

    /// Single admission attempt that never sleeps.
    pub async fn try_acquire(&self) -> Result<(), RateLimitError> {
        let mut windows = self.windows.lock().await;
        windows
            .admit(Instant::now())
            .map_err(|retry_after| RateLimitError::Exhausted { retry_after })
    }

    /// `acquire` bounded by `limit`. No grant is recorded when it times out.
    pub async fn acquire_timeout(&self, limit: Duration) -> Result<(), RateLimitError> {
        tokio::time::timeout(limit, self.acquire())
            .await
            .map_err(|_| RateLimitError::Timeout(limit))
    }

    pub async fn current_second_count(&self) -> usize {
        let mut windows = self.windows.lock().await;
        windows.second.trim(Instant::now());
        windows.second.len()
    }

    pub async fn current_minute_count(&self) -> usize {
        let mut windows = self.windows.lock().await;
        windows.minute.trim(Instant::now());
        windows.minute.len()
    }

    pub async fn status(&self) -> RateStatus {
        let mut windows = self.windows.lock().await;
        windows.trim(Instant::now());
        RateStatus {
            second_count: windows.second.len(),
            per_second_limit: self.per_second_limit,
            minute_count: windows.minute.len(),
            per_minute_limit: self.per_minute_limit,
        }
    }
}
