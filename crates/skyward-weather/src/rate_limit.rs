//! Per-client request windows with a penalty period.
//!
//! Each endpoint owns one `RateLimiter`. A client's window opens on its first
//! request and resets once `window` has elapsed. The request that pushes the
//! count past `max_per_window` puts the client into a penalty that lasts
//! until the window resets; every request during the penalty is denied
//! without being counted.
//!
//! Client ids come straight from `X-Forwarded-For` and are not verified, so a
//! client can pick its own bucket. Requests without the header share the
//! `unknown` bucket.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use skyward_core::config::MAX_WINDOW_SECS;

/// Bucket shared by every request that carries no forwarding header.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Longest window a limiter tracks. Longer windows are clamped.
pub const MAX_WINDOW: Duration = Duration::from_secs(MAX_WINDOW_SECS);

/// Outcome of `check_and_record`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed { remaining: u32 },
    Denied { retry_after_secs: u64 },
}

impl RateLimitDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }
}

#[derive(Debug, Clone, Copy)]
struct RateLimitWindow {
    count: u32,
    reset_at: Instant,
}

#[derive(Debug, Default)]
struct LimiterState {
    windows: HashMap<String, RateLimitWindow>,
    penalties: HashMap<String, Instant>,
}

/// Fixed-window counter keyed by client id.
#[derive(Debug)]
pub struct RateLimiter {
    max_per_window: u32,
    window: Duration,
    state: Mutex<LimiterState>,
}

impl RateLimiter {
    pub fn new(max_per_window: u32, window: Duration) -> Self {
        Self {
            max_per_window,
            window: window.min(MAX_WINDOW),
            state: Mutex::new(LimiterState::default()),
        }
    }

    pub fn check_and_record(&self, client_id: &str) -> RateLimitDecision {
        self.check_and_record_at(client_id, Instant::now())
    }

    /// Count one request from `client_id` at `now`.
    ///
    /// The whole check-and-increment runs under one lock so concurrent
    /// requests cannot both slip under the limit.
    pub fn check_and_record_at(&self, client_id: &str, now: Instant) -> RateLimitDecision {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        if let Some(&until) = state.penalties.get(client_id) {
            if now < until {
                return RateLimitDecision::Denied {
                    retry_after_secs: ceil_secs(until - now),
                };
            }
            state.penalties.remove(client_id);
        }

        let window = self.window;
        let entry = state
            .windows
            .entry(client_id.to_string())
            .or_insert_with(|| RateLimitWindow {
                count: 0,
                reset_at: now + window,
            });

        if now >= entry.reset_at {
            entry.count = 0;
            entry.reset_at = now + window;
        }

        entry.count = entry.count.saturating_add(1);

        if entry.count > self.max_per_window {
            let until = entry.reset_at;
            state.penalties.insert(client_id.to_string(), until);
            tracing::warn!(
                "Client {} exceeded {} requests per {:?}",
                client_id,
                self.max_per_window,
                window
            );
            return RateLimitDecision::Denied {
                retry_after_secs: ceil_secs(until.saturating_duration_since(now)),
            };
        }

        RateLimitDecision::Allowed {
            remaining: self.max_per_window - entry.count,
        }
    }

    /// Forget windows and penalties that have fully lapsed.
    ///
    /// Returns the number of clients no longer tracked.
    pub fn cleanup_at(&self, now: Instant) -> usize {
        let mut state = self.state.lock();
        let before = state.windows.len();
        state.windows.retain(|_, w| now < w.reset_at);
        state.penalties.retain(|_, until| now < *until);
        before - state.windows.len()
    }

    /// Number of clients with an open window.
    pub fn tracked_clients(&self) -> usize {
        self.state.lock().windows.len()
    }
}

/// Derive the limiter key from an `X-Forwarded-For` header value.
pub fn client_id_from_forwarded(header: Option<&str>) -> String {
    header
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .unwrap_or(UNKNOWN_CLIENT)
        .to_string()
}

/// Whole seconds, rounded up, never below 1.
fn ceil_secs(d: Duration) -> u64 {
    let millis = d.as_millis();
    let secs = millis.div_ceil(1000);
    u64::try_from(secs).unwrap_or(u64::MAX).max(1)
}
