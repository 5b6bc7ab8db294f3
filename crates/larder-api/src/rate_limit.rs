//! Fixed-window call budgets for the sync and admin routes

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::Mutex;

use crate::auth::token_fingerprint;
use crate::config::AppConfig;
use crate::error::AppError;

/// Routes that spend from a per-token budget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtectedEndpoint {
    Sync,
    Admin,
}

impl ProtectedEndpoint {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Sync => "sync",
            Self::Admin => "admin",
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Budget {
    window: Duration,
    sync: u32,
    admin: u32,
}

impl Budget {
    const fn calls_for(self, endpoint: ProtectedEndpoint) -> u32 {
        match endpoint {
            ProtectedEndpoint::Sync => self.sync,
            ProtectedEndpoint::Admin => self.admin,
        }
    }
}

/// Calls made by one token since `opened`
#[derive(Debug, Clone, Copy)]
struct Window {
    opened: Instant,
    calls: u32,
}

impl Window {
    fn is_over(&self, now: Instant, length: Duration) -> bool {
        now.saturating_duration_since(self.opened) >= length
    }
}

struct Windows {
    open: HashMap<(ProtectedEndpoint, u64), Window>,
    last_sweep: Instant,
}

#[derive(Default)]
struct Tally {
    admitted: AtomicU64,
    refused: AtomicU64,
}

/// Admitted and refused calls since startup
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RateLimitMetricsSnapshot {
    pub sync_allowed: u64,
    pub sync_limited: u64,
    pub admin_allowed: u64,
    pub admin_limited: u64,
}

/// Per-token call budgets keyed on a fingerprint of the presented token.
///
/// Tokens are counted before they are authenticated, so windows that have
/// run out are swept at most once per window length.
pub struct EndpointRateLimiter {
    budget: Budget,
    windows: Mutex<Windows>,
    sync: Tally,
    admin: Tally,
}

impl EndpointRateLimiter {
    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(Budget {
            window: config.rate_limit_window,
            sync: config.sync_rate_limit_per_window,
            admin: config.admin_rate_limit_per_window,
        })
    }

    fn new(budget: Budget) -> Self {
        Self {
            budget,
            windows: Mutex::new(Windows {
                open: HashMap::new(),
                last_sweep: Instant::now(),
            }),
            sync: Tally::default(),
            admin: Tally::default(),
        }
    }

    /// Spend one call from the budget of `token`'s holder on `endpoint`
    pub async fn check(&self, endpoint: ProtectedEndpoint, token: &str) -> Result<(), AppError> {
        self.admit(endpoint, token, Instant::now()).await
    }

    async fn admit(
        &self,
        endpoint: ProtectedEndpoint,
        token: &str,
        now: Instant,
    ) -> Result<(), AppError> {
        let length = self.budget.window;
        let fingerprint = token_fingerprint(token);
        let tally = self.tally(endpoint);

        let mut windows = self.windows.lock().await;
        if now.saturating_duration_since(windows.last_sweep) >= length {
            let before = windows.open.len();
            windows.open.retain(|_, window| !window.is_over(now, length));
            windows.last_sweep = now;
            tracing::debug!(
                evicted = before - windows.open.len(),
                "Swept expired rate limit windows"
            );
        }

        let window = windows
            .open
            .entry((endpoint, fingerprint))
            .or_insert(Window {
                opened: now,
                calls: 0,
            });
        if window.is_over(now, length) {
            *window = Window {
                opened: now,
                calls: 0,
            };
        }

        if window.calls >= self.budget.calls_for(endpoint) {
            let retry_after_secs = length
                .saturating_sub(now.saturating_duration_since(window.opened))
                .as_secs();
            tally.refused.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                endpoint = endpoint.label(),
                caller = fingerprint,
                retry_after_secs,
                "Rate limit exceeded"
            );
            return Err(AppError::too_many_requests(
                "Rate limit exceeded for protected endpoint",
                retry_after_secs,
            ));
        }

        window.calls += 1;
        tally.admitted.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    const fn tally(&self, endpoint: ProtectedEndpoint) -> &Tally {
        match endpoint {
            ProtectedEndpoint::Sync => &self.sync,
            ProtectedEndpoint::Admin => &self.admin,
        }
    }

    pub fn metrics_snapshot(&self) -> RateLimitMetricsSnapshot {
        RateLimitMetricsSnapshot {
            sync_allowed: self.sync.admitted.load(Ordering::Relaxed),
            sync_limited: self.sync.refused.load(Ordering::Relaxed),
            admin_allowed: self.admin.admitted.load(Ordering::Relaxed),
            admin_limited: self.admin.refused.load(Ordering::Relaxed),
        }
    }

    #[cfg(test)]
    async fn tracked(&self) -> usize {
        self.windows.lock().await.open.len()
    }
}
