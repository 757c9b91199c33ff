//! Per-client request ceiling.
//!
//! Each client IP gets a window that opens on its first request and lasts
//! `window`. Up to `max_requests` requests are admitted inside it; the rest are
//! refused until the window elapses, at which point the count starts over.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::config::RateLimitConfig;

#[derive(Debug, Clone, Copy)]
struct Window {
    opened_at: Instant,
    count: u32,
}

/// Outcome of admitting one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed {
        limit: u32,
        remaining: u32,
        reset_after: Duration,
    },
    Limited {
        limit: u32,
        retry_after: Duration,
    },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allowed { .. })
    }
}

/// Window counters keyed by client IP.
///
/// `DashMap` shards its locks, so concurrent requests from different clients
/// rarely contend and updates for one client are never lost.
#[derive(Debug)]
pub struct RateLimiter {
    windows: DashMap<IpAddr, Window>,
    max_requests: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            windows: DashMap::new(),
            max_requests,
            window,
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.max_requests, Duration::from_secs(config.window_secs))
    }

    /// Admit one request from `client` now.
    pub fn check(&self, client: IpAddr) -> RateDecision {
        self.check_at(client, Instant::now())
    }

    /// Admit one request from `client` at `now`.
    pub fn check_at(&self, client: IpAddr, now: Instant) -> RateDecision {
        let mut entry = self.windows.entry(client).or_insert(Window {
            opened_at: now,
            count: 0,
        });
        let window = entry.value_mut();

        let mut elapsed = now.saturating_duration_since(window.opened_at);
        if elapsed >= self.window {
            window.opened_at = now;
            window.count = 0;
            elapsed = Duration::ZERO;
        }
        let reset_after = self.window - elapsed;

        if window.count >= self.max_requests {
            return RateDecision::Limited {
                limit: self.max_requests,
                retry_after: reset_after,
            };
        }

        window.count += 1;
        RateDecision::Allowed {
            limit: self.max_requests,
            remaining: self.max_requests - window.count,
            reset_after,
        }
    }

    /// Drop windows that have fully elapsed. Returns how many were removed.
    pub fn sweep(&self, now: Instant) -> usize {
        let before = self.windows.len();
        self.windows
            .retain(|_, w| now.saturating_duration_since(w.opened_at) < self.window);
        before.saturating_sub(self.windows.len())
    }

    /// Number of clients currently tracked.
    pub fn tracked_clients(&self) -> usize {
        self.windows.len()
    }

    /// Periodically sweep expired windows until shutdown.
    pub async fn run_sweeper(self: Arc<Self>, interval: Duration, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = self.sweep(Instant::now());
                    if removed > 0 {
                        tracing::debug!(removed, tracked = self.tracked_clients(), "Expired rate-limit windows swept");
                    }
                }
                _ = shutdown.recv() => {
                    tracing::debug!("Rate-limit sweeper stopping");
                    break;
                }
            }
        }
    }
}
