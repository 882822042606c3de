// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Per-provider sliding-window rate limiting
//!
//! Each provider gets its own quota of `max_calls` per trailing `window`.
//! The limiter never sleeps: callers decide whether to wait, skip or rotate.

use serde::Deserialize;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::debug;

/// Call quota for one provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RateLimit {
    /// Calls allowed within one window
    pub max_calls: u32,
    /// Length of the trailing window
    #[serde(rename = "window_secs", deserialize_with = "deserialize_secs")]
    pub window: Duration,
}

fn deserialize_secs<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: serde::Deserializer<'de>,
{
    u64::deserialize(deserializer).map(Duration::from_secs)
}

impl RateLimit {
    pub fn new(max_calls: u32, window: Duration) -> Self {
        Self { max_calls, window }
    }

    pub fn per_minute(max_calls: u32) -> Self {
        Self::new(max_calls, Duration::from_secs(60))
    }
}

#[derive(Debug)]
struct ProviderWindow {
    limit: RateLimit,
    calls: VecDeque<Instant>,
}

impl ProviderWindow {
    fn new(limit: RateLimit) -> Self {
        Self {
            limit,
            calls: VecDeque::new(),
        }
    }

    /// Drop timestamps that have left the trailing window
    fn prune(&mut self, now: Instant) {
        while let Some(&oldest) = self.calls.front() {
            if now.saturating_duration_since(oldest) >= self.limit.window {
                self.calls.pop_front();
            } else {
                break;
            }
        }
    }

    fn has_capacity(&mut self, now: Instant) -> bool {
        self.prune(now);
        self.calls.len() < self.limit.max_calls as usize
    }
}

/// Sliding-window limiter shared by every query in a session
#[derive(Debug, Default)]
pub struct SlidingWindowLimiter {
    windows: Mutex<HashMap<String, ProviderWindow>>,
}

impl SlidingWindowLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set or replace the quota for a provider, keeping its call history
    pub fn configure(&self, provider: &str, limit: RateLimit) {
        let mut windows = self.lock();
        windows
            .entry(provider.to_string())
            .and_modify(|w| w.limit = limit)
            .or_insert_with(|| ProviderWindow::new(limit));
    }

    /// Whether a call to `provider` would be admitted now (does NOT record it)
    ///
    /// Providers without a configured quota are always admitted.
    pub fn allow(&self, provider: &str) -> bool {
        self.allow_at(provider, Instant::now())
    }

    pub fn allow_at(&self, provider: &str, now: Instant) -> bool {
        match self.lock().get_mut(provider) {
            Some(window) => window.has_capacity(now),
            None => true,
        }
    }

    /// Record a call against `provider` unconditionally
    pub fn record(&self, provider: &str) {
        self.record_at(provider, Instant::now());
    }

    pub fn record_at(&self, provider: &str, now: Instant) {
        if let Some(window) = self.lock().get_mut(provider) {
            window.prune(now);
            window.calls.push_back(now);
        }
    }

    /// Admit and record a call as one atomic step
    ///
    /// Two concurrent callers can never both be admitted for the last slot.
    pub fn try_acquire(&self, provider: &str) -> bool {
        self.try_acquire_at(provider, Instant::now())
    }

    pub fn try_acquire_at(&self, provider: &str, now: Instant) -> bool {
        let mut windows = self.lock();
        let Some(window) = windows.get_mut(provider) else {
            return true;
        };

        if window.has_capacity(now) {
            window.calls.push_back(now);
            true
        } else {
            debug!(
                "Rate limit reached for {}: {}/{} in {:?}",
                provider,
                window.calls.len(),
                window.limit.max_calls,
                window.limit.window
            );
            false
        }
    }

    /// Calls still available in the current window, `None` if unlimited
    pub fn remaining(&self, provider: &str) -> Option<u32> {
        self.remaining_at(provider, Instant::now())
    }

    pub fn remaining_at(&self, provider: &str, now: Instant) -> Option<u32> {
        let mut windows = self.lock();
        let window = windows.get_mut(provider)?;
        window.prune(now);
        Some(
            window
                .limit
                .max_calls
                .saturating_sub(window.calls.len() as u32),
        )
    }

    /// Time until the next slot frees up, `None` if a call is allowed now
    pub fn retry_after(&self, provider: &str) -> Option<Duration> {
        self.retry_after_at(provider, Instant::now())
    }

    pub fn retry_after_at(&self, provider: &str, now: Instant) -> Option<Duration> {
        let mut windows = self.lock();
        let window = windows.get_mut(provider)?;
        if window.has_capacity(now) {
            return None;
        }
        // With max_calls == 0 there is never a slot to wait for
        let oldest = *window.calls.front()?;
        Some(window.limit.window - now.saturating_duration_since(oldest))
    }

    /// The configured quota for a provider
    pub fn limit(&self, provider: &str) -> Option<RateLimit> {
        self.lock().get(provider).map(|w| w.limit)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, ProviderWindow>> {
        // Every mutation leaves the map consistent, so a poisoned lock is still usable
        self.windows.lock().unwrap_or_else(|e| e.into_inner())
    }
}
