// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Provider health tracking
//!
//! A provider that rejects our credential is disabled for the rest of the
//! session. Repeated transient failures suspend it for a cooldown period.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::warn;

/// Current availability of one provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum HealthState {
    Healthy,
    /// Suspended after repeated transient failures
    CoolingDown { remaining_ms: u64 },
    /// Disabled for the session after an authentication failure
    Disabled { reason: String },
}

#[derive(Debug, Default)]
struct ProviderRecord {
    consecutive_failures: u32,
    cooldown_until: Option<Instant>,
    disabled: Option<String>,
}

/// Health registry shared by every query in a session
#[derive(Debug)]
pub struct ProviderHealth {
    records: Mutex<HashMap<String, ProviderRecord>>,
    failure_threshold: u32,
    cooldown: Duration,
}

impl Default for ProviderHealth {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(60))
    }
}

impl ProviderHealth {
    /// `failure_threshold` of zero turns cooldowns off
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            failure_threshold,
            cooldown,
        }
    }

    /// Whether the provider may be placed in the attempt order
    pub fn is_available(&self, provider: &str) -> bool {
        self.is_available_at(provider, Instant::now())
    }

    pub fn is_available_at(&self, provider: &str, now: Instant) -> bool {
        matches!(self.state_at(provider, now), HealthState::Healthy)
    }

    pub fn state(&self, provider: &str) -> HealthState {
        self.state_at(provider, Instant::now())
    }

    pub fn state_at(&self, provider: &str, now: Instant) -> HealthState {
        let records = self.lock();
        let Some(record) = records.get(provider) else {
            return HealthState::Healthy;
        };

        if let Some(reason) = &record.disabled {
            return HealthState::Disabled {
                reason: reason.clone(),
            };
        }

        match record.cooldown_until {
            Some(until) if now < until => HealthState::CoolingDown {
                remaining_ms: (until - now).as_millis() as u64,
            },
            _ => HealthState::Healthy,
        }
    }

    /// Disable a provider for the remainder of the session
    pub fn mark_auth_failure(&self, provider: &str, reason: &str) {
        warn!("Disabling search provider {} for this session: {}", provider, reason);
        self.lock()
            .entry(provider.to_string())
            .or_default()
            .disabled = Some(reason.to_string());
    }

    /// Count a transient failure, suspending the provider at the threshold
    pub fn record_transient_failure(&self, provider: &str) {
        self.record_transient_failure_at(provider, Instant::now());
    }

    pub fn record_transient_failure_at(&self, provider: &str, now: Instant) {
        let mut records = self.lock();
        let record = records.entry(provider.to_string()).or_default();
        record.consecutive_failures += 1;

        if self.failure_threshold > 0 && record.consecutive_failures >= self.failure_threshold {
            warn!(
                "Suspending search provider {} for {:?} after {} consecutive failures",
                provider, self.cooldown, record.consecutive_failures
            );
            record.cooldown_until = Some(now + self.cooldown);
            record.consecutive_failures = 0;
        }
    }

    /// Clear the failure streak after a successful call
    pub fn record_success(&self, provider: &str) {
        if let Some(record) = self.lock().get_mut(provider) {
            record.consecutive_failures = 0;
            record.cooldown_until = None;
        }
    }

    /// Forget everything known about a provider, re-enabling it
    pub fn reset(&self, provider: &str) {
        self.lock().remove(provider);
    }

    /// Providers with any non-healthy state
    pub fn snapshot(&self) -> Vec<(String, HealthState)> {
        let now = Instant::now();
        let names: Vec<String> = self.lock().keys().cloned().collect();
        let mut states: Vec<(String, HealthState)> = names
            .into_iter()
            .map(|name| {
                let state = self.state_at(&name, now);
                (name, state)
            })
            .filter(|(_, state)| *state != HealthState::Healthy)
            .collect();
        states.sort_by(|a, b| a.0.cmp(&b.0));
        states
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, ProviderRecord>> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }
}
