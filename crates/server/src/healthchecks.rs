// SPDX-License-Identifier: LGPL-2.1-or-later
// Copyright (C) 2025 Corvid Contributors
//
// This file is part of Corvid.
//
// Corvid is free software: you can redistribute it and/or modify
// it under the terms of the GNU Lesser General Public License as published by
// the Free Software Foundation, either version 2.1 of the License, or
// (at your option) any later version.
//
// Corvid is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public License
// along with Corvid. If not, see <https://www.gnu.org/licenses/>.

//! Health checks
//!
//! The registry only runs checks on demand (the `health` admin endpoint);
//! the subscriber that publishes results periodically is an external
//! collaborator. Built-in checks cover loaded config, sustained bad-role
//! errors, admission capacity and open circuits.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime};

use corvid_circuit_breaker::CircuitRegistry;
use corvid_config::ConfigStore;
use corvid_errors::ErrorTracker;
use corvid_proto::admin::HealthCheckResult;
use futures::future::BoxFuture;

use crate::tokens::TokenBuckets;

/// Outcome of one check: a data map plus pass/fail.
pub type CheckOutcome = (HashMap<String, String>, Result<(), String>);

/// A check is any async function producing an outcome.
pub type Checker = Arc<dyn Fn() -> BoxFuture<'static, CheckOutcome> + Send + Sync>;

pub const STANDARD_INTERVAL: Duration = Duration::from_secs(60);
pub const STANDARD_PRIORITY: u32 = 100;

/// One registered health check.
pub struct HealthCheck {
    pub id: String,
    pub interval: Duration,
    pub priority: u32,
    pub checker: Checker,
}

/// All health checks registered on this server.
pub struct HealthCheckRegistry {
    checks: RwLock<Vec<HealthCheck>>,
    config: Arc<ConfigStore>,
}

impl HealthCheckRegistry {
    pub fn new(config: Arc<ConfigStore>) -> Self {
        Self {
            checks: RwLock::new(Vec::new()),
            config,
        }
    }

    /// Register a check with the standard interval and priority.
    pub fn register(&self, id: &str, checker: Checker) {
        self.register_with_priority(id, checker, STANDARD_PRIORITY)
    }

    /// Register a check with a custom priority. Interval and priority may
    /// be overridden at `corvid.platform.healthcheck.<id>`.
    pub fn register_with_priority(&self, id: &str, checker: Checker, priority: u32) {
        let overrides = self
            .config
            .at_path(&["corvid", "platform", "healthcheck", id]);
        let interval = overrides
            .as_struct::<serde_json::Value>()
            .and_then(|v| v.get("intervalMs").and_then(|i| i.as_u64()))
            .map(Duration::from_millis)
            .unwrap_or(STANDARD_INTERVAL);
        let priority = overrides
            .as_struct::<serde_json::Value>()
            .and_then(|v| v.get("priority").and_then(|p| p.as_u64()))
            .map(|p| p as u32)
            .unwrap_or(priority);

        let mut checks = self.checks.write().unwrap();
        checks.push(HealthCheck {
            id: id.to_string(),
            interval,
            priority,
            checker,
        });
    }

    /// Run every check now, for the `health` admin endpoint.
    pub async fn run_all(&self) -> Vec<HealthCheckResult> {
        let checkers: Vec<(String, Checker)> = {
            let checks = self.checks.read().unwrap();
            checks
                .iter()
                .map(|c| (c.id.clone(), Arc::clone(&c.checker)))
                .collect()
        };

        let mut results = Vec::with_capacity(checkers.len());
        for (id, checker) in checkers {
            let (data, outcome) = checker().await;
            results.push(HealthCheckResult {
                id,
                healthy: outcome.is_ok(),
                error: outcome.err().unwrap_or_default(),
                data,
            });
        }
        results
    }

    pub fn len(&self) -> usize {
        self.checks.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Check that configuration was loaded at least once.
pub(crate) fn config_loaded_check(config: Arc<ConfigStore>) -> Checker {
    Arc::new(move || {
        let config = Arc::clone(&config);
        Box::pin(async move {
            let (hash, loaded_at) = config.last_loaded();
            let mut data = HashMap::new();
            data.insert("hash".to_string(), hash.clone());
            data.insert(
                "lastLoaded".to_string(),
                loaded_at
                    .map(|t| format!("{t:?}"))
                    .unwrap_or_else(|| "[never]".to_string()),
            );

            if hash.is_empty() || loaded_at.is_none() {
                (data, Err("Config not loaded".to_string()))
            } else {
                (data, Ok(()))
            }
        })
    })
}

/// Check for sustained service-to-service bad-role errors, self-clearing
/// the counters once a minute.
pub(crate) fn bad_role_check(tracker: Arc<ErrorTracker>) -> Checker {
    const CODE: &str = "com.corvid.kernel.auth.badrole";

    Arc::new(move || {
        let tracker = Arc::clone(&tracker);
        Box::pin(async move {
            let counters = tracker.get(CODE);

            let mut data = HashMap::new();
            let mut failing = Vec::new();
            let mut failed = 0;
            for (name, count) in counters {
                if count <= 5 {
                    continue;
                }
                failed += count;
                data.insert(name.clone(), count.to_string());
                failing.push(format!("{name}: {count}"));
            }

            // Self-clear so a burst does not keep the check failing forever
            if let Ok(elapsed) = SystemTime::now().duration_since(tracker.cleared()) {
                if elapsed > Duration::from_secs(60) {
                    tracker.clear(CODE, &[]);
                }
            }

            if failing.is_empty() {
                (data, Ok(()))
            } else {
                (
                    data,
                    Err(format!(
                        "{failed} failed calls in last minute to {} callers: {}",
                        failing.len(),
                        failing.join(", ")
                    )),
                )
            }
        })
    })
}

/// Check whether any caller has exhausted its admission tokens.
pub(crate) fn capacity_check(tokens: Arc<TokenBuckets>) -> Checker {
    Arc::new(move || {
        let tokens = Arc::clone(&tokens);
        Box::pin(async move {
            let mut capacity = 0usize;
            let mut offenders = Vec::new();
            for (caller, available, total) in tokens.snapshot().await {
                capacity += total;
                if available == 0 {
                    offenders.push(caller);
                }
            }

            let mut data = HashMap::new();
            data.insert("capacity".to_string(), capacity.to_string());
            data.insert("inflight".to_string(), tokens.inflight().to_string());

            if offenders.is_empty() {
                (data, Ok(()))
            } else {
                (
                    data,
                    Err(format!(
                        "Callers exceeding capacity: {}",
                        offenders.join(", ")
                    )),
                )
            }
        })
    })
}

/// Check for open client circuits.
pub(crate) fn circuit_check(breakers: Arc<CircuitRegistry>) -> Checker {
    Arc::new(move || {
        let breakers = Arc::clone(&breakers);
        Box::pin(async move { corvid_circuit_breaker::circuit_health(&breakers).await })
    })
}
