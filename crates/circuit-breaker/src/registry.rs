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

//! Registry of circuits keyed by (service, endpoint)
//!
//! Circuits are created lazily on first lookup with options resolved from
//! configuration (defaults, then the global override, then the per-endpoint
//! override at `corvid.platform.circuitbreaker.endpoints.<service>.<endpoint>`).
//! A configuration change rebuilds every known circuit.

use std::collections::HashMap;
use std::sync::Arc;

use corvid_config::ConfigStore;
use corvid_errors::PlatformError;
use tokio::sync::RwLock;

use crate::circuit::{Circuit, Options, OptionsPatch};

const CONFIG_PATH: &[&str] = &["corvid", "platform", "circuitbreaker"];

/// All circuits for one process, plus the configuration they derive from.
///
/// ## Design
/// - **Read-fast lookup**: the common path takes only the read lock
/// - **Lazy creation**: a miss promotes to the write lock with a double
///   check, so two racing callers agree on one circuit
/// - **Hot reload**: configuration changes rebuild every known circuit;
///   unseen keys pick up the new options on first lookup
pub struct CircuitRegistry {
    circuits: RwLock<HashMap<(String, String), Arc<Circuit>>>,
    config: Arc<ConfigStore>,
}

impl CircuitRegistry {
    /// Create a registry and start watching configuration changes.
    pub fn new(config: Arc<ConfigStore>) -> Arc<Self> {
        let registry = Arc::new(Self {
            circuits: RwLock::new(HashMap::new()),
            config,
        });

        let weak = Arc::downgrade(&registry);
        let mut changes = registry.config.subscribe_changes();
        tokio::spawn(async move {
            while changes.recv().await.is_ok() {
                let Some(registry) = weak.upgrade() else {
                    return;
                };
                registry.reload_from_config().await;
            }
        });

        registry
    }

    /// Whether the circuit for this endpoint is open (caller must not
    /// attempt a request).
    pub async fn open(&self, service: &str, endpoint: &str) -> bool {
        self.circuit(service, endpoint).await.open().await
    }

    /// Report a call outcome to the right circuit. `None` is success.
    pub async fn result(&self, service: &str, endpoint: &str, err: Option<&PlatformError>) {
        self.circuit(service, endpoint).await.result(err).await
    }

    /// Keys of every currently-open circuit, as `service.endpoint`.
    pub async fn open_circuits(&self) -> Vec<String> {
        let circuits = {
            let guard = self.circuits.read().await;
            guard
                .iter()
                .map(|(k, v)| (k.clone(), Arc::clone(v)))
                .collect::<Vec<_>>()
        };

        let mut open = Vec::new();
        for ((service, endpoint), circuit) in circuits {
            if circuit.open().await {
                open.push(format!("{service}.{endpoint}"));
            }
        }
        open
    }

    async fn circuit(&self, service: &str, endpoint: &str) -> Arc<Circuit> {
        {
            let circuits = self.circuits.read().await;
            if let Some(c) = circuits.get(&(service.to_string(), endpoint.to_string())) {
                return Arc::clone(c);
            }
        }

        let mut circuits = self.circuits.write().await;
        // Double check, someone else may have created it while we waited
        // for the write lock.
        let key = (service.to_string(), endpoint.to_string());
        if let Some(c) = circuits.get(&key) {
            return Arc::clone(c);
        }

        let circuit = Arc::new(Circuit::new(self.options_for(service, endpoint)));
        circuits.insert(key, Arc::clone(&circuit));
        circuit
    }

    fn options_for(&self, service: &str, endpoint: &str) -> Options {
        let mut opts = Options::default();
        if let Some(patch) = self.config.at_path(CONFIG_PATH).as_struct::<OptionsPatch>() {
            opts.apply(&patch);
        }
        let endpoint_path: Vec<&str> = CONFIG_PATH
            .iter()
            .copied()
            .chain(["endpoints", service, endpoint])
            .collect();
        if let Some(patch) = self
            .config
            .at_path(&endpoint_path)
            .as_struct::<OptionsPatch>()
        {
            opts.apply(&patch);
        }
        tracing::debug!(service, endpoint, ?opts, "circuit options resolved");
        opts
    }

    async fn reload_from_config(&self) {
        let mut circuits = self.circuits.write().await;
        for ((service, endpoint), circuit) in circuits.iter_mut() {
            *circuit = Arc::new(Circuit::new(self.options_for(service, endpoint)));
        }
        tracing::info!(count = circuits.len(), "circuit breakers reloaded");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::advance;

    fn timeout_err() -> PlatformError {
        PlatformError::timeout("code", "description")
    }

    async fn trip(registry: &CircuitRegistry, service: &str, endpoint: &str) {
        for _ in 0..100 {
            registry.result(service, endpoint, Some(&timeout_err())).await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn lazily_creates_closed_circuits() {
        let registry = CircuitRegistry::new(Arc::new(ConfigStore::new()));
        assert!(!registry.open("com.corvid.test", "anything").await);
    }

    #[tokio::test(start_paused = true)]
    async fn per_endpoint_config_overrides_global() {
        let config = Arc::new(ConfigStore::new());
        config.load_value(serde_json::json!({
            "corvid": { "platform": { "circuitbreaker": {
                "initialIntervalMs": 50,
                "endpoints": {
                    "com.corvid.test": {
                        "testendpoint": { "initialIntervalMs": 90 }
                    }
                }
            }}}
        }));
        let registry = CircuitRegistry::new(config);
        let (service, endpoint) = ("com.corvid.test", "testendpoint");

        assert!(!registry.open(service, endpoint).await);
        trip(&registry, service, endpoint).await;
        assert!(registry.open(service, endpoint).await);

        advance(Duration::from_millis(51)).await;
        assert!(
            registry.open(service, endpoint).await,
            "circuit should be open after 51ms"
        );
        advance(Duration::from_millis(40)).await;
        assert!(
            !registry.open(service, endpoint).await,
            "circuit should be closed after 91ms"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn global_config_applies_to_unseen_endpoints() {
        let config = Arc::new(ConfigStore::new());
        config.load_value(serde_json::json!({
            "corvid": { "platform": { "circuitbreaker": {
                "initialIntervalMs": 100
            }}}
        }));
        let registry = CircuitRegistry::new(config);

        trip(&registry, "com.corvid.test", "other").await;
        assert!(registry.open("com.corvid.test", "other").await);

        advance(Duration::from_millis(51)).await;
        assert!(registry.open("com.corvid.test", "other").await);
        advance(Duration::from_millis(50)).await;
        assert!(!registry.open("com.corvid.test", "other").await);
    }

    #[tokio::test(start_paused = true)]
    async fn config_change_rebuilds_known_circuits() {
        let config = Arc::new(ConfigStore::new());
        let registry = CircuitRegistry::new(Arc::clone(&config));

        trip(&registry, "com.corvid.test", "ep").await;
        assert!(registry.open("com.corvid.test", "ep").await);

        config.load_value(serde_json::json!({
            "corvid": { "platform": { "circuitbreaker": { "initialIntervalMs": 90 }}}
        }));
        // Let the subscription task run
        tokio::task::yield_now().await;

        // Rebuilt circuits start closed again
        assert!(!registry.open("com.corvid.test", "ep").await);
    }

    #[tokio::test(start_paused = true)]
    async fn open_circuits_lists_tripped_keys() {
        let registry = CircuitRegistry::new(Arc::new(ConfigStore::new()));

        trip(&registry, "com.corvid.a", "x").await;
        registry.result("com.corvid.b", "y", None).await;

        let open = registry.open_circuits().await;
        assert_eq!(open, vec!["com.corvid.a.x".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn client_errors_count_as_success() {
        let registry = CircuitRegistry::new(Arc::new(ConfigStore::new()));

        // The client reports None for client-caused errors, so a flood of
        // bad requests must not trip the circuit.
        for _ in 0..200 {
            registry.result("com.corvid.test", "ep", None).await;
        }
        assert!(!registry.open("com.corvid.test", "ep").await);
    }
}
