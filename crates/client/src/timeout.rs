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

//! Timeout oracle
//!
//! Computes the timeout for attempt `n` of a call from the SLA the target
//! endpoint publishes through discovery. The strategy is to always answer
//! immediately: an unknown pair gets the default, joins the known set, and
//! triggers a background SLA reload. Reloads keep previous values on
//! failure and only swap (and log) when the deep hash actually changed.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, RwLock, Weak};
use std::time::Duration;

use corvid_config::ConfigStore;

use crate::client::{DefaultClient, Options};

const DEFAULT_TIMEOUT: Duration = Duration::from_millis(2000);
const DEFAULT_MIN: &str = "10ms";
const DEFAULT_MAX: &str = "60s";
const DEFAULT_MULTIPLIER: f64 = 1.0;

/// How often SLAs are re-pulled from discovery in the background.
const RELOAD_INTERVAL: Duration = Duration::from_secs(30 * 60);

const DISCOVERY_SERVICE: &str = "com.corvid.kernel.discovery";

#[derive(Debug, Clone, PartialEq)]
struct Dial {
    min: Duration,
    max: Duration,
    multiplier: f64,
}

/// Per-endpoint timeout state, shared by every request the owning client
/// makes.
pub(crate) struct Timeout {
    /// service → endpoint → SLA-derived timeout, loaded on demand
    endpoints: RwLock<HashMap<String, HashMap<String, Duration>>>,
    dial: RwLock<Dial>,
    client: Weak<DefaultClient>,
    config: Arc<ConfigStore>,
}

impl Timeout {
    pub(crate) fn new(client: Weak<DefaultClient>, config: Arc<ConfigStore>) -> Arc<Self> {
        let timeout = Arc::new(Self {
            endpoints: RwLock::new(HashMap::new()),
            dial: RwLock::new(Dial {
                min: corvid_config::parse_duration(DEFAULT_MIN).unwrap(),
                max: corvid_config::parse_duration(DEFAULT_MAX).unwrap(),
                multiplier: DEFAULT_MULTIPLIER,
            }),
            client,
            config,
        });
        timeout.load_from_config();

        // Occasional background reload of SLAs
        let weak = Arc::downgrade(&timeout);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(RELOAD_INTERVAL);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(timeout) = weak.upgrade() else { return };
                timeout.reload_slas().await;
            }
        });

        // Keep watch on config updates
        let weak = Arc::downgrade(&timeout);
        let mut changes = timeout.config.subscribe_changes();
        tokio::spawn(async move {
            while changes.recv().await.is_ok() {
                let Some(timeout) = weak.upgrade() else { return };
                timeout.load_from_config();
            }
        });

        timeout
    }

    /// Timeout to use for one attempt. Unknown pairs answer with the
    /// default immediately and kick off a background reload.
    pub(crate) fn get(self: &Arc<Self>, service: &str, endpoint: &str, attempt: u32) -> Duration {
        let (base, known) = self.fetch_sla(service, endpoint);
        if !known {
            self.add(service, endpoint);
            let this = Arc::clone(self);
            tokio::spawn(async move {
                this.reload_slas().await;
            });
        }

        let dial = self.dial.read().unwrap().clone();

        // Linear relaxation per retry, then the configured bounds
        let scaled = base.as_secs_f64() * dial.multiplier * attempt as f64;
        let scaled = Duration::from_secs_f64(scaled.max(0.0));
        scaled.clamp(dial.min, dial.max)
    }

    fn fetch_sla(&self, service: &str, endpoint: &str) -> (Duration, bool) {
        let endpoints = self.endpoints.read().unwrap();
        if let Some(eps) = endpoints.get(service) {
            if let Some(sla) = eps.get(endpoint) {
                return (*sla, true);
            }
        }
        (DEFAULT_TIMEOUT, false)
    }

    fn add(&self, service: &str, endpoint: &str) {
        let mut endpoints = self.endpoints.write().unwrap();
        endpoints
            .entry(service.to_string())
            .or_default()
            .insert(endpoint.to_string(), DEFAULT_TIMEOUT);
    }

    fn load_from_config(&self) {
        let min = self
            .config
            .at_path(&["corvid", "platform", "timeout", "min"])
            .as_duration(DEFAULT_MIN);
        let max = self
            .config
            .at_path(&["corvid", "platform", "timeout", "max"])
            .as_duration(DEFAULT_MAX);
        let multiplier = self
            .config
            .at_path(&["corvid", "platform", "timeout", "multiplier"])
            .as_float(DEFAULT_MULTIPLIER);

        let next = Dial {
            min,
            max,
            multiplier,
        };

        // Any difference?
        {
            let dial = self.dial.read().unwrap();
            if *dial == next {
                return;
            }
        }

        *self.dial.write().unwrap() = next.clone();
        tracing::info!(
            min = ?next.min,
            max = ?next.max,
            multiplier = next.multiplier,
            "loaded timeout configuration"
        );
    }

    /// Pull fresh SLAs from discovery for every service we have tried to
    /// call. Values we cannot refresh keep their last known state.
    pub(crate) async fn reload_slas(&self) {
        let Some(client) = self.client.upgrade() else {
            return;
        };

        let known: Vec<String> = {
            let endpoints = self.endpoints.read().unwrap();
            endpoints.keys().cloned().collect()
        };

        let mut replacement: HashMap<String, HashMap<String, Duration>> = HashMap::new();
        for service in &known {
            tracing::debug!(service, "loading SLAs from discovery");
            let request = match crate::Request::new(
                DISCOVERY_SERVICE,
                "endpoints",
                &corvid_proto::discovery::EndpointsRequest {
                    service: service.clone(),
                },
            ) {
                Ok(r) => r,
                Err(err) => {
                    tracing::warn!(service, %err, "failed to build discovery request");
                    continue;
                }
            };

            let mut rsp = corvid_proto::discovery::EndpointsResponse::default();
            // Explicitly bounded, we are in no rush and must not loop back
            // through our own retry machinery during an outage.
            let opts = Options {
                retries: Some(0),
                timeout: Some(Duration::from_secs(5)),
            };
            if let Err(err) = client.req(request, &mut rsp, Some(opts)).await {
                tracing::warn!(service, %err, "discovery endpoints lookup failed");
                continue;
            }

            for ep in rsp.endpoints {
                let endpoint = ep
                    .fq_name
                    .strip_prefix(service.as_str())
                    .unwrap_or(&ep.fq_name)
                    .trim_start_matches('.');
                replacement
                    .entry(service.clone())
                    .or_default()
                    .insert(endpoint.to_string(), Duration::from_millis(ep.upper95 as u64));
            }
        }

        // Anything we started with but could not refresh keeps its last
        // known value (probably the default).
        {
            let endpoints = self.endpoints.read().unwrap();
            for (service, eps) in endpoints.iter() {
                for (endpoint, sla) in eps {
                    replacement
                        .entry(service.clone())
                        .or_default()
                        .entry(endpoint.clone())
                        .or_insert(*sla);
                }
            }

            // SLAs changed? If not, don't bother switching and logging.
            if hash_slas(&replacement) == hash_slas(&endpoints) {
                return;
            }
        }

        *self.endpoints.write().unwrap() = replacement;
        tracing::info!("loaded new SLAs from discovery");
    }
}

/// Order-independent deep hash of the SLA map.
fn hash_slas(m: &HashMap<String, HashMap<String, Duration>>) -> u64 {
    let mut services: Vec<_> = m.keys().collect();
    services.sort();

    let mut hasher = DefaultHasher::new();
    for service in services {
        service.hash(&mut hasher);
        let eps = &m[service];
        let mut names: Vec<_> = eps.keys().collect();
        names.sort();
        for name in names {
            name.hash(&mut hasher);
            eps[name].hash(&mut hasher);
        }
    }
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oracle() -> Arc<Timeout> {
        Timeout::new(Weak::new(), Arc::new(ConfigStore::new()))
    }

    #[tokio::test]
    async fn attempts_back_off_linearly_within_bounds() {
        let timeout = oracle();
        timeout.add("foo", "bar");
        timeout
            .endpoints
            .write()
            .unwrap()
            .get_mut("foo")
            .unwrap()
            .insert("bar".into(), Duration::from_secs(1));

        assert_eq!(timeout.get("foo", "bar", 1), Duration::from_secs(1));
        assert_eq!(timeout.get("foo", "bar", 2), Duration::from_secs(2));
        assert_eq!(timeout.get("foo", "bar", 3), Duration::from_secs(3));
        // Constrained by max
        assert_eq!(timeout.get("foo", "bar", 66), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn unknown_pair_gets_default_and_joins_known_set() {
        let timeout = oracle();
        assert_eq!(timeout.get("svc", "ep", 1), DEFAULT_TIMEOUT);
        assert_eq!(timeout.fetch_sla("svc", "ep"), (DEFAULT_TIMEOUT, true));
    }

    #[tokio::test]
    async fn config_bounds_apply() {
        let config = Arc::new(ConfigStore::new());
        config.load_value(serde_json::json!({
            "corvid": { "platform": { "timeout": {
                "min": "3s", "max": "4s", "multiplier": 1.0
            }}}
        }));
        let timeout = Timeout::new(Weak::new(), config);
        timeout.add("foo", "bar");
        timeout
            .endpoints
            .write()
            .unwrap()
            .get_mut("foo")
            .unwrap()
            .insert("bar".into(), Duration::from_secs(1));

        assert_eq!(timeout.get("foo", "bar", 1), Duration::from_secs(3));
        assert_eq!(timeout.get("foo", "bar", 66), Duration::from_secs(4));
    }

    #[tokio::test]
    async fn config_change_reapplies_dial_settings() {
        let config = Arc::new(ConfigStore::new());
        let timeout = Timeout::new(Weak::new(), Arc::clone(&config));

        config.load_value(serde_json::json!({
            "corvid": { "platform": { "timeout": { "multiplier": 2.0 }}}
        }));
        tokio::task::yield_now().await;

        timeout.add("foo", "bar");
        timeout
            .endpoints
            .write()
            .unwrap()
            .get_mut("foo")
            .unwrap()
            .insert("bar".into(), Duration::from_secs(1));
        assert_eq!(timeout.get("foo", "bar", 1), Duration::from_secs(2));
    }

    #[test]
    fn sla_hash_is_order_independent_and_value_sensitive() {
        let mut a: HashMap<String, HashMap<String, Duration>> = HashMap::new();
        a.entry("s1".into())
            .or_default()
            .insert("e1".into(), Duration::from_secs(1));
        a.entry("s2".into())
            .or_default()
            .insert("e2".into(), Duration::from_secs(2));

        let mut b: HashMap<String, HashMap<String, Duration>> = HashMap::new();
        b.entry("s2".into())
            .or_default()
            .insert("e2".into(), Duration::from_secs(2));
        b.entry("s1".into())
            .or_default()
            .insert("e1".into(), Duration::from_secs(1));

        assert_eq!(hash_slas(&a), hash_slas(&b));

        b.get_mut("s1")
            .unwrap()
            .insert("e1".into(), Duration::from_secs(9));
        assert_ne!(hash_slas(&a), hash_slas(&b));
    }
}
