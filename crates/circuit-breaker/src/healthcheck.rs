// SPDX-License-Identifier: LGPL-2.1-or-later
// Copyright (C) 2025 Corvid Contributors

//! Health check over the registry: reports any open circuit.

use std::collections::HashMap;

use crate::CircuitRegistry;

/// Returns a data map of open circuits and an error when any is open.
pub async fn circuit_health(
    registry: &CircuitRegistry,
) -> (HashMap<String, String>, Result<(), String>) {
    let open = registry.open_circuits().await;

    let mut data = HashMap::new();
    for key in &open {
        data.insert(key.clone(), "OPEN".to_string());
    }

    if open.is_empty() {
        (data, Ok(()))
    } else {
        (data, Err("Open Circuit".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corvid_config::ConfigStore;
    use corvid_errors::PlatformError;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn reports_open_circuits() {
        let registry = CircuitRegistry::new(Arc::new(ConfigStore::new()));
        let err = PlatformError::timeout("code", "desc");
        for _ in 0..100 {
            registry.result("com.corvid.down", "ep", Some(&err)).await;
        }

        let (data, result) = circuit_health(&registry).await;
        assert_eq!(data.get("com.corvid.down.ep").map(String::as_str), Some("OPEN"));
        assert!(result.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn healthy_when_all_closed() {
        let registry = CircuitRegistry::new(Arc::new(ConfigStore::new()));
        registry.result("com.corvid.up", "ep", None).await;

        let (data, result) = circuit_health(&registry).await;
        assert!(data.is_empty());
        assert!(result.is_ok());
    }
}
