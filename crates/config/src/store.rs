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

//! The configuration tree itself

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::io::Read;
use std::sync::RwLock;
use std::time::SystemTime;

use serde_json::Value;
use tokio::sync::broadcast;

use crate::{ConfigError, ConfigValue};

struct StoreInner {
    root: Value,
    hash: String,
    loaded_at: Option<SystemTime>,
}

/// Configuration tree behind a read/write lock, with change broadcast.
///
/// Loading replaces the whole tree and notifies every subscriber; readers
/// take path snapshots so no lock is held while a subscriber reacts.
pub struct ConfigStore {
    inner: RwLock<StoreInner>,
    changes: broadcast::Sender<()>,
}

impl ConfigStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(16);
        Self {
            inner: RwLock::new(StoreInner {
                root: Value::Null,
                hash: String::new(),
                loaded_at: None,
            }),
            changes,
        }
    }

    /// Replace the tree with a JSON document read from `r`, then notify
    /// subscribers.
    pub fn load_from_reader<R: Read>(&self, mut r: R) -> Result<(), ConfigError> {
        let mut buf = String::new();
        r.read_to_string(&mut buf)?;
        let root: Value = serde_json::from_str(&buf)?;
        self.load_value(root);
        Ok(())
    }

    /// Replace the tree with an already-parsed document, then notify
    /// subscribers.
    pub fn load_value(&self, root: Value) {
        let mut hasher = DefaultHasher::new();
        root.to_string().hash(&mut hasher);
        let hash = format!("{:x}", hasher.finish());

        {
            let mut inner = self.inner.write().unwrap();
            inner.root = root;
            inner.hash = hash;
            inner.loaded_at = Some(SystemTime::now());
        }

        tracing::debug!("configuration reloaded");
        let _ = self.changes.send(());
    }

    /// Snapshot of the subtree at `path` (eg
    /// `&["corvid", "platform", "timeout", "min"]`).
    pub fn at_path(&self, path: &[&str]) -> ConfigValue {
        let inner = self.inner.read().unwrap();
        let mut node = &inner.root;
        for key in path {
            match node.get(key) {
                Some(next) => node = next,
                None => return ConfigValue::new(None),
            }
        }
        ConfigValue::new(Some(node.clone()))
    }

    /// Subscribe to change notifications. Fired after every load.
    pub fn subscribe_changes(&self) -> broadcast::Receiver<()> {
        self.changes.subscribe()
    }

    /// Hash of the loaded document and when it was loaded, for the
    /// config-loaded health check.
    pub fn last_loaded(&self) -> (String, Option<SystemTime>) {
        let inner = self.inner.read().unwrap();
        (inner.hash.clone(), inner.loaded_at)
    }
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_access() {
        let store = ConfigStore::new();
        store.load_value(serde_json::json!({
            "corvid": {
                "platform": {
                    "timeout": { "min": "10ms", "multiplier": 1.5 },
                    "request": { "concurrency": 20 }
                }
            }
        }));

        assert_eq!(
            store
                .at_path(&["corvid", "platform", "request", "concurrency"])
                .as_int(10),
            20
        );
        assert_eq!(
            store
                .at_path(&["corvid", "platform", "timeout", "multiplier"])
                .as_float(1.0),
            1.5
        );
        assert!(!store.at_path(&["corvid", "missing"]).exists());
    }

    #[tokio::test]
    async fn load_notifies_subscribers() {
        let store = ConfigStore::new();
        let mut rx = store.subscribe_changes();
        store.load_value(serde_json::json!({"a": 1}));
        assert!(rx.recv().await.is_ok());
    }

    #[test]
    fn last_loaded_tracks_hash() {
        let store = ConfigStore::new();
        let (hash, loaded) = store.last_loaded();
        assert!(hash.is_empty());
        assert!(loaded.is_none());

        store.load_value(serde_json::json!({"a": 1}));
        let (hash, loaded) = store.last_loaded();
        assert!(!hash.is_empty());
        assert!(loaded.is_some());
    }

    #[test]
    fn load_from_reader_rejects_bad_json() {
        let store = ConfigStore::new();
        assert!(store.load_from_reader("{nope".as_bytes()).is_err());
    }
}
