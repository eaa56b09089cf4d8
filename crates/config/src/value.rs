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

//! Typed view over one node of the configuration tree

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;

/// A snapshot of one subtree, returned by `ConfigStore::at_path`. All
/// accessors fall back to the supplied default when the node is absent or
/// of the wrong shape.
#[derive(Debug, Clone)]
pub struct ConfigValue {
    value: Option<Value>,
}

impl ConfigValue {
    pub(crate) fn new(value: Option<Value>) -> Self {
        Self { value }
    }

    pub fn exists(&self) -> bool {
        self.value.is_some()
    }

    pub fn as_int(&self, default: i64) -> i64 {
        self.value
            .as_ref()
            .and_then(Value::as_i64)
            .unwrap_or(default)
    }

    pub fn as_float(&self, default: f64) -> f64 {
        self.value
            .as_ref()
            .and_then(Value::as_f64)
            .unwrap_or(default)
    }

    pub fn as_bool(&self, default: bool) -> bool {
        self.value
            .as_ref()
            .and_then(Value::as_bool)
            .unwrap_or(default)
    }

    pub fn as_string(&self, default: &str) -> String {
        self.value
            .as_ref()
            .and_then(Value::as_str)
            .unwrap_or(default)
            .to_string()
    }

    /// Duration from either a `"250ms"`-style string or a plain number of
    /// milliseconds. The default is itself a duration string and must parse.
    pub fn as_duration(&self, default: &str) -> Duration {
        match self.value.as_ref() {
            Some(Value::String(s)) => {
                parse_duration(s).unwrap_or_else(|| parse_duration(default).unwrap_or_default())
            }
            Some(Value::Number(n)) => n
                .as_u64()
                .map(Duration::from_millis)
                .unwrap_or_else(|| parse_duration(default).unwrap_or_default()),
            _ => parse_duration(default).unwrap_or_default(),
        }
    }

    /// Deserialize this node into a struct. Returns `None` when the node is
    /// absent or does not match, so callers can overlay partial configs onto
    /// defaults.
    pub fn as_struct<T: DeserializeOwned>(&self) -> Option<T> {
        let value = self.value.as_ref()?;
        serde_json::from_value(value.clone()).ok()
    }
}

/// Parse durations of the form `150ms`, `10s`, `2m`, `1h` or a bare number
/// of milliseconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(ms) = s.parse::<u64>() {
        return Some(Duration::from_millis(ms));
    }
    let split = s.find(|c: char| !c.is_ascii_digit())?;
    let (num, unit) = s.split_at(split);
    let num = num.parse::<u64>().ok()?;
    match unit {
        "ms" => Some(Duration::from_millis(num)),
        "s" => Some(Duration::from_secs(num)),
        "m" => Some(Duration::from_secs(num * 60)),
        "h" => Some(Duration::from_secs(num * 3600)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_unit_suffixes() {
        assert_eq!(parse_duration("10ms"), Some(Duration::from_millis(10)));
        assert_eq!(parse_duration("60s"), Some(Duration::from_secs(60)));
        assert_eq!(parse_duration("2m"), Some(Duration::from_secs(120)));
        assert_eq!(parse_duration("1h"), Some(Duration::from_secs(3600)));
        assert_eq!(parse_duration("250"), Some(Duration::from_millis(250)));
        assert_eq!(parse_duration("abc"), None);
        assert_eq!(parse_duration(""), None);
    }

    #[test]
    fn missing_value_uses_defaults() {
        let v = ConfigValue::new(None);
        assert!(!v.exists());
        assert_eq!(v.as_int(10), 10);
        assert_eq!(v.as_float(0.5), 0.5);
        assert_eq!(v.as_duration("2s"), Duration::from_secs(2));
    }

    #[test]
    fn typed_access() {
        let v = ConfigValue::new(Some(serde_json::json!(42)));
        assert_eq!(v.as_int(0), 42);

        let v = ConfigValue::new(Some(serde_json::json!("30s")));
        assert_eq!(v.as_duration("1ms"), Duration::from_secs(30));

        let v = ConfigValue::new(Some(serde_json::json!(100)));
        assert_eq!(v.as_duration("1ms"), Duration::from_millis(100));
    }
}
