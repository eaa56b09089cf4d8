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

//! Per-code error counters with context
//!
//! Health checks read these counters to detect sustained error rates and
//! decide when to self-clear based on the `cleared` timestamp.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::SystemTime;

fn counter_name(context: &[&str]) -> String {
    context.join(":")
}

struct TrackerInner {
    errors: HashMap<String, HashMap<String, u64>>,
    cleared: SystemTime,
}

/// Process-wide error counter map: code → (context tuple → count).
///
/// Owned by the platform root context and shared by reference; tests build
/// their own instance.
pub struct ErrorTracker {
    inner: RwLock<TrackerInner>,
}

impl ErrorTracker {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(TrackerInner {
                errors: HashMap::new(),
                cleared: SystemTime::now(),
            }),
        }
    }

    /// Increment the count for an error code under the given context.
    pub fn track(&self, code: &str, context: &[&str]) {
        let mut inner = self.inner.write().unwrap();
        let counter = counter_name(context);
        *inner
            .errors
            .entry(code.to_string())
            .or_default()
            .entry(counter)
            .or_insert(0) += 1;
    }

    /// Count for an error code. With context, the count for that exact
    /// context tuple; without, the sum across all contexts.
    pub fn count(&self, code: &str, context: &[&str]) -> u64 {
        let inner = self.inner.read().unwrap();
        let Some(counters) = inner.errors.get(code) else {
            return 0;
        };
        if context.is_empty() {
            counters.values().sum()
        } else {
            counters.get(&counter_name(context)).copied().unwrap_or(0)
        }
    }

    /// All counters for an error code, keyed by joined context.
    pub fn get(&self, code: &str) -> HashMap<String, u64> {
        let inner = self.inner.read().unwrap();
        inner.errors.get(code).cloned().unwrap_or_default()
    }

    /// Zero the counters for an error code, and stamp the cleared time.
    /// With context, only that context tuple is zeroed.
    pub fn clear(&self, code: &str, context: &[&str]) {
        let mut inner = self.inner.write().unwrap();
        inner.cleared = SystemTime::now();

        if !context.is_empty() {
            let counter = counter_name(context);
            if let Some(counters) = inner.errors.get_mut(code) {
                counters.insert(counter, 0);
            }
            return;
        }

        if let Some(counters) = inner.errors.get_mut(code) {
            for count in counters.values_mut() {
                *count = 0;
            }
        }
    }

    /// When any counter was last cleared.
    pub fn cleared(&self) -> SystemTime {
        self.inner.read().unwrap().cleared
    }
}

impl Default for ErrorTracker {
    fn default() -> Self {
        Self::new()
    }
}
