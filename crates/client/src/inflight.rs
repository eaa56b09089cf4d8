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

//! Correlation map: request message id → reply channel
//!
//! One mutex, O(1) critical sections. An entry is inserted before the first
//! send and removed either when a matching reply arrives or when the caller
//! finalizes. A reply for an unknown id is the caller's retry or timeout
//! having already won; it is logged and dropped upstream.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use crate::response::Response;

/// Requests currently awaiting replies. Cheap to clone; all clones share
/// the same map.
#[derive(Clone, Default)]
pub(crate) struct Inflight {
    map: Arc<Mutex<HashMap<String, mpsc::Sender<Response>>>>,
}

impl Inflight {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Register the reply channel for a request message id.
    pub(crate) fn add(&self, message_id: &str, ch: mpsc::Sender<Response>) {
        let mut map = self.map.lock().unwrap();
        map.insert(message_id.to_string(), ch);
    }

    /// Take the channel for a reply's correlation id, removing the entry.
    pub(crate) fn take(&self, correlation_id: &str) -> Option<mpsc::Sender<Response>> {
        let mut map = self.map.lock().unwrap();
        map.remove(correlation_id)
    }

    /// Drop the entry for a request, closing its channel.
    pub(crate) fn remove(&self, message_id: &str) {
        let mut map = self.map.lock().unwrap();
        map.remove(message_id);
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, message_id: &str) -> bool {
        self.map.lock().unwrap().contains_key(message_id)
    }
}
