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

//! Trace event emission
//!
//! Events ride the topic exchange as ordinary publications; whatever trace
//! collector is deployed subscribes to [`TRACE_TOPIC`]. Emission is fire
//! and forget, a trace must never fail a request.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use corvid_broker::Broker;
use corvid_proto::trace::TraceEvent;

use crate::publication::Publication;

/// Topic trace collectors subscribe to.
pub const TRACE_TOPIC: &str = "com.corvid.kernel.trace";

/// Publishes trace events on behalf of one client or server instance.
#[derive(Clone)]
pub struct Tracer {
    broker: Arc<dyn Broker>,
    instance_id: String,
}

impl Tracer {
    pub fn new(broker: Arc<dyn Broker>, instance_id: impl Into<String>) -> Self {
        Self {
            broker,
            instance_id: instance_id.into(),
        }
    }

    /// Publish one event. Failures are logged and swallowed.
    pub async fn send(&self, event: TraceEvent) {
        let publication = match Publication::new(TRACE_TOPIC, &event) {
            Ok(p) => p,
            Err(err) => {
                tracing::warn!(%err, "failed to build trace publication");
                return;
            }
        };
        if let Err(err) = self
            .broker
            .send_publication(&publication, &self.instance_id)
            .await
        {
            tracing::warn!(%err, "failed to publish trace event");
        }
    }
}

/// Wall-clock now in unix nanoseconds, the timestamp format trace events
/// carry.
pub fn now_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0)
}
