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

//! Failure publications
//!
//! Panics publish a structured [`FailureEvent`] to the monitoring failure
//! topic. Handler INTERNAL_SERVER errors publish a JSON event to the
//! errors topic for monitoring to aggregate.

use std::time::{SystemTime, UNIX_EPOCH};

use corvid_client::{publish, Client, Publication};
use corvid_errors::PlatformError;
use corvid_proto::failure::FailureEvent;

use crate::request::ServerRequest;
use crate::server::ServerInfo;

/// Topic panics are reported on.
pub const FAILURE_TOPIC: &str = "com.corvid.monitor.failure";

/// Topic handler errors are reported on.
pub const ERROR_TOPIC: &str = "errors";

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Publish a panic event. The delivery that caused it is dropped, not
/// retried; processing continues.
pub(crate) async fn publish_failure(client: &dyn Client, info: &ServerInfo, reason: &str) {
    let event = FailureEvent {
        service_name: info.name.clone(),
        service_version: info.version,
        az_name: info.az.clone(),
        hostname: info.hostname.clone(),
        instance_id: info.instance_id.clone(),
        timestamp: unix_now(),
        uptime: info.uptime_seconds(),
        failure_type: "PANIC".to_string(),
        reason: reason.to_string(),
        stack: std::backtrace::Backtrace::force_capture().to_string(),
    };

    if let Err(err) = publish(client, FAILURE_TOPIC, &event).await {
        tracing::error!(%err, "failed to publish failure event");
    }
}

/// Publish a handler error event as JSON.
pub(crate) async fn publish_error(
    client: &dyn Client,
    info: &ServerInfo,
    req: &ServerRequest,
    e: &PlatformError,
) {
    let user_id = req
        .scope()
        .auth_user()
        .map(|u| u.id.clone())
        .unwrap_or_default();
    let application = req
        .scope()
        .auth_user()
        .map(|u| u.application.clone())
        .unwrap_or_default();
    let stacktrace = e
        .backtrace()
        .map(|b| b.to_string())
        .unwrap_or_default();

    let msg = serde_json::json!({
        "created": unix_now(),
        "service": info.name,
        "version": info.version,
        "azName": info.az,
        "hostname": info.hostname,
        "instanceId": info.instance_id,
        "error": e.to_string(),
        "type": e.kind().as_str(),
        "code": e.code(),
        "description": e.description(),
        "httpCode": e.http_code(),
        "context": e.context(),
        "userId": user_id,
        "application": application,
        "traceId": req.trace_id(),
        "remoteAddr": req.remote_addr(),
        "stacktrace": stacktrace,
    });

    let payload = match serde_json::to_vec(&msg) {
        Ok(p) => p,
        Err(err) => {
            tracing::error!(%err, "failed to encode error event");
            return;
        }
    };

    let publication = match Publication::new_json(ERROR_TOPIC, payload) {
        Ok(p) => p,
        Err(err) => {
            tracing::error!(%err, "failed to build error publication");
            return;
        }
    };
    if let Err(err) = client.publish(publication).await {
        tracing::error!(%err, "failed to publish error event");
    }
}
