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

//! The broker trait and the message shapes it publishes

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::Delivery;

/// Errors raised by broker operations.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// The broker connection is down
    #[error("Broker not connected")]
    NotConnected,

    /// Declaring or binding a queue failed
    #[error("Queue operation failed for \"{0}\": {1}")]
    Queue(String, String),

    /// Publishing a message failed
    #[error("Publish failed: {0}")]
    Publish(String),

    /// The consume channel was closed by the backend
    #[error("Consume channel closed for \"{0}\"")]
    ConsumeClosed(String),
}

/// An outbound request, as the broker sees it. The client's request type
/// implements this; the broker only reads the routing surface.
pub trait RoutedRequest: Send + Sync {
    fn content_type(&self) -> &str;
    fn payload(&self) -> &[u8];
    fn service(&self) -> &str;
    fn endpoint(&self) -> &str;
    fn message_id(&self) -> &str;
    fn session_id(&self) -> &str;
    fn trace_id(&self) -> &str;
    fn trace_should_persist(&self) -> bool;
    fn parent_message_id(&self) -> &str;
    fn from(&self) -> &str;
    fn remote_addr(&self) -> &str;
    fn authorised(&self) -> bool;
}

/// An outbound response. `message_id` is the id of the request being
/// answered; the broker carries it as the correlation id. `reply_to` is the
/// requester's queue.
pub trait RoutedResponse: Send + Sync {
    fn content_type(&self) -> &str;
    fn payload(&self) -> &[u8];
    /// `reply`, `error` or `heartbeat`
    fn message_type(&self) -> &str;
    fn message_id(&self) -> &str;
    fn reply_to(&self) -> &str;
}

/// An outbound publication on the topic exchange.
pub trait RoutedPublication: Send + Sync {
    fn content_type(&self) -> &str;
    fn payload(&self) -> &[u8];
    fn topic(&self) -> &str;
    fn message_id(&self) -> &str;
    fn session_id(&self) -> &str;
}

/// An outbound heartbeat ping, routed straight to an instance queue.
pub trait RoutedHeartbeat: Send + Sync {
    /// Instance id of the target
    fn id(&self) -> &str;
    fn content_type(&self) -> &str;
    fn payload(&self) -> &[u8];
}

/// The messaging fabric, seen from the platform.
///
/// ## Contract
/// - `send_request` publishes on the request exchange with the full
///   platform header set; `reply_to` is the caller's instance id.
/// - `send_response` publishes on the reply exchange, routing key taken
///   from the response's `reply_to`.
/// - `send_publication` fans out on the topic exchange.
/// - `consume` declares the named auto-expiring queue, binds it to the
///   reply exchange under its own name, and yields deliveries until the
///   backend drops the channel.
/// - `bind_service` binds an existing queue to the request exchange with a
///   header match on `service` (self-bind).
/// - `bind_topic` binds an existing queue to the topic exchange.
///
/// Backends must be safe for concurrent use; the platform never holds locks
/// across these calls.
#[async_trait]
pub trait Broker: Send + Sync {
    async fn send_request(
        &self,
        req: &(dyn RoutedRequest + '_),
        instance_id: &str,
    ) -> Result<(), BrokerError>;

    async fn send_response(
        &self,
        rsp: &(dyn RoutedResponse + '_),
        instance_id: &str,
    ) -> Result<(), BrokerError>;

    async fn send_publication(
        &self,
        publication: &(dyn RoutedPublication + '_),
        instance_id: &str,
    ) -> Result<(), BrokerError>;

    async fn send_heartbeat(
        &self,
        hb: &(dyn RoutedHeartbeat + '_),
        instance_id: &str,
    ) -> Result<(), BrokerError>;

    async fn consume(&self, queue: &str) -> Result<mpsc::Receiver<Delivery>, BrokerError>;

    async fn bind_service(&self, service: &str, queue: &str) -> Result<(), BrokerError>;

    async fn bind_topic(&self, topic: &str, queue: &str) -> Result<(), BrokerError>;

    fn is_connected(&self) -> bool;

    async fn disconnect(&self);
}
