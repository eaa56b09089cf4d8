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

//! Broker contract
//!
//! Everything the platform needs from the messaging fabric, expressed as a
//! dyn trait so backends are pluggable: three exchanges by convention
//! (request, reply-direct, topic), named queues, per-message headers,
//! correlation id, reply-to and transient delivery.
//!
//! The crate ships an [`InMemoryBroker`] for tests and single-process use;
//! a real AMQP driver implements the same trait out of tree.

mod broker;
pub mod codec;
mod in_memory;
mod message;

pub use broker::{
    Broker, BrokerError, RoutedHeartbeat, RoutedPublication, RoutedRequest, RoutedResponse,
};
pub use in_memory::InMemoryBroker;
pub use message::{ContentKind, Delivery};

/// Default request exchange. Servers bind their queue here with a header
/// match on `service`.
pub const EXCHANGE: &str = "corvid";

/// Direct exchange replies are routed on, keyed by the caller's instance id.
pub const REPLY_EXCHANGE: &str = "corvid.direct";

/// Fan-out topic exchange for publications.
pub const TOPIC_EXCHANGE: &str = "corvid.topic";

/// Milliseconds a message may sit unconsumed on a reply queue.
pub const REPLY_QUEUE_TTL_MS: u32 = 5_000;

/// Milliseconds an idle reply queue survives before the broker drops it.
pub const REPLY_QUEUE_EXPIRES_MS: u32 = 30_000;
