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

//! Corvid: a microservices platform on a broker-based messaging fabric
//!
//! Services discover one another, route request/reply RPCs, publish and
//! subscribe to topics, and protect themselves from cascading failure.
//! The member crates are re-exported here; [`Platform`] wires them into
//! one explicitly-owned root context.

pub use corvid_broker as broker;
pub use corvid_circuit_breaker as circuit_breaker;
pub use corvid_client as client;
pub use corvid_config as config;
pub use corvid_errors as errors;
pub use corvid_multiclient as multiclient;
pub use corvid_proto as proto;
pub use corvid_server as server;

mod platform;

pub use platform::Platform;

// Re-export the types almost every service touches
pub use corvid_broker::{Broker, ContentKind, InMemoryBroker};
pub use corvid_client::{DefaultClient, Publication, Request};
pub use corvid_config::ConfigStore;
pub use corvid_errors::{ErrorKind, ErrorTracker, PlatformError};
pub use corvid_multiclient::MultiClient;
pub use corvid_server::{Endpoint, Server, ServerConfig, ServerOptions};
