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

//! Server side of the Corvid platform
//!
//! Hosts endpoints behind the broker: inbound deliveries are classified,
//! unmarshaled, pushed through the middleware chain and answered. A
//! background discovery loop keeps the instance registered; graceful
//! shutdown drains in-flight handlers before unregistering.

pub mod auth;
mod authoriser;
mod discovery;
mod endpoint;
mod failure;
mod handlers;
pub mod healthchecks;
mod heartbeat;
mod middleware;
mod registry;
mod request;
mod response;
mod scoper;
mod server;
mod tokens;
mod waitgroup;

pub use authoriser::{
    bad_role_error, default_authoriser, open_to_the_world_authoriser, role_authoriser,
    sign_in_authoriser, sign_in_role_authoriser, Authoriser,
};
pub use endpoint::{Endpoint, EndpointBuilder, Handler, HandlerReply, Middleware, ProtocolDescriptor};
pub use failure::{ERROR_TOPIC, FAILURE_TOPIC};
pub use registry::{Registry, RegistryError};
pub use request::ServerRequest;
pub use response::ServerResponse;
pub use scoper::{request_scoped_request, scoped_request, ServerScoper};
pub use server::{Server, ServerConfig, ServerError, ServerInfo, ServerOptions};
pub use tokens::TokenBuckets;
pub use waitgroup::WaitGroup;
