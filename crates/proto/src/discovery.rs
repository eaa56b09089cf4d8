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

//! Discovery service wire types
//!
//! `MultiRequest` is the batch registration sent on `multiregister` and
//! `unregister`. `EndpointsRequest`/`EndpointsResponse` back the SLA reload
//! in the client timeout oracle.

use serde::{Deserialize, Serialize};

/// Metadata describing a service as a whole.
#[derive(Clone, PartialEq, Serialize, Deserialize, ::prost::Message)]
pub struct Service {
    #[prost(string, tag = "1")]
    pub name: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub description: ::prost::alloc::string::String,
    /// Release timestamp
    #[prost(uint64, tag = "3")]
    pub version: u64,
    /// URL of the source code
    #[prost(string, tag = "4")]
    pub source: ::prost::alloc::string::String,
    #[prost(string, tag = "5")]
    pub owner_email: ::prost::alloc::string::String,
    #[prost(string, tag = "6")]
    pub owner_mobile: ::prost::alloc::string::String,
    #[prost(string, tag = "7")]
    pub owner_team: ::prost::alloc::string::String,
}

/// One endpoint inside a batch registration.
#[derive(Clone, PartialEq, Serialize, Deserialize, ::prost::Message)]
pub struct RegisterEndpoint {
    #[prost(string, tag = "1")]
    pub name: ::prost::alloc::string::String,
    /// Mean response time promised, milliseconds
    #[prost(int32, tag = "2")]
    pub mean: i32,
    /// 95th percentile response time promised, milliseconds
    #[prost(int32, tag = "3")]
    pub upper95: i32,
    /// Topic this endpoint subscribes to, empty when none
    #[prost(string, tag = "4")]
    pub subscribe: ::prost::alloc::string::String,
}

/// Batch registration of every local endpoint with the discovery service.
#[derive(Clone, PartialEq, Serialize, Deserialize, ::prost::Message)]
pub struct MultiRequest {
    #[prost(string, tag = "1")]
    pub instance_id: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub hostname: ::prost::alloc::string::String,
    #[prost(string, tag = "3")]
    pub machine_class: ::prost::alloc::string::String,
    #[prost(string, tag = "4")]
    pub az_name: ::prost::alloc::string::String,
    #[prost(message, optional, tag = "5")]
    pub service: ::core::option::Option<Service>,
    #[prost(message, repeated, tag = "6")]
    pub endpoints: ::prost::alloc::vec::Vec<RegisterEndpoint>,
}

/// Response to `multiregister`/`unregister`.
#[derive(Clone, PartialEq, Serialize, Deserialize, ::prost::Message)]
pub struct RegisterResponse {}

/// Ask the discovery service for the published endpoints of one service.
#[derive(Clone, PartialEq, Serialize, Deserialize, ::prost::Message)]
pub struct EndpointsRequest {
    #[prost(string, tag = "1")]
    pub service: ::prost::alloc::string::String,
}

/// Published latency figures for one endpoint.
#[derive(Clone, PartialEq, Serialize, Deserialize, ::prost::Message)]
pub struct EndpointSla {
    /// Fully qualified name, `<service>.<endpoint>`
    #[prost(string, tag = "1")]
    pub fq_name: ::prost::alloc::string::String,
    #[prost(uint32, tag = "2")]
    pub mean: u32,
    #[prost(uint32, tag = "3")]
    pub upper95: u32,
}

#[derive(Clone, PartialEq, Serialize, Deserialize, ::prost::Message)]
pub struct EndpointsResponse {
    #[prost(message, repeated, tag = "1")]
    pub endpoints: ::prost::alloc::vec::Vec<EndpointSla>,
}
