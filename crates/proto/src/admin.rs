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

//! Payloads for the thin admin endpoints every server registers
//! (`health`, `stats`, `loadedconfig`, `jsonschema`).

use serde::{Deserialize, Serialize};

#[derive(Clone, PartialEq, Serialize, Deserialize, ::prost::Message)]
pub struct HealthRequest {}

/// Outcome of one registered health check.
#[derive(Clone, PartialEq, Serialize, Deserialize, ::prost::Message)]
pub struct HealthCheckResult {
    #[prost(string, tag = "1")]
    pub id: ::prost::alloc::string::String,
    #[prost(bool, tag = "2")]
    pub healthy: bool,
    #[prost(string, tag = "3")]
    pub error: ::prost::alloc::string::String,
    #[prost(map = "string, string", tag = "4")]
    pub data: ::std::collections::HashMap<
        ::prost::alloc::string::String,
        ::prost::alloc::string::String,
    >,
}

#[derive(Clone, PartialEq, Serialize, Deserialize, ::prost::Message)]
pub struct HealthResponse {
    #[prost(message, repeated, tag = "1")]
    pub healthchecks: ::prost::alloc::vec::Vec<HealthCheckResult>,
}

#[derive(Clone, PartialEq, Serialize, Deserialize, ::prost::Message)]
pub struct StatsRequest {}

#[derive(Clone, PartialEq, Serialize, Deserialize, ::prost::Message)]
pub struct StatsResponse {
    #[prost(string, tag = "1")]
    pub service_name: ::prost::alloc::string::String,
    #[prost(uint64, tag = "2")]
    pub service_version: u64,
    #[prost(string, tag = "3")]
    pub instance_id: ::prost::alloc::string::String,
    /// Seconds since startup
    #[prost(int64, tag = "4")]
    pub uptime: i64,
    #[prost(uint64, tag = "5")]
    pub inflight_requests: u64,
    #[prost(uint32, tag = "6")]
    pub registered_endpoints: u32,
}

#[derive(Clone, PartialEq, Serialize, Deserialize, ::prost::Message)]
pub struct LoadedConfigRequest {}

#[derive(Clone, PartialEq, Serialize, Deserialize, ::prost::Message)]
pub struct LoadedConfigResponse {
    #[prost(string, tag = "1")]
    pub config_hash: ::prost::alloc::string::String,
    /// Unix seconds of the last successful load, 0 when never loaded
    #[prost(int64, tag = "2")]
    pub last_loaded: i64,
}

#[derive(Clone, PartialEq, Serialize, Deserialize, ::prost::Message)]
pub struct JsonSchemaRequest {
    /// Restrict to one endpoint, empty for all
    #[prost(string, tag = "1")]
    pub endpoint: ::prost::alloc::string::String,
}

/// Schema descriptor for one endpoint, derived from its declared protocols.
#[derive(Clone, PartialEq, Serialize, Deserialize, ::prost::Message)]
pub struct EndpointSchema {
    #[prost(string, tag = "1")]
    pub endpoint: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub request_type: ::prost::alloc::string::String,
    #[prost(string, tag = "3")]
    pub response_type: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, Serialize, Deserialize, ::prost::Message)]
pub struct JsonSchemaResponse {
    #[prost(message, repeated, tag = "1")]
    pub schemas: ::prost::alloc::vec::Vec<EndpointSchema>,
}
