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

//! Structured failure event, published to the monitoring failure topic when
//! a handler panics.

use serde::{Deserialize, Serialize};

#[derive(Clone, PartialEq, Serialize, Deserialize, ::prost::Message)]
pub struct FailureEvent {
    #[prost(string, tag = "1")]
    pub service_name: ::prost::alloc::string::String,
    #[prost(uint64, tag = "2")]
    pub service_version: u64,
    #[prost(string, tag = "3")]
    pub az_name: ::prost::alloc::string::String,
    #[prost(string, tag = "4")]
    pub hostname: ::prost::alloc::string::String,
    #[prost(string, tag = "5")]
    pub instance_id: ::prost::alloc::string::String,
    /// Unix seconds
    #[prost(int64, tag = "6")]
    pub timestamp: i64,
    /// Seconds since the service started
    #[prost(int64, tag = "7")]
    pub uptime: i64,
    /// Failure classification, eg `PANIC`
    #[prost(string, tag = "8")]
    pub failure_type: ::prost::alloc::string::String,
    #[prost(string, tag = "9")]
    pub reason: ::prost::alloc::string::String,
    #[prost(string, tag = "10")]
    pub stack: ::prost::alloc::string::String,
}
