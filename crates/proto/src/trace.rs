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

//! Trace event wire representation
//!
//! Events are published to the trace topic when a request carries a trace id
//! (or the probabilistic sampler mints one). `REQ`/`REP`/`ATTEMPT_TIMEOUT`
//! are emitted client side, `IN`/`OUT` server side.

use serde::{Deserialize, Serialize};

/// A single trace event in the life of a request.
#[derive(Clone, PartialEq, Serialize, Deserialize, ::prost::Message)]
pub struct TraceEvent {
    #[prost(enumeration = "trace_event::EventType", tag = "1")]
    pub event_type: i32,
    /// Unix nanoseconds at the moment of the event
    #[prost(int64, tag = "2")]
    pub timestamp: i64,
    #[prost(string, tag = "3")]
    pub trace_id: ::prost::alloc::string::String,
    #[prost(string, tag = "4")]
    pub message_id: ::prost::alloc::string::String,
    #[prost(string, tag = "5")]
    pub parent_message_id: ::prost::alloc::string::String,
    /// Calling service
    #[prost(string, tag = "6")]
    pub from: ::prost::alloc::string::String,
    /// Calling endpoint
    #[prost(string, tag = "7")]
    pub from_endpoint: ::prost::alloc::string::String,
    /// Destination as `service.endpoint`
    #[prost(string, tag = "8")]
    pub to: ::prost::alloc::string::String,
    #[prost(string, tag = "9")]
    pub hostname: ::prost::alloc::string::String,
    #[prost(string, tag = "10")]
    pub az: ::prost::alloc::string::String,
    /// Payload excerpt, currently unused
    #[prost(string, tag = "11")]
    pub payload: ::prost::alloc::string::String,
    /// Duration in nanoseconds, for REP/OUT/ATTEMPT_TIMEOUT events
    #[prost(int64, tag = "12")]
    pub duration: i64,
    #[prost(string, tag = "13")]
    pub error_code: ::prost::alloc::string::String,
    #[prost(string, tag = "14")]
    pub error_description: ::prost::alloc::string::String,
    /// Instance id of the server handling the request (IN/OUT only)
    #[prost(string, tag = "15")]
    pub handler_instance_id: ::prost::alloc::string::String,
    /// Whether the trace should be stored persistently
    #[prost(bool, tag = "16")]
    pub persistent_trace: bool,
}

pub mod trace_event {
    use serde::{Deserialize, Serialize};

    #[derive(
        Clone,
        Copy,
        Debug,
        PartialEq,
        Eq,
        Hash,
        PartialOrd,
        Ord,
        Serialize,
        Deserialize,
        ::prost::Enumeration,
    )]
    #[repr(i32)]
    pub enum EventType {
        /// Client sent a request
        Req = 0,
        /// Client processed a reply
        Rep = 1,
        /// One client attempt timed out (the call may still be retried)
        AttemptTimeout = 2,
        /// Server received a request
        In = 3,
        /// Server finished handling a request
        Out = 4,
    }
}
