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

//! Platform error wire representation
//!
//! This is the payload carried on any reply whose `messageType` header is
//! `error`. The kind determines the HTTP code a bridge should surface.

use serde::{Deserialize, Serialize};

/// Wire form of a platform error.
#[derive(Clone, PartialEq, Serialize, Deserialize, ::prost::Message)]
pub struct PlatformError {
    /// Error kind, one of [`platform_error::ErrorType`]
    #[prost(enumeration = "platform_error::ErrorType", tag = "1")]
    pub error_type: i32,
    /// Dotted code, eg `com.corvid.kernel.platform.timeout`
    #[prost(string, tag = "2")]
    pub code: ::prost::alloc::string::String,
    /// Human readable description
    #[prost(string, tag = "3")]
    pub description: ::prost::alloc::string::String,
    /// Free-form context strings
    #[prost(string, repeated, tag = "4")]
    pub context: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
    /// HTTP code this error maps to
    #[prost(uint32, tag = "5")]
    pub http_code: u32,
}

pub mod platform_error {
    use serde::{Deserialize, Serialize};

    /// Closed set of error kinds understood platform-wide.
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
    pub enum ErrorType {
        InternalServerError = 0,
        BadRequest = 1,
        Forbidden = 2,
        BadResponse = 3,
        Timeout = 4,
        NotFound = 5,
        Conflict = 6,
        Unauthorized = 7,
        CircuitBroken = 8,
    }
}
