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

//! Corvid wire types
//!
//! Hand-maintained prost message definitions for everything that crosses the
//! broker: platform errors, trace events, discovery registration, failure
//! events and the thin admin endpoint payloads.
//!
//! Every message also derives serde so that the JSON content type can carry
//! the same payloads as the binary one.

#![allow(clippy::large_enum_variant)]

// Re-export prost_types for downstream test usage
pub use prost_types;

pub mod admin;
pub mod discovery;
pub mod error;
pub mod failure;
pub mod trace;
