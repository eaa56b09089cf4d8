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

//! Platform error model
//!
//! Errors that cross service boundaries carry a kind from a closed set, a
//! dotted code, a description and free-form context. The kind determines the
//! HTTP code a bridge should surface. The [`ErrorTracker`] keeps per-code
//! counters that feed health checks.

mod error;
mod tracker;

pub use error::{ErrorKind, PlatformError};
pub use tracker::ErrorTracker;
