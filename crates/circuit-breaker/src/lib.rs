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

//! Circuit breakers
//!
//! Stops a client from calling an endpoint that is failing, so one service
//! cannot overwhelm another that is already in a bad state. Breakers trip on
//! failure rate over a minimum sample count and recover through an
//! exponential-backoff half-open probe.
//!
//! The open/result fast path takes only a read lock on the registry; the
//! write lock is taken to lazily create a breaker or to apply new
//! configuration.

mod circuit;
mod healthcheck;
mod registry;

pub use circuit::{Circuit, Options};
pub use healthcheck::circuit_health;
pub use registry::CircuitRegistry;
