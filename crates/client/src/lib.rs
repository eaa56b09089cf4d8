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

//! RPC client core
//!
//! Sends requests over the broker's request exchange, listens for replies on
//! this client's private queue, and correlates them back to callers. Each
//! attempt is gated by the circuit breaker registry and bounded by the
//! adaptive timeout oracle; timeouts are retried, decoded errors are not.

mod client;
mod inflight;
mod mock_client;
mod publication;
mod request;
mod response;
mod timeout;
pub mod trace;
pub mod util;

pub use client::{publish, req, Client, DefaultClient, Options};
pub use mock_client::MockClient;
pub use publication::Publication;
pub use request::{Request, RequestError};
pub use response::Response;
pub use trace::Tracer;
