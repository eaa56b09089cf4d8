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

//! Multi-client fan-out
//!
//! A session-scoped container for N parallel RPCs identified by
//! caller-supplied uids. The container never talks to the broker itself:
//! it hands prepared requests to a [`Caller`], which is the platform
//! client by default and a mock or an HTTP bridge in tests.

mod caller;
mod error_caller;
mod errors;
mod http_caller;
mod mock_caller;
mod multiclient;
mod scoper;

pub use caller::{platform_caller, Caller, CallerFuture, CallerResponse};
pub use error_caller::error_caller;
pub use errors::Errors;
pub use http_caller::{configured_http_caller, http_caller, HttpCallerOptions};
pub use mock_caller::{Mock, Responder, StubHandle};
pub use multiclient::{call, MultiClient, ScopedReq};
pub use scoper::{ExplicitScoper, Scoper};
