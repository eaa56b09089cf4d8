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

//! Scoping: carrying identity context across RPCs

use corvid_broker::ContentKind;
use corvid_client::{Request, RequestError};

/// Something that can mint a "scoped" request: one carrying context taken
/// from the server (who we are) or from an inbound request (session,
/// trace). The context string labels aggregate errors.
pub trait Scoper: Send + Sync {
    /// Scope name used to prefix error codes, eg the server name.
    fn context(&self) -> String;

    /// Mint a request preserving this scope, from an already-encoded
    /// payload.
    fn scoped_request(
        &self,
        service: &str,
        endpoint: &str,
        kind: ContentKind,
        payload: Vec<u8>,
    ) -> Result<Request, RequestError>;
}

/// A scoper whose session, trace and context are set explicitly.
#[derive(Debug, Clone, Default)]
pub struct ExplicitScoper {
    session_id: String,
    trace_id: String,
    context: String,
}

impl ExplicitScoper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_session_id(mut self, s: impl Into<String>) -> Self {
        self.session_id = s.into();
        self
    }

    pub fn set_trace_id(mut self, t: impl Into<String>) -> Self {
        self.trace_id = t.into();
        self
    }

    pub fn set_context(mut self, c: impl Into<String>) -> Self {
        self.context = c.into();
        self
    }
}

impl Scoper for ExplicitScoper {
    fn context(&self) -> String {
        self.context.clone()
    }

    fn scoped_request(
        &self,
        service: &str,
        endpoint: &str,
        kind: ContentKind,
        payload: Vec<u8>,
    ) -> Result<Request, RequestError> {
        let mut req = match kind {
            ContentKind::OctetStream => Request::new_proto(service, endpoint, payload)?,
            ContentKind::Json => Request::new_json(service, endpoint, payload)?,
        };
        req.set_session_id(self.session_id.clone());
        req.set_trace_id(self.trace_id.clone());
        Ok(req)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_scoper_stamps_session_and_trace() {
        let scoper = ExplicitScoper::new()
            .set_session_id("sess-1")
            .set_trace_id("trace-1")
            .set_context("com.corvid.caller");

        let req = scoper
            .scoped_request("svc", "ep", ContentKind::OctetStream, vec![])
            .unwrap();
        assert_eq!(req.session_id(), "sess-1");
        assert_eq!(req.trace_id(), "trace-1");
        assert_eq!(scoper.context(), "com.corvid.caller");
    }
}
