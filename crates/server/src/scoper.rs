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

//! Server-side scoping of outbound requests
//!
//! Requests this server makes on its own behalf carry its name and are
//! pre-authorised (service-to-service). Requests made while handling an
//! inbound request additionally propagate session, trace and parentage
//! so the call hierarchy survives across hops.

use std::sync::Arc;

use corvid_broker::ContentKind;
use corvid_client::{Request, RequestError};
use corvid_multiclient::Scoper;

use crate::request::ServerRequest;

/// Stamp an outbound request with this server's own scope.
pub fn scoped_request(
    server_name: &str,
    service: &str,
    endpoint: &str,
    kind: ContentKind,
    payload: Vec<u8>,
) -> Result<Request, RequestError> {
    let mut req = match kind {
        ContentKind::OctetStream => Request::new_proto(service, endpoint, payload)?,
        ContentKind::Json => Request::new_json(service, endpoint, payload)?,
    };
    req.set_from(server_name);
    req.set_authorised(true);
    Ok(req)
}

/// Stamp an outbound request with everything an inbound request carried:
/// session, trace, parent message id, remote address, plus who WE are.
pub fn request_scoped_request(
    server_name: &str,
    parent: &ServerRequest,
    service: &str,
    endpoint: &str,
    kind: ContentKind,
    payload: Vec<u8>,
) -> Result<Request, RequestError> {
    let mut req = match kind {
        ContentKind::OctetStream => Request::new_proto(service, endpoint, payload)?,
        ContentKind::Json => Request::new_json(service, endpoint, payload)?,
    };

    if !parent.session_id().is_empty() {
        req.set_session_id(parent.session_id());
    } else if let Some(user) = parent.scope().auth_user() {
        req.set_session_id(user.session_id.clone());
    }
    req.set_trace_id(parent.trace_id());
    req.set_trace_should_persist(parent.trace_should_persist());
    req.set_parent_message_id(parent.message_id());
    req.set_remote_addr(parent.remote_addr());

    // Who WE are, not who sent it to us
    req.set_from(server_name);
    req.set_from_endpoint(parent.endpoint());
    req.set_authorised(parent.scope().authorised());

    Ok(req)
}

/// A [`Scoper`] for this server, optionally tied to a parent request.
pub struct ServerScoper {
    name: String,
    parent: Option<Arc<ServerRequest>>,
}

impl ServerScoper {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
        }
    }

    pub fn for_request(name: impl Into<String>, parent: Arc<ServerRequest>) -> Self {
        Self {
            name: name.into(),
            parent: Some(parent),
        }
    }
}

impl Scoper for ServerScoper {
    fn context(&self) -> String {
        self.name.clone()
    }

    fn scoped_request(
        &self,
        service: &str,
        endpoint: &str,
        kind: ContentKind,
        payload: Vec<u8>,
    ) -> Result<Request, RequestError> {
        match &self.parent {
            Some(parent) => {
                let mut req =
                    request_scoped_request(&self.name, parent, service, endpoint, kind, payload)?;
                // Strip the user session: fan-outs from a server scope are
                // service-to-service
                req.set_session_id("");
                req.set_authorised(true);
                Ok(req)
            }
            None => scoped_request(&self.name, service, endpoint, kind, payload),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corvid_broker::Delivery;
    use std::collections::HashMap;

    fn inbound() -> ServerRequest {
        let mut headers = HashMap::new();
        headers.insert("sessionID".to_string(), "sess-9".to_string());
        headers.insert("traceID".to_string(), "trace-9".to_string());
        headers.insert("traceShouldPersist".to_string(), "1".to_string());
        headers.insert("endpoint".to_string(), "inboundep".to_string());
        headers.insert("remoteAddr".to_string(), "10.1.1.1".to_string());
        headers.insert("authorised".to_string(), "1".to_string());
        ServerRequest::from_delivery(Delivery {
            content_type: ContentKind::OCTET_STREAM.to_string(),
            message_id: "parent-msg".to_string(),
            headers,
            ..Delivery::default()
        })
    }

    #[test]
    fn server_scope_is_pre_authorised() {
        let req = scoped_request(
            "com.corvid.me",
            "com.corvid.other",
            "ep",
            ContentKind::OctetStream,
            vec![],
        )
        .unwrap();
        assert_eq!(req.from(), "com.corvid.me");
        assert!(req.authorised());
    }

    #[test]
    fn request_scope_propagates_everything() {
        let parent = inbound();
        let req = request_scoped_request(
            "com.corvid.me",
            &parent,
            "com.corvid.other",
            "ep",
            ContentKind::OctetStream,
            vec![],
        )
        .unwrap();
        assert_eq!(req.session_id(), "sess-9");
        assert_eq!(req.trace_id(), "trace-9");
        assert!(req.trace_should_persist());
        assert_eq!(req.parent_message_id(), "parent-msg");
        assert_eq!(req.remote_addr(), "10.1.1.1");
        assert_eq!(req.from(), "com.corvid.me");
        assert_eq!(req.from_endpoint(), "inboundep");
        assert!(req.authorised());
    }

    #[test]
    fn scoper_with_parent_strips_the_session() {
        let scoper = ServerScoper::for_request("com.corvid.me", Arc::new(inbound()));
        let req = scoper
            .scoped_request("com.corvid.other", "ep", ContentKind::OctetStream, vec![])
            .unwrap();
        assert_eq!(req.session_id(), "");
        assert!(req.authorised());
        assert_eq!(scoper.context(), "com.corvid.me");
    }
}
