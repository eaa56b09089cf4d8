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

//! Inbound server request, wrapping a broker delivery

use std::any::Any;
use std::sync::{Arc, OnceLock};

use corvid_broker::{ContentKind, Delivery};

use crate::auth::{SessionScope, SessionStore};

/// One inbound delivery on its way through the dispatch pipeline. The
/// security scope is recovered once by the dispatcher; the unmarshaled
/// payload is attached after decoding.
pub struct ServerRequest {
    delivery: Delivery,
    scope: OnceLock<Arc<SessionScope>>,
    data: OnceLock<Box<dyn Any + Send + Sync>>,
}

impl ServerRequest {
    pub fn from_delivery(delivery: Delivery) -> Self {
        Self {
            delivery,
            scope: OnceLock::new(),
            data: OnceLock::new(),
        }
    }

    /// Build a request directly from an already-encoded payload, for
    /// exercising handlers in tests.
    pub fn from_payload(service: &str, endpoint: &str, body: Vec<u8>) -> Self {
        let mut delivery = Delivery {
            content_type: ContentKind::OCTET_STREAM.to_string(),
            body,
            ..Delivery::default()
        };
        delivery
            .headers
            .insert("service".to_string(), service.to_string());
        delivery
            .headers
            .insert("endpoint".to_string(), endpoint.to_string());
        delivery
            .headers
            .insert("messageType".to_string(), "request".to_string());
        Self::from_delivery(delivery)
    }

    pub fn message_id(&self) -> &str {
        &self.delivery.message_id
    }

    pub fn content_type(&self) -> &str {
        &self.delivery.content_type
    }

    pub fn content_kind(&self) -> Option<ContentKind> {
        self.delivery.content_kind()
    }

    pub fn service(&self) -> &str {
        self.delivery.header("service")
    }

    pub fn endpoint(&self) -> &str {
        self.delivery.header("endpoint")
    }

    /// `service.endpoint` the request was directed at.
    pub fn destination(&self) -> String {
        format!("{}.{}", self.service(), self.endpoint())
    }

    pub fn topic(&self) -> &str {
        self.delivery.header("topic")
    }

    pub fn from(&self) -> &str {
        self.delivery.header("from")
    }

    pub fn session_id(&self) -> &str {
        self.delivery.header("sessionID")
    }

    pub fn trace_id(&self) -> &str {
        self.delivery.header("traceID")
    }

    pub fn trace_should_persist(&self) -> bool {
        self.delivery.header("traceShouldPersist") == "1"
    }

    pub fn parent_message_id(&self) -> &str {
        self.delivery.header("parentMessageID")
    }

    /// Whether the sender already authorised this request upstream.
    pub fn authorised(&self) -> bool {
        self.delivery.header("authorised") == "1"
    }

    pub fn remote_addr(&self) -> &str {
        self.delivery.header("remoteAddr")
    }

    pub fn message_type(&self) -> &str {
        self.delivery.header("messageType")
    }

    pub fn reply_to(&self) -> &str {
        &self.delivery.reply_to
    }

    pub fn payload(&self) -> &[u8] {
        &self.delivery.body
    }

    pub fn is_publication(&self) -> bool {
        !self.topic().is_empty()
    }

    pub(crate) fn should_trace(&self) -> bool {
        !self.trace_id().is_empty()
    }

    /// A heartbeat is flagged by message type, by header, or by a literal
    /// PING body.
    pub fn is_heartbeat(&self) -> bool {
        if self.message_type() == "heartbeat" {
            return true;
        }
        if self.delivery.header("heartbeat") == "ping" {
            return true;
        }
        self.delivery.body == b"PING"
    }

    /// Recover the security scope from the session store. Called once by
    /// the dispatcher before the middleware chain runs.
    pub async fn init_scope(&self, store: &dyn SessionStore) {
        if self.scope.get().is_some() {
            return;
        }

        let session_id = self.session_id();
        let mut user = None;
        let mut tried_auth = false;
        if !session_id.is_empty() {
            tried_auth = true;
            user = store.recover_session(session_id).await;
            if user.is_none() {
                tracing::warn!(session_id, "session recovery failed");
            }
        }

        let service_roles = if self.from().is_empty() {
            Vec::new()
        } else {
            store.service_roles(self.from(), self.endpoint()).await
        };

        let _ = self.scope.set(Arc::new(SessionScope::new(
            user,
            tried_auth,
            service_roles,
            self.authorised(),
        )));
    }

    /// The recovered scope; anonymous when nothing was recovered.
    pub fn scope(&self) -> Arc<SessionScope> {
        self.scope
            .get_or_init(|| Arc::new(SessionScope::anonymous()))
            .clone()
    }

    /// Install a pre-built scope, for tests.
    pub fn set_scope(&self, scope: SessionScope) {
        let _ = self.scope.set(Arc::new(scope));
    }

    pub(crate) fn set_data(&self, data: Box<dyn Any + Send + Sync>) {
        let _ = self.data.set(data);
    }

    /// The unmarshaled payload, as the endpoint's declared request type.
    pub fn data<T: 'static>(&self) -> Option<&T> {
        self.data.get().and_then(|d| d.downcast_ref::<T>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delivery_with(headers: &[(&str, &str)], body: &[u8]) -> Delivery {
        let mut d = Delivery {
            body: body.to_vec(),
            ..Delivery::default()
        };
        for (k, v) in headers {
            d.headers.insert(k.to_string(), v.to_string());
        }
        d
    }

    #[test]
    fn heartbeat_detection() {
        let by_type =
            ServerRequest::from_delivery(delivery_with(&[("messageType", "heartbeat")], b""));
        assert!(by_type.is_heartbeat());

        let by_header = ServerRequest::from_delivery(delivery_with(&[("heartbeat", "ping")], b""));
        assert!(by_header.is_heartbeat());

        let by_body = ServerRequest::from_delivery(delivery_with(&[], b"PING"));
        assert!(by_body.is_heartbeat());

        let normal = ServerRequest::from_delivery(delivery_with(&[("endpoint", "x")], b"data"));
        assert!(!normal.is_heartbeat());
    }

    #[test]
    fn publication_detection() {
        let publication =
            ServerRequest::from_delivery(delivery_with(&[("topic", "com.corvid.t")], b""));
        assert!(publication.is_publication());

        let request = ServerRequest::from_delivery(delivery_with(&[("endpoint", "x")], b""));
        assert!(!request.is_publication());
    }

    #[test]
    fn header_round_trip_preserves_scope_fields() {
        let req = ServerRequest::from_delivery(delivery_with(
            &[
                ("service", "com.corvid.test"),
                ("endpoint", "register"),
                ("traceID", "t-1"),
                ("traceShouldPersist", "1"),
                ("sessionID", "s-1"),
                ("parentMessageID", "p-1"),
                ("from", "com.corvid.caller"),
                ("remoteAddr", "10.0.0.1"),
                ("authorised", "1"),
            ],
            b"",
        ));
        assert_eq!(req.service(), "com.corvid.test");
        assert_eq!(req.endpoint(), "register");
        assert_eq!(req.destination(), "com.corvid.test.register");
        assert_eq!(req.trace_id(), "t-1");
        assert!(req.trace_should_persist());
        assert_eq!(req.session_id(), "s-1");
        assert_eq!(req.parent_message_id(), "p-1");
        assert_eq!(req.from(), "com.corvid.caller");
        assert_eq!(req.remote_addr(), "10.0.0.1");
        assert!(req.authorised());
    }

    #[tokio::test]
    async fn scope_carries_upstream_authorisation() {
        let req = ServerRequest::from_delivery(delivery_with(&[("authorised", "1")], b""));
        req.init_scope(&crate::auth::NullSessionStore).await;
        assert!(req.scope().authorised());
    }
}
