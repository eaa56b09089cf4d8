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

//! Outbound server responses
//!
//! A response answers a specific request: it routes back to the
//! requester's queue and carries the request's message id, which the
//! broker turns into the reply's correlation id. The reply codec always
//! equals the request codec.

use corvid_broker::codec;
use corvid_broker::{ContentKind, RoutedResponse};
use corvid_errors::PlatformError;

use crate::request::ServerRequest;

/// A reply, error or heartbeat response on its way out.
pub struct ServerResponse {
    message_type: String,
    payload: Vec<u8>,
    content_type: String,
    reply_to: String,
    message_id: String,
}

impl ServerResponse {
    /// A PONG heartbeat reply.
    pub fn pong(replying_to: &ServerRequest) -> Self {
        Self {
            message_type: "heartbeat".to_string(),
            payload: b"PONG".to_vec(),
            content_type: replying_to.content_type().to_string(),
            reply_to: replying_to.reply_to().to_string(),
            message_id: replying_to.message_id().to_string(),
        }
    }

    /// A successful reply carrying an already-encoded payload.
    pub fn reply(replying_to: &ServerRequest, payload: Vec<u8>) -> Self {
        Self {
            message_type: "reply".to_string(),
            payload,
            content_type: replying_to.content_type().to_string(),
            reply_to: replying_to.reply_to().to_string(),
            message_id: replying_to.message_id().to_string(),
        }
    }

    /// An error reply, payload encoded in the request's codec.
    pub fn error(
        replying_to: &ServerRequest,
        err: &PlatformError,
    ) -> Result<Self, codec::CodecError> {
        let kind = replying_to
            .content_kind()
            .unwrap_or(ContentKind::OctetStream);
        let payload = codec::marshal(kind, &err.to_proto())?;
        Ok(Self {
            message_type: "error".to_string(),
            payload,
            content_type: kind.as_str().to_string(),
            reply_to: replying_to.reply_to().to_string(),
            message_id: replying_to.message_id().to_string(),
        })
    }

    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }
}

impl RoutedResponse for ServerResponse {
    fn content_type(&self) -> &str {
        &self.content_type
    }
    fn payload(&self) -> &[u8] {
        &self.payload
    }
    fn message_type(&self) -> &str {
        &self.message_type
    }
    fn message_id(&self) -> &str {
        &self.message_id
    }
    fn reply_to(&self) -> &str {
        &self.reply_to
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corvid_broker::Delivery;
    use std::collections::HashMap;

    fn request() -> ServerRequest {
        let mut headers = HashMap::new();
        headers.insert("messageType".to_string(), "request".to_string());
        ServerRequest::from_delivery(Delivery {
            content_type: ContentKind::JSON.to_string(),
            message_id: "req-1".to_string(),
            reply_to: "client-abc".to_string(),
            headers,
            ..Delivery::default()
        })
    }

    #[test]
    fn reply_routes_back_to_requester() {
        let rsp = ServerResponse::reply(&request(), b"data".to_vec());
        assert_eq!(rsp.message_type(), "reply");
        assert_eq!(rsp.reply_to(), "client-abc");
        assert_eq!(rsp.message_id(), "req-1");
        assert_eq!(rsp.content_type(), ContentKind::JSON);
    }

    #[test]
    fn error_preserves_request_codec() {
        let err = PlatformError::bad_request("code.bad", "nope");
        let rsp = ServerResponse::error(&request(), &err).unwrap();
        assert_eq!(rsp.message_type(), "error");
        assert_eq!(rsp.content_type(), ContentKind::JSON);

        // JSON codec means the payload is a JSON document
        let decoded: corvid_proto::error::PlatformError =
            serde_json::from_slice(rsp.payload()).unwrap();
        assert_eq!(decoded.code, "code.bad");
    }

    #[test]
    fn pong_echoes_the_ping() {
        let rsp = ServerResponse::pong(&request());
        assert_eq!(rsp.message_type(), "heartbeat");
        assert_eq!(rsp.payload(), b"PONG");
        assert_eq!(rsp.reply_to(), "client-abc");
    }
}
