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

//! Inbound reply, as handed back to a caller

use corvid_broker::codec::{self, WireMessage};
use corvid_broker::Delivery;

use crate::request::RequestError;

/// A reply delivery. The correlation id carries the message id of the
/// request this answers.
#[derive(Debug, Clone)]
pub struct Response {
    delivery: Delivery,
}

impl Response {
    pub fn from_delivery(delivery: Delivery) -> Self {
        Self { delivery }
    }

    pub fn content_type(&self) -> &str {
        &self.delivery.content_type
    }

    /// Message id of this reply delivery itself.
    pub fn message_id(&self) -> &str {
        &self.delivery.message_id
    }

    /// Message id of the original request.
    pub fn correlation_id(&self) -> &str {
        &self.delivery.correlation_id
    }

    /// Whether this reply carries an error payload.
    pub fn is_error(&self) -> bool {
        self.delivery.header("messageType") == "error"
    }

    pub fn body(&self) -> &[u8] {
        &self.delivery.body
    }

    pub fn header(&self, key: &str) -> &str {
        self.delivery.header(key)
    }

    /// Decode the body using the codec the reply was sent with.
    pub fn unmarshal<T: WireMessage>(&self) -> Result<T, RequestError> {
        let kind = self
            .delivery
            .content_kind()
            .ok_or_else(|| RequestError::UnknownContentType(self.delivery.content_type.clone()))?;
        Ok(codec::unmarshal(kind, &self.delivery.body)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corvid_broker::ContentKind;
    use std::collections::HashMap;

    #[test]
    fn error_flag_comes_from_message_type_header() {
        let mut headers = HashMap::new();
        headers.insert("messageType".to_string(), "error".to_string());
        let rsp = Response::from_delivery(Delivery {
            headers,
            ..Delivery::default()
        });
        assert!(rsp.is_error());

        let rsp = Response::from_delivery(Delivery::default());
        assert!(!rsp.is_error());
    }

    #[test]
    fn unknown_content_type_fails_decode() {
        let rsp = Response::from_delivery(Delivery {
            content_type: "text/plain".into(),
            ..Delivery::default()
        });
        let r: Result<corvid_proto::discovery::EndpointsRequest, _> = rsp.unmarshal();
        assert!(r.is_err());
    }

    #[test]
    fn correlation_id_is_surfaced() {
        let rsp = Response::from_delivery(Delivery {
            content_type: ContentKind::OCTET_STREAM.into(),
            correlation_id: "req-123".into(),
            ..Delivery::default()
        });
        assert_eq!(rsp.correlation_id(), "req-123");
    }
}
