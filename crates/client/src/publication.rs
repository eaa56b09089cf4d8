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

//! Fan-out publication on the topic exchange

use corvid_broker::codec::{self, WireMessage};
use corvid_broker::{ContentKind, RoutedPublication};
use uuid::Uuid;

use crate::request::RequestError;

/// A pub/sub message. The topic is fixed at construction.
#[derive(Debug, Clone)]
pub struct Publication {
    content_type: ContentKind,
    payload: Vec<u8>,
    topic: String,
    message_id: String,
    session_id: String,
}

impl Publication {
    fn build(
        content_type: ContentKind,
        topic: &str,
        payload: Vec<u8>,
    ) -> Result<Self, RequestError> {
        if topic.is_empty() {
            // A publication without a topic routes nowhere
            return Err(RequestError::MissingEndpoint);
        }
        Ok(Self {
            content_type,
            payload,
            topic: topic.to_string(),
            message_id: Uuid::new_v4().to_string(),
            session_id: String::new(),
        })
    }

    pub fn new<T: WireMessage>(topic: &str, payload: &T) -> Result<Self, RequestError> {
        let bytes = codec::marshal(ContentKind::OctetStream, payload)?;
        Self::build(ContentKind::OctetStream, topic, bytes)
    }

    pub fn new_json(topic: &str, payload: Vec<u8>) -> Result<Self, RequestError> {
        Self::build(ContentKind::Json, topic, payload)
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    pub fn set_session_id(&mut self, id: impl Into<String>) {
        self.session_id = id.into();
    }
}

impl RoutedPublication for Publication {
    fn content_type(&self) -> &str {
        self.content_type.as_str()
    }
    fn payload(&self) -> &[u8] {
        &self.payload
    }
    fn topic(&self) -> &str {
        &self.topic
    }
    fn message_id(&self) -> &str {
        &self.message_id
    }
    fn session_id(&self) -> &str {
        &self.session_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corvid_proto::discovery::EndpointsRequest;

    #[test]
    fn requires_topic() {
        let payload = EndpointsRequest::default();
        assert!(Publication::new("", &payload).is_err());
        assert!(Publication::new("com.corvid.topic", &payload).is_ok());
    }

    #[test]
    fn mints_message_id() {
        let payload = EndpointsRequest::default();
        let p = Publication::new("com.corvid.topic", &payload).unwrap();
        assert!(!p.message_id().is_empty());
    }
}
