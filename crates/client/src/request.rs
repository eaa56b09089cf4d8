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

//! Outbound request model

use corvid_broker::codec::{self, WireMessage};
use corvid_broker::{ContentKind, RoutedRequest};
use corvid_config::ConfigStore;
use thiserror::Error;
use uuid::Uuid;

use crate::client::Options;

/// Errors building or decoding a request.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("Missing service in request")]
    MissingService,

    #[error("Missing endpoint in request")]
    MissingEndpoint,

    #[error("Failed to encode request payload: {0}")]
    Codec(#[from] codec::CodecError),

    #[error("Unknown content type: {0}")]
    UnknownContentType(String),
}

/// A request ready to send: payload plus all the scope that rides in
/// headers. The message id is minted at construction and never changes.
#[derive(Debug, Clone)]
pub struct Request {
    content_type: ContentKind,
    payload: Vec<u8>,
    service: String,
    endpoint: String,
    message_id: String,
    session_id: String,
    trace_id: String,
    trace_should_persist: bool,
    parent_message_id: String,
    from_service: String,
    from_endpoint: String,
    remote_addr: String,
    authorised: bool,
    options: Option<Options>,
}

impl Request {
    fn build(
        content_type: ContentKind,
        payload: Vec<u8>,
        service: &str,
        endpoint: &str,
    ) -> Result<Self, RequestError> {
        if service.is_empty() {
            return Err(RequestError::MissingService);
        }
        if endpoint.is_empty() {
            return Err(RequestError::MissingEndpoint);
        }

        Ok(Self {
            content_type,
            payload,
            service: service.to_string(),
            endpoint: endpoint.to_string(),
            message_id: Uuid::new_v4().to_string(),
            session_id: String::new(),
            trace_id: String::new(),
            trace_should_persist: false,
            parent_message_id: String::new(),
            from_service: String::new(),
            from_endpoint: String::new(),
            remote_addr: String::new(),
            authorised: false,
            options: None,
        })
    }

    /// New binary request, payload schema-encoded.
    pub fn new<T: WireMessage>(
        service: &str,
        endpoint: &str,
        payload: &T,
    ) -> Result<Self, RequestError> {
        let bytes = codec::marshal(ContentKind::OctetStream, payload)?;
        Self::build(ContentKind::OctetStream, bytes, service, endpoint)
    }

    /// New binary request from already-encoded bytes.
    pub fn new_proto(
        service: &str,
        endpoint: &str,
        payload: Vec<u8>,
    ) -> Result<Self, RequestError> {
        Self::build(ContentKind::OctetStream, payload, service, endpoint)
    }

    /// New JSON request from already-encoded bytes.
    pub fn new_json(
        service: &str,
        endpoint: &str,
        payload: Vec<u8>,
    ) -> Result<Self, RequestError> {
        Self::build(ContentKind::Json, payload, service, endpoint)
    }

    pub fn content_kind(&self) -> ContentKind {
        self.content_type
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    pub fn trace_should_persist(&self) -> bool {
        self.trace_should_persist
    }

    pub fn parent_message_id(&self) -> &str {
        &self.parent_message_id
    }

    /// Which service sent this request.
    pub fn from(&self) -> &str {
        &self.from_service
    }

    /// Which endpoint sent this request.
    pub fn from_endpoint(&self) -> &str {
        &self.from_endpoint
    }

    pub fn remote_addr(&self) -> &str {
        &self.remote_addr
    }

    pub fn authorised(&self) -> bool {
        self.authorised
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn set_session_id(&mut self, id: impl Into<String>) {
        self.session_id = id.into();
    }

    pub fn set_trace_id(&mut self, id: impl Into<String>) {
        self.trace_id = id.into();
    }

    pub fn set_trace_should_persist(&mut self, val: bool) {
        self.trace_should_persist = val;
    }

    pub fn set_parent_message_id(&mut self, id: impl Into<String>) {
        self.parent_message_id = id.into();
    }

    pub fn set_from(&mut self, service: impl Into<String>) {
        self.from_service = service.into();
    }

    pub fn set_from_endpoint(&mut self, endpoint: impl Into<String>) {
        self.from_endpoint = endpoint.into();
    }

    pub fn set_remote_addr(&mut self, addr: impl Into<String>) {
        self.remote_addr = addr.into();
    }

    pub fn set_authorised(&mut self, val: bool) {
        self.authorised = val;
    }

    pub fn set_options(&mut self, options: Options) {
        self.options = Some(options);
    }

    pub fn options(&self) -> Option<&Options> {
        self.options.as_ref()
    }

    /// Decode the payload back into a message, whichever codec it used.
    pub fn unmarshal<T: WireMessage>(&self) -> Result<T, RequestError> {
        Ok(codec::unmarshal(self.content_type, &self.payload)?)
    }

    /// Decide whether this request should be traced. A present trace id
    /// forces tracing; otherwise `corvid.service.trace.pcChance` gives the
    /// probability of minting a fresh trace id.
    pub fn should_trace(&mut self, config: &ConfigStore) -> bool {
        if !self.trace_id.is_empty() {
            return true;
        }

        let pc_chance = config
            .at_path(&["corvid", "service", "trace", "pcChance"])
            .as_float(0.0);
        if pc_chance <= 0.0 {
            return false;
        }

        if rand::random::<f64>() < pc_chance {
            self.trace_id = Uuid::new_v4().to_string();
            return true;
        }

        false
    }
}

impl RoutedRequest for Request {
    fn content_type(&self) -> &str {
        self.content_type.as_str()
    }
    fn payload(&self) -> &[u8] {
        &self.payload
    }
    fn service(&self) -> &str {
        &self.service
    }
    fn endpoint(&self) -> &str {
        &self.endpoint
    }
    fn message_id(&self) -> &str {
        &self.message_id
    }
    fn session_id(&self) -> &str {
        &self.session_id
    }
    fn trace_id(&self) -> &str {
        &self.trace_id
    }
    fn trace_should_persist(&self) -> bool {
        self.trace_should_persist
    }
    fn parent_message_id(&self) -> &str {
        &self.parent_message_id
    }
    fn from(&self) -> &str {
        &self.from_service
    }
    fn remote_addr(&self) -> &str {
        &self.remote_addr
    }
    fn authorised(&self) -> bool {
        self.authorised
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corvid_proto::discovery::EndpointsRequest;

    fn test_payload() -> EndpointsRequest {
        EndpointsRequest {
            service: "com.corvid.test".into(),
        }
    }

    #[test]
    fn rejects_empty_service_and_endpoint() {
        assert!(matches!(
            Request::new("", "ep", &test_payload()),
            Err(RequestError::MissingService)
        ));
        assert!(matches!(
            Request::new("svc", "", &test_payload()),
            Err(RequestError::MissingEndpoint)
        ));
    }

    #[test]
    fn mints_unique_message_ids() {
        let a = Request::new("svc", "ep", &test_payload()).unwrap();
        let b = Request::new("svc", "ep", &test_payload()).unwrap();
        assert_ne!(a.message_id(), b.message_id());
        assert!(!a.message_id().is_empty());
    }

    #[test]
    fn payload_round_trip() {
        let req = Request::new("svc", "ep", &test_payload()).unwrap();
        let back: EndpointsRequest = req.unmarshal().unwrap();
        assert_eq!(back, test_payload());
    }

    #[test]
    fn trace_id_forces_tracing() {
        let config = ConfigStore::new();
        let mut req = Request::new("svc", "ep", &test_payload()).unwrap();
        assert!(!req.should_trace(&config));

        req.set_trace_id("some-trace");
        assert!(req.should_trace(&config));
    }

    #[test]
    fn pc_chance_one_mints_trace_id() {
        let config = ConfigStore::new();
        config.load_value(serde_json::json!({
            "corvid": { "service": { "trace": { "pcChance": 1.0 } } }
        }));

        let mut req = Request::new("svc", "ep", &test_payload()).unwrap();
        assert!(req.should_trace(&config));
        assert!(!req.trace_id().is_empty());
    }

    #[test]
    fn pc_chance_zero_disables_sampling() {
        let config = ConfigStore::new();
        config.load_value(serde_json::json!({
            "corvid": { "service": { "trace": { "pcChance": 0.0 } } }
        }));

        let mut req = Request::new("svc", "ep", &test_payload()).unwrap();
        assert!(!req.should_trace(&config));
        assert!(req.trace_id().is_empty());
    }
}
