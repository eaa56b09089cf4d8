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

//! Mock client for tests of components that speak to services

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use corvid_broker::codec::{self, WireMessage};
use corvid_broker::{BrokerError, ContentKind, Delivery};
use corvid_errors::PlatformError;

use crate::client::{Client, Options};
use crate::publication::Publication;
use crate::request::Request;
use crate::response::Response;

enum Stubbed {
    Reply(Vec<u8>),
    Fail(PlatformError),
}

/// A client that answers from canned stubs and records everything sent
/// through it.
#[derive(Default)]
pub struct MockClient {
    stubs: Mutex<HashMap<(String, String), Stubbed>>,
    requests: Mutex<Vec<Request>>,
    publications: Mutex<Vec<Publication>>,
}

impl MockClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stub a successful reply for (service, endpoint).
    pub fn stub_response<T: WireMessage>(&self, service: &str, endpoint: &str, rsp: &T) {
        let body = codec::marshal(ContentKind::OctetStream, rsp).expect("stub must encode");
        self.stubs.lock().unwrap().insert(
            (service.to_string(), endpoint.to_string()),
            Stubbed::Reply(body),
        );
    }

    /// Stub an error for (service, endpoint).
    pub fn stub_error(&self, service: &str, endpoint: &str, err: PlatformError) {
        self.stubs.lock().unwrap().insert(
            (service.to_string(), endpoint.to_string()),
            Stubbed::Fail(err),
        );
    }

    /// Every request sent through this mock, in order.
    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().unwrap().clone()
    }

    /// Every publication sent through this mock, in order.
    pub fn publication_topics(&self) -> Vec<String> {
        self.publications
            .lock()
            .unwrap()
            .iter()
            .map(|p| p.topic().to_string())
            .collect()
    }
}

#[async_trait]
impl Client for MockClient {
    async fn custom_req(
        &self,
        req: Request,
        _options: Option<Options>,
    ) -> Result<Response, PlatformError> {
        let key = (req.service().to_string(), req.endpoint().to_string());
        let message_id = req.message_id().to_string();
        self.requests.lock().unwrap().push(req);

        let stubs = self.stubs.lock().unwrap();
        match stubs.get(&key) {
            Some(Stubbed::Reply(body)) => {
                let mut headers = HashMap::new();
                headers.insert("messageType".to_string(), "reply".to_string());
                Ok(Response::from_delivery(Delivery {
                    content_type: ContentKind::OCTET_STREAM.to_string(),
                    body: body.clone(),
                    headers,
                    correlation_id: message_id,
                    ..Delivery::default()
                }))
            }
            Some(Stubbed::Fail(err)) => Err(err.clone()),
            None => Err(PlatformError::not_found(
                "mock.notfound",
                "No stub registered to handle request",
            )),
        }
    }

    async fn push(&self, req: Request) -> Result<(), BrokerError> {
        self.requests.lock().unwrap().push(req);
        Ok(())
    }

    async fn publish(&self, publication: Publication) -> Result<(), BrokerError> {
        self.publications.lock().unwrap().push(publication);
        Ok(())
    }
}
