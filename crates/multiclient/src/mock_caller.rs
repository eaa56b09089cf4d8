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

//! Mock caller with stubbed endpoints
//!
//! Stubs match in registration order on (service, endpoint), then on
//! remaining invocation quota, then on expected payload. Unmatched
//! requests fall through to an optional proxy caller.

use std::sync::{Arc, Mutex};

use corvid_broker::codec::{self, WireMessage};
use corvid_broker::ContentKind;
use corvid_client::Request;
use corvid_errors::PlatformError;

use crate::caller::{Caller, CallerResponse};

/// Yields a mocked response given the 1-indexed invocation number and the
/// matched request. Returns the encoded response body.
pub type Responder = Arc<dyn Fn(usize, &Request) -> Result<Vec<u8>, PlatformError> + Send + Sync>;

struct StubState {
    service: String,
    endpoint: String,
    response: Option<Vec<u8>>,
    error: Option<PlatformError>,
    responder: Option<Responder>,
    /// 0 = unlimited
    invocation_limit: usize,
    expected_payload: Option<Vec<u8>>,
    matched: Vec<Request>,
}

impl StubState {
    /// Quota is checked before the payload: an exhausted stub never
    /// consumes a matching request.
    fn matches(&self, req: &Request) -> bool {
        if self.service != req.service() || self.endpoint != req.endpoint() {
            return false;
        }
        if self.invocation_limit > 0 && self.matched.len() >= self.invocation_limit {
            return false;
        }
        if let Some(expected) = &self.expected_payload {
            if expected.as_slice() != req.payload() {
                return false;
            }
        }
        true
    }
}

/// A caller backed by stubs.
#[derive(Clone, Default)]
pub struct Mock {
    stubs: Arc<Mutex<Vec<StubState>>>,
    proxy: Arc<Mutex<Option<Caller>>>,
}

impl Mock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Default caller used when no stub matches. Without one, unmatched
    /// requests fail NOT_FOUND.
    pub fn proxy(&self, caller: Caller) -> &Self {
        *self.proxy.lock().unwrap() = Some(caller);
        self
    }

    /// Register a stub for (service, endpoint) and return its handle for
    /// further configuration and assertions.
    pub fn on(&self, service: &str, endpoint: &str) -> StubHandle {
        let mut stubs = self.stubs.lock().unwrap();
        stubs.push(StubState {
            service: service.to_string(),
            endpoint: endpoint.to_string(),
            response: None,
            error: None,
            responder: None,
            invocation_limit: 0,
            expected_payload: None,
            matched: Vec::new(),
        });
        StubHandle {
            index: stubs.len() - 1,
            stubs: Arc::clone(&self.stubs),
        }
    }

    /// The caller gateway into this mock, safe to share across workers.
    pub fn caller(&self) -> Caller {
        let stubs = Arc::clone(&self.stubs);
        let proxy = Arc::clone(&self.proxy);

        Arc::new(move |req: Request| {
            // Match synchronously under the lock; only the proxy call is
            // awaited, after the lock is gone.
            let outcome = {
                let mut stubs = stubs.lock().unwrap();
                let mut found = None;
                for stub in stubs.iter_mut() {
                    if stub.matches(&req) {
                        stub.matched.push(req.clone());
                        let invocation = stub.matched.len();

                        if let Some(responder) = &stub.responder {
                            found = Some(responder(invocation, &req));
                        } else if let Some(err) = &stub.error {
                            found = Some(Err(err.clone()));
                        } else {
                            found = Some(Ok(stub.response.clone().unwrap_or_default()));
                        }
                        break;
                    }
                }
                found
            };

            let proxy = proxy.lock().unwrap().clone();
            Box::pin(async move {
                match outcome {
                    Some(Ok(body)) => Ok(CallerResponse {
                        content_type: ContentKind::OctetStream,
                        body,
                    }),
                    Some(Err(err)) => Err(err),
                    None => match proxy {
                        Some(proxy) => proxy(req).await,
                        None => Err(PlatformError::not_found(
                            "mock.notfound",
                            "No mocked service registered to handle request",
                        )),
                    },
                }
            })
        })
    }
}

/// Handle onto one registered stub.
pub struct StubHandle {
    index: usize,
    stubs: Arc<Mutex<Vec<StubState>>>,
}

impl StubHandle {
    fn with<R>(&self, f: impl FnOnce(&mut StubState) -> R) -> R {
        let mut stubs = self.stubs.lock().unwrap();
        f(&mut stubs[self.index])
    }

    /// Only match requests whose payload equals this message.
    pub fn payload<T: WireMessage>(&self, expected: &T) -> &Self {
        let bytes =
            codec::marshal(ContentKind::OctetStream, expected).expect("stub payload must encode");
        self.with(|s| s.expected_payload = Some(bytes));
        self
    }

    /// Respond with this message on every matched request.
    pub fn return_rsp<T: WireMessage>(&self, rsp: &T) -> &Self {
        let bytes =
            codec::marshal(ContentKind::OctetStream, rsp).expect("stub response must encode");
        self.with(|s| s.response = Some(bytes));
        self
    }

    /// Fail every matched request with this error.
    pub fn fail(&self, err: PlatformError) -> &Self {
        self.with(|s| s.error = Some(err));
        self
    }

    /// Install a responder for full control over each invocation.
    pub fn responder(&self, f: Responder) -> &Self {
        self.with(|s| s.responder = Some(f));
        self
    }

    /// Cap how many requests this stub can consume.
    pub fn times(&self, limit: usize) -> &Self {
        self.with(|s| s.invocation_limit = limit);
        self
    }

    pub fn once(&self) -> &Self {
        self.times(1)
    }

    /// How many calls this stub has handled.
    pub fn count_calls(&self) -> usize {
        self.with(|s| s.matched.len())
    }

    /// The request of call `n`, zero-indexed.
    pub fn request(&self, n: usize) -> Option<Request> {
        self.with(|s| s.matched.get(n).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corvid_proto::discovery::EndpointsRequest;

    fn request(service: &str, endpoint: &str, marker: &str) -> Request {
        Request::new(
            service,
            endpoint,
            &EndpointsRequest {
                service: marker.into(),
            },
        )
        .unwrap()
    }

    #[tokio::test]
    async fn stub_returns_configured_response() {
        let mock = Mock::new();
        mock.on("svc", "ep").return_rsp(&EndpointsRequest {
            service: "stubbed".into(),
        });

        let caller = mock.caller();
        let raw = caller(request("svc", "ep", "in")).await.unwrap();
        let rsp: EndpointsRequest =
            codec::unmarshal(ContentKind::OctetStream, &raw.body).unwrap();
        assert_eq!(rsp.service, "stubbed");
    }

    #[tokio::test]
    async fn unmatched_request_is_not_found() {
        let mock = Mock::new();
        let caller = mock.caller();
        let err = caller(request("svc", "nope", "x")).await.unwrap_err();
        assert_eq!(err.code(), "mock.notfound");
    }

    #[tokio::test]
    async fn once_limits_invocations() {
        let mock = Mock::new();
        let first = mock.on("svc", "ep");
        first.once().return_rsp(&EndpointsRequest {
            service: "first".into(),
        });
        mock.on("svc", "ep").return_rsp(&EndpointsRequest {
            service: "rest".into(),
        });

        let caller = mock.caller();
        let raw = caller(request("svc", "ep", "a")).await.unwrap();
        let rsp: EndpointsRequest =
            codec::unmarshal(ContentKind::OctetStream, &raw.body).unwrap();
        assert_eq!(rsp.service, "first");

        let raw = caller(request("svc", "ep", "b")).await.unwrap();
        let rsp: EndpointsRequest =
            codec::unmarshal(ContentKind::OctetStream, &raw.body).unwrap();
        assert_eq!(rsp.service, "rest");

        assert_eq!(first.count_calls(), 1);
    }

    #[tokio::test]
    async fn payload_matching_gates_the_stub() {
        let mock = Mock::new();
        mock.on("svc", "ep")
            .payload(&EndpointsRequest {
                service: "expected".into(),
            })
            .return_rsp(&EndpointsRequest {
                service: "matched".into(),
            });

        let caller = mock.caller();
        assert!(caller(request("svc", "ep", "other")).await.is_err());
        assert!(caller(request("svc", "ep", "expected")).await.is_ok());
    }

    #[tokio::test]
    async fn responder_sees_invocation_numbers() {
        let mock = Mock::new();
        mock.on("svc", "ep").responder(Arc::new(|invocation, _req| {
            codec::marshal(
                ContentKind::OctetStream,
                &EndpointsRequest {
                    service: format!("call-{invocation}"),
                },
            )
            .map_err(|e| PlatformError::internal_server("encode", e))
        }));

        let caller = mock.caller();
        for expected in ["call-1", "call-2"] {
            let raw = caller(request("svc", "ep", "x")).await.unwrap();
            let rsp: EndpointsRequest =
                codec::unmarshal(ContentKind::OctetStream, &raw.body).unwrap();
            assert_eq!(rsp.service, expected);
        }
    }

    #[tokio::test]
    async fn stub_error_and_recorded_requests() {
        let mock = Mock::new();
        let stub = mock.on("svc", "ep");
        stub.fail(PlatformError::forbidden("code.x", "denied"));

        let caller = mock.caller();
        let err = caller(request("svc", "ep", "marker")).await.unwrap_err();
        assert_eq!(err.code(), "code.x");

        let recorded = stub.request(0).unwrap();
        let payload: EndpointsRequest = recorded.unmarshal().unwrap();
        assert_eq!(payload.service, "marker");
    }
}
