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

//! Endpoint descriptors
//!
//! An endpoint carries its name, promised latency figures (mean and
//! upper-95, in milliseconds, published to discovery as the SLA), an
//! optional subscribe topic, an authoriser and its protocol descriptors.
//! The dispatcher decodes requests through the descriptor and verifies at
//! runtime that the handler returned the declared response type.

use std::any::{Any, TypeId};
use std::future::Future;
use std::sync::Arc;

use corvid_broker::codec::{self, WireMessage};
use corvid_broker::ContentKind;
use corvid_errors::PlatformError;
use futures::future::BoxFuture;

use crate::authoriser::Authoriser;
use crate::request::ServerRequest;

/// A handler's type-erased success value; `None` means an empty reply.
pub type HandlerReply = Option<Box<dyn Any + Send + Sync>>;

/// The composed handler signature middleware wraps.
pub type Handler =
    Arc<dyn Fn(Arc<ServerRequest>) -> BoxFuture<'static, Result<HandlerReply, PlatformError>> + Send + Sync>;

/// Middleware wraps a handler to provide additional features.
pub type Middleware = Arc<dyn Fn(&Endpoint, Handler) -> Handler + Send + Sync>;

/// Encode/decode surface of one declared protocol type.
pub struct ProtocolDescriptor {
    type_name: &'static str,
    type_id: TypeId,
    decode: Box<
        dyn Fn(ContentKind, &[u8]) -> Result<Box<dyn Any + Send + Sync>, String> + Send + Sync,
    >,
    encode: Box<dyn Fn(ContentKind, &dyn Any) -> Option<Result<Vec<u8>, String>> + Send + Sync>,
}

impl ProtocolDescriptor {
    pub fn of<T: WireMessage>() -> Self {
        Self {
            type_name: std::any::type_name::<T>(),
            type_id: TypeId::of::<T>(),
            decode: Box::new(|kind, body| {
                codec::unmarshal::<T>(kind, body)
                    .map(|v| Box::new(v) as Box<dyn Any + Send + Sync>)
                    .map_err(|e| e.to_string())
            }),
            encode: Box::new(|kind, value| {
                // `None` signals a type mismatch to the dispatcher
                let value = value.downcast_ref::<T>()?;
                Some(codec::marshal(kind, value).map_err(|e| e.to_string()))
            }),
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub(crate) fn matches(&self, value: &dyn Any) -> bool {
        value.type_id() == self.type_id
    }

    pub(crate) fn decode(
        &self,
        kind: ContentKind,
        body: &[u8],
    ) -> Result<Box<dyn Any + Send + Sync>, String> {
        (self.decode)(kind, body)
    }

    pub(crate) fn encode(
        &self,
        kind: ContentKind,
        value: &dyn Any,
    ) -> Option<Result<Vec<u8>, String>> {
        (self.encode)(kind, value)
    }
}

/// One operation on this service.
pub struct Endpoint {
    pub name: String,
    /// Mean response time promised, milliseconds; also the admission
    /// timeout for the token bucket
    pub mean: i32,
    /// 95th percentile response time promised, milliseconds
    pub upper95: i32,
    /// Topic to subscribe to, for pub/sub endpoints
    pub subscribe: Option<String>,
    /// Defaults to "admin role required" when unset
    pub authoriser: Option<Arc<dyn Authoriser>>,
    pub(crate) handler: Handler,
    pub(crate) request_proto: Option<ProtocolDescriptor>,
    pub(crate) response_proto: Option<ProtocolDescriptor>,
}

impl Endpoint {
    pub fn builder(name: &str) -> EndpointBuilder {
        EndpointBuilder {
            name: name.to_string(),
            mean: 100,
            upper95: 200,
            subscribe: None,
            authoriser: None,
            handler: None,
            request_proto: None,
            response_proto: None,
        }
    }

    pub(crate) fn protocol_type_names(&self) -> (Option<&'static str>, Option<&'static str>) {
        (
            self.request_proto.as_ref().map(ProtocolDescriptor::type_name),
            self.response_proto.as_ref().map(ProtocolDescriptor::type_name),
        )
    }
}

pub struct EndpointBuilder {
    name: String,
    mean: i32,
    upper95: i32,
    subscribe: Option<String>,
    authoriser: Option<Arc<dyn Authoriser>>,
    handler: Option<Handler>,
    request_proto: Option<ProtocolDescriptor>,
    response_proto: Option<ProtocolDescriptor>,
}

impl EndpointBuilder {
    pub fn mean(mut self, ms: i32) -> Self {
        self.mean = ms;
        self
    }

    pub fn upper95(mut self, ms: i32) -> Self {
        self.upper95 = ms;
        self
    }

    pub fn subscribe(mut self, topic: &str) -> Self {
        self.subscribe = Some(topic.to_string());
        self
    }

    pub fn authoriser(mut self, authoriser: Arc<dyn Authoriser>) -> Self {
        self.authoriser = Some(authoriser);
        self
    }

    /// Declare the request and response protocols.
    pub fn protocols<Req: WireMessage, Rsp: WireMessage>(mut self) -> Self {
        self.request_proto = Some(ProtocolDescriptor::of::<Req>());
        self.response_proto = Some(ProtocolDescriptor::of::<Rsp>());
        self
    }

    /// Install a typed handler. The request payload is available on the
    /// request via [`ServerRequest::data`].
    pub fn handler<F, Fut, Rsp>(mut self, f: F) -> Self
    where
        F: Fn(Arc<ServerRequest>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Rsp, PlatformError>> + Send + 'static,
        Rsp: WireMessage,
    {
        self.handler = Some(Arc::new(move |req| {
            let fut = f(req);
            Box::pin(async move {
                fut.await
                    .map(|rsp| Some(Box::new(rsp) as Box<dyn Any + Send + Sync>))
            })
        }));
        self
    }

    /// Install a handler that produces no reply, for subscribe endpoints.
    pub fn consumer_handler<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Arc<ServerRequest>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), PlatformError>> + Send + 'static,
    {
        self.handler = Some(Arc::new(move |req| {
            let fut = f(req);
            Box::pin(async move { fut.await.map(|()| None) })
        }));
        self
    }

    /// Finish the endpoint. Panics without a handler, which is a
    /// programming error.
    pub fn build(self) -> Endpoint {
        Endpoint {
            name: self.name,
            mean: self.mean,
            upper95: self.upper95,
            subscribe: self.subscribe,
            authoriser: self.authoriser,
            handler: self.handler.expect("endpoint requires a handler"),
            request_proto: self.request_proto,
            response_proto: self.response_proto,
        }
    }
}
