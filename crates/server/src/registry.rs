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

//! Endpoint registry and middleware composition
//!
//! Middleware apply wrapping-style at registration time: the last
//! registered middleware is the outermost when a request enters. Adding
//! an endpoint wraps its handler with the middleware registered so far.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use thiserror::Error;

use crate::authoriser::default_authoriser;
use crate::endpoint::{Endpoint, Middleware};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Missing name in endpoint")]
    MissingName,

    #[error("Endpoint name should be lowercase: {0}")]
    NotLowercase(String),
}

/// Endpoints registered on this server, by name (and by subscribe topic
/// for publications).
pub struct Registry {
    inner: RwLock<RegistryInner>,
}

struct RegistryInner {
    endpoints: HashMap<String, Arc<Endpoint>>,
    middleware: Vec<Middleware>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RegistryInner {
                endpoints: HashMap::new(),
                middleware: Vec::new(),
            }),
        }
    }

    /// Add an endpoint, enforcing the naming laws and defaulting its
    /// authoriser, then wrapping its handler with the current middleware.
    pub fn add(&self, mut ep: Endpoint) -> Result<(), RegistryError> {
        if ep.name.is_empty() {
            return Err(RegistryError::MissingName);
        }
        if ep.name.to_lowercase() != ep.name {
            return Err(RegistryError::NotLowercase(ep.name));
        }

        if ep.authoriser.is_none() {
            ep.authoriser = Some(default_authoriser());
        }

        let mut inner = self.inner.write().unwrap();
        let mut handler = Arc::clone(&ep.handler);
        for mw in &inner.middleware {
            handler = mw(&ep, handler);
        }
        ep.handler = handler;

        inner.endpoints.insert(ep.name.clone(), Arc::new(ep));
        Ok(())
    }

    /// Register a middleware; applies to endpoints added after this call.
    pub fn add_middleware(&self, mw: Middleware) {
        let mut inner = self.inner.write().unwrap();
        inner.middleware.push(mw);
    }

    /// Find by endpoint name, or by subscribe topic for publications.
    pub fn find(&self, name: &str) -> Option<Arc<Endpoint>> {
        let inner = self.inner.read().unwrap();
        if let Some(ep) = inner.endpoints.get(name) {
            return Some(Arc::clone(ep));
        }
        inner
            .endpoints
            .values()
            .find(|ep| ep.subscribe.as_deref() == Some(name))
            .map(Arc::clone)
    }

    /// Snapshot of all registered endpoints.
    pub fn iterate(&self) -> Vec<Arc<Endpoint>> {
        let inner = self.inner.read().unwrap();
        inner.endpoints.values().cloned().collect()
    }

    pub fn size(&self) -> usize {
        self.inner.read().unwrap().endpoints.len()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corvid_errors::PlatformError;
    use corvid_proto::discovery::{EndpointsRequest, EndpointsResponse};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn endpoint(name: &str) -> Endpoint {
        Endpoint::builder(name)
            .protocols::<EndpointsRequest, EndpointsResponse>()
            .handler(|_req| async move { Ok(EndpointsResponse::default()) })
            .build()
    }

    #[test]
    fn enforces_lowercase_names() {
        let registry = Registry::new();
        assert!(matches!(
            registry.add(endpoint("")),
            Err(RegistryError::MissingName)
        ));
        assert!(matches!(
            registry.add(endpoint("Register")),
            Err(RegistryError::NotLowercase(_))
        ));
        assert!(registry.add(endpoint("register")).is_ok());
        assert_eq!(registry.size(), 1);
    }

    #[test]
    fn default_authoriser_is_applied() {
        let registry = Registry::new();
        registry.add(endpoint("register")).unwrap();
        let ep = registry.find("register").unwrap();
        assert!(ep.authoriser.is_some());
    }

    #[test]
    fn finds_by_subscribe_topic() {
        let registry = Registry::new();
        let ep = Endpoint::builder("consume")
            .subscribe("com.corvid.events")
            .consumer_handler(|_req| async move { Ok(()) })
            .build();
        registry.add(ep).unwrap();

        assert!(registry.find("com.corvid.events").is_some());
        assert!(registry.find("consume").is_some());
        assert!(registry.find("missing").is_none());
    }

    #[tokio::test]
    async fn last_registered_middleware_is_outermost() {
        let registry = Registry::new();
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));

        for label in ["inner", "outer"] {
            let order = Arc::clone(&order);
            registry.add_middleware(Arc::new(move |_ep, next| {
                let order = Arc::clone(&order);
                Arc::new(move |req| {
                    order.lock().unwrap().push(label);
                    next(req)
                })
            }));
        }

        registry.add(endpoint("probe")).unwrap();
        let ep = registry.find("probe").unwrap();

        let req = Arc::new(crate::request::ServerRequest::from_payload(
            "svc",
            "probe",
            Vec::new(),
        ));
        let handler = Arc::clone(&ep.handler);
        handler(req).await.unwrap();

        assert_eq!(*order.lock().unwrap(), vec!["outer", "inner"]);
    }

    #[tokio::test]
    async fn middleware_applies_only_to_later_endpoints() {
        let registry = Registry::new();
        let hits = Arc::new(AtomicUsize::new(0));

        registry.add(endpoint("before")).unwrap();

        let hits2 = Arc::clone(&hits);
        registry.add_middleware(Arc::new(move |_ep, next| {
            let hits = Arc::clone(&hits2);
            Arc::new(move |req| {
                hits.fetch_add(1, Ordering::SeqCst);
                next(req)
            })
        }));
        registry.add(endpoint("after")).unwrap();

        let req = Arc::new(crate::request::ServerRequest::from_payload(
            "svc",
            "x",
            Vec::new(),
        ));

        let before = registry.find("before").unwrap();
        (Arc::clone(&before.handler))(Arc::clone(&req)).await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        let after = registry.find("after").unwrap();
        (Arc::clone(&after.handler))(req).await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn handler_errors_surface_as_platform_errors() {
        let registry = Registry::new();
        let ep = Endpoint::builder("failing")
            .protocols::<EndpointsRequest, EndpointsResponse>()
            .handler(|_req| async move {
                Err::<EndpointsResponse, _>(PlatformError::bad_request("code.bad", "nope"))
            })
            .build();
        registry.add(ep).unwrap();
        assert!(registry.find("failing").is_some());
    }
}
