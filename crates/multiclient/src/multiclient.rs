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

//! The fan-out container itself

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use corvid_broker::codec::{self, WireMessage};
use corvid_broker::ContentKind;
use corvid_config::ConfigStore;
use corvid_client::{Options, Request};
use corvid_errors::{ErrorKind, PlatformError};
use tokio::sync::Semaphore;

use crate::caller::{Caller, CallerResponse};
use crate::errors::Errors;
use crate::scoper::Scoper;

const DEFAULT_CONCURRENCY: usize = 10;

/// One scoped request to add to a fan-out. `rsp` fixes the response type;
/// its value is replaced by the decoded reply on success.
pub struct ScopedReq<Req, Rsp> {
    pub uid: String,
    /// Overrides the container's default scoper when set
    pub from: Option<Arc<dyn Scoper>>,
    pub service: String,
    pub endpoint: String,
    pub req: Req,
    pub rsp: Rsp,
    pub options: Option<Options>,
}

struct Slot {
    decode: Box<dyn Fn(&CallerResponse) -> Result<Box<dyn Any + Send + Sync>, String> + Send + Sync>,
    value: Option<Box<dyn Any + Send + Sync>>,
}

/// A session of N parallel requests.
///
/// ## Purpose
/// Coordinates fan-out RPCs with bounded concurrency and per-request
/// error aggregation. Build with a caller, add scoped requests,
/// `execute` once, then read per-uid outcomes.
///
/// ## Invariants
/// - After `execute`, every uid holds exactly one of: a decoded
///   response, or an entry in the error set.
/// - `execute` runs at most once per instance; `reset` recycles it.
///
/// ## Examples
/// ```rust,ignore
/// let mut mc = MultiClient::new(caller, config)
///     .default_scope_from(Arc::new(server.scoper()));
/// mc.add_scoped_req(ScopedReq {
///     uid: "customer".into(),
///     from: None,
///     service: "com.corvid.service.customer".into(),
///     endpoint: "retrieve".into(),
///     req: RetrieveRequest { id },
///     rsp: RetrieveResponse::default(),
///     options: None,
/// });
/// mc.execute().await;
/// if let Some(err) = mc.platform_error("retrieve") {
///     return Err(err);
/// }
/// ```
pub struct MultiClient {
    default_from_scope: Option<Arc<dyn Scoper>>,
    done: bool,
    concurrency: Option<usize>,
    caller: Caller,
    config: Arc<ConfigStore>,
    requests: HashMap<String, Request>,
    targets: HashMap<String, (String, String)>,
    slots: HashMap<String, Slot>,
    errors: Errors,
}

impl MultiClient {
    pub fn new(caller: Caller, config: Arc<ConfigStore>) -> Self {
        Self {
            default_from_scope: None,
            done: false,
            concurrency: None,
            caller,
            config,
            requests: HashMap::new(),
            targets: HashMap::new(),
            slots: HashMap::new(),
            errors: Errors::new(None),
        }
    }

    /// Define a default scoper so added requests don't each have to carry
    /// one.
    pub fn default_scope_from(mut self, scoper: Arc<dyn Scoper>) -> Self {
        self.default_from_scope = Some(Arc::clone(&scoper));
        self.errors.default_scoper = Some(scoper);
        self
    }

    /// Swap the caller for this container (overrides the default).
    pub fn set_caller(mut self, caller: Caller) -> Self {
        self.caller = caller;
        self
    }

    /// Override the configured worker count.
    pub fn set_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = Some(concurrency);
        self
    }

    /// Remove all requests and results, ready for re-use.
    pub fn reset(&mut self) -> &mut Self {
        self.requests.clear();
        self.targets.clear();
        self.slots.clear();
        self.errors = Errors::new(self.default_from_scope.clone());
        self.done = false;
        self
    }

    /// Append a prepared request. Panics on a duplicate uid, which is a
    /// programming error in the caller.
    pub fn add_scoped_req<Req: WireMessage, Rsp: WireMessage>(
        &mut self,
        sr: ScopedReq<Req, Rsp>,
    ) -> &mut Self {
        if self.requests.contains_key(&sr.uid) || self.errors.for_uid(&sr.uid).is_some() {
            panic!(
                "cannot add scoped request with uid '{}', already exists within this MultiClient",
                sr.uid
            );
        }

        let from = sr.from.or_else(|| self.default_from_scope.clone());
        self.targets
            .insert(sr.uid.clone(), (sr.service.clone(), sr.endpoint.clone()));
        self.slots.insert(
            sr.uid.clone(),
            Slot {
                decode: Box::new(|raw| {
                    codec::unmarshal::<Rsp>(raw.content_type, &raw.body)
                        .map(|v| Box::new(v) as Box<dyn Any + Send + Sync>)
                        .map_err(|e| e.to_string())
                }),
                value: None,
            },
        );

        let built = codec::marshal(ContentKind::OctetStream, &sr.req)
            .map_err(|e| e.to_string())
            .and_then(|payload| {
                match &from {
                    Some(scoper) => scoper
                        .scoped_request(
                            &sr.service,
                            &sr.endpoint,
                            ContentKind::OctetStream,
                            payload,
                        ),
                    None => Request::new_proto(&sr.service, &sr.endpoint, payload),
                }
                .map_err(|e| e.to_string())
            });

        match built {
            Ok(mut request) => {
                if let Some(options) = sr.options {
                    request.set_options(options);
                }
                self.requests.insert(sr.uid.clone(), request);
            }
            Err(err) => {
                self.errors.set(
                    &sr.uid,
                    &sr.service,
                    &sr.endpoint,
                    PlatformError::internal_server(
                        "com.corvid.kernel.multirequest.badrequest",
                        err,
                    ),
                    from,
                );
            }
        }

        self
    }

    /// Run all requests in parallel with bounded concurrency, blocking
    /// until every in-flight call has completed. At most once per
    /// instance; `reset` recycles.
    pub async fn execute(&mut self) -> &mut Self {
        if self.done {
            panic!("cannot repeat execute() on a MultiClient");
        }
        self.done = true;

        let concurrency = self.concurrency.unwrap_or_else(|| {
            self.config
                .at_path(&["corvid", "platform", "request", "concurrency"])
                .as_int(DEFAULT_CONCURRENCY as i64) as usize
        });
        let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));

        let mut handles = Vec::with_capacity(self.requests.len());
        for (uid, request) in self.requests.drain() {
            if self.errors.for_uid(&uid).is_some() {
                continue;
            }
            let caller = Arc::clone(&self.caller);
            let semaphore = Arc::clone(&semaphore);
            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore open");
                let result = caller(request).await;
                (uid, result)
            }));
        }

        for handle in handles {
            let Ok((uid, result)) = handle.await else {
                continue;
            };
            let (service, endpoint) = self
                .targets
                .get(&uid)
                .cloned()
                .unwrap_or_default();
            match result {
                Ok(raw) => {
                    let slot = self.slots.get_mut(&uid).expect("slot registered");
                    match (slot.decode)(&raw) {
                        Ok(value) => slot.value = Some(value),
                        Err(err) => self.errors.set(
                            &uid,
                            &service,
                            &endpoint,
                            PlatformError::internal_server(
                                "com.corvid.kernel.platform.unmarshal",
                                err,
                            ),
                            None,
                        ),
                    }
                }
                Err(err) => {
                    self.errors.set(&uid, &service, &endpoint, err, None);
                }
            }
        }

        self
    }

    /// Whether ANY request resulted in an error.
    pub fn any_errors(&self) -> bool {
        self.errors.any_errors()
    }

    /// Like `any_errors`, ignoring the supplied kinds and codes.
    pub fn any_errors_ignoring(&self, kinds: &[ErrorKind], codes: &[&str]) -> bool {
        self.errors.ignore_kind(kinds).ignore_code(codes).any_errors()
    }

    /// One platform error describing every failure: none → `None`, one →
    /// verbatim, several → aggregated under `scoper.context + "." + suffix`.
    pub fn platform_error(&self, code_suffix: &str) -> Option<PlatformError> {
        match self.errors.count() {
            0 => None,
            1 => self.errors.combined(),
            _ => self.errors.suffix(code_suffix).combined(),
        }
    }

    /// The full error view.
    pub fn errors(&self) -> Errors {
        self.errors.clone()
    }

    /// `None` when the request with this uid succeeded, else its error.
    pub fn succeeded(&self, uid: &str) -> Option<PlatformError> {
        self.errors.for_uid(uid)
    }

    /// The decoded response for a uid, when it succeeded.
    pub fn response<T: WireMessage>(&self, uid: &str) -> Option<T> {
        self.slots
            .get(uid)
            .and_then(|slot| slot.value.as_ref())
            .and_then(|value| value.downcast_ref::<T>())
            .cloned()
    }
}

/// Single scoped request in one step: add, execute, return the outcome.
pub async fn call<Req: WireMessage, Rsp: WireMessage>(
    caller: Caller,
    config: Arc<ConfigStore>,
    scope: Arc<dyn Scoper>,
    service: &str,
    endpoint: &str,
    request: Req,
) -> Result<Rsp, PlatformError> {
    let mut mc = MultiClient::new(caller, config).default_scope_from(scope);
    mc.add_scoped_req(ScopedReq {
        uid: String::new(),
        from: None,
        service: service.to_string(),
        endpoint: endpoint.to_string(),
        req: request,
        rsp: Rsp::default(),
        options: None,
    });
    mc.execute().await;
    match mc.succeeded("") {
        Some(err) => Err(err),
        None => Ok(mc.response::<Rsp>("").expect("response filled on success")),
    }
}
