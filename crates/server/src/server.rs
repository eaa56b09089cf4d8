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

//! The server: dispatch, lifecycle, graceful drain
//!
//! Every inbound delivery is classified (service mismatch / heartbeat /
//! publication / request) and handled on a freshly spawned task. Panics in
//! handlers are isolated: counted, published to the failure topic, and the
//! delivery dropped.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use corvid_broker::codec::WireMessage;
use corvid_broker::{Broker, ContentKind, Delivery};
use corvid_circuit_breaker::CircuitRegistry;
use corvid_client::{Client, Request, RequestError, Tracer};
use corvid_config::ConfigStore;
use corvid_errors::{ErrorKind, ErrorTracker, PlatformError};
use futures::FutureExt;
use thiserror::Error;
use uuid::Uuid;

use crate::auth::SessionStore;
use crate::discovery::Discovery;
use crate::endpoint::{Endpoint, Middleware};
use crate::failure::{publish_error, publish_failure};
use crate::healthchecks::{
    bad_role_check, capacity_check, circuit_check, config_loaded_check, Checker,
    HealthCheckRegistry,
};
use crate::middleware::{
    access_log_middleware, auth_middleware, instrumented_middleware, token_middleware,
    tracing_middleware, wait_group_middleware,
};
use crate::registry::{Registry, RegistryError};
use crate::request::ServerRequest;
use crate::response::ServerResponse;
use crate::scoper::{scoped_request, ServerScoper};
use crate::tokens::TokenBuckets;
use crate::waitgroup::WaitGroup;

/// How long graceful shutdown waits for in-flight requests.
const REQUESTS_WAIT_TIMEOUT: Duration = Duration::from_secs(60);

/// Run options.
#[derive(Debug, Clone, Default)]
pub struct ServerOptions {
    /// Declare and bind our own queue (otherwise an external binder does)
    pub self_bind: bool,
    /// Exit the process when discovery heartbeating fails for too long
    pub die: bool,
}

/// Identity and build metadata for this service instance.
pub struct ServerInfo {
    pub name: String,
    pub description: String,
    /// Release timestamp
    pub version: u64,
    pub source: String,
    pub owner_email: String,
    pub owner_mobile: String,
    pub owner_team: String,
    /// Unique per-process name; also the queue we consume from
    pub instance_id: String,
    pub hostname: String,
    pub az: String,
    started: tokio::time::Instant,
}

impl ServerInfo {
    fn new(config: &ServerConfig) -> Self {
        Self {
            name: config.name.clone(),
            description: config.description.clone(),
            version: config.version,
            source: config.source.clone(),
            owner_email: config.owner_email.clone(),
            owner_mobile: config.owner_mobile.clone(),
            owner_team: config.owner_team.clone(),
            instance_id: format!("server-{}-{}", config.name, Uuid::new_v4()),
            hostname: corvid_client::util::hostname(),
            az: corvid_client::util::az_name(),
            started: tokio::time::Instant::now(),
        }
    }

    pub fn uptime_seconds(&self) -> i64 {
        self.started.elapsed().as_secs() as i64
    }

    #[cfg(test)]
    pub(crate) fn for_tests(name: &str) -> Self {
        Self::new(&ServerConfig::new(name))
    }
}

/// Static configuration for one server.
pub struct ServerConfig {
    pub name: String,
    pub description: String,
    pub version: u64,
    pub source: String,
    pub owner_email: String,
    pub owner_mobile: String,
    pub owner_team: String,
    /// Concurrent requests served per calling service
    pub concurrent_requests: usize,
    /// Publish handler INTERNAL_SERVER errors to the monitoring topic
    pub publish_errors: bool,
    /// Common-log-format access log destination
    pub access_log: Option<Arc<Mutex<Box<dyn Write + Send>>>>,
}

impl ServerConfig {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            description: String::new(),
            version: 0,
            source: String::new(),
            owner_email: String::new(),
            owner_mobile: String::new(),
            owner_team: String::new(),
            concurrent_requests: 1000,
            publish_errors: true,
            access_log: None,
        }
    }
}

/// Errors that end a server run. Each maps to the process exit code the
/// binary should use.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("No service name found")]
    MissingName,

    #[error("Error registering endpoint: {0}")]
    Registration(#[from] RegistryError),

    #[error("There are no endpoints for this service")]
    NoEndpoints,

    #[error("Failed to consume: {0}")]
    ConsumeFailed(corvid_broker::BrokerError),

    #[error("Stopping due to consume channel closing")]
    ConsumeClosed,

    #[error("Failed to self-bind: {0}")]
    BindFailed(corvid_broker::BrokerError),
}

impl ServerError {
    pub fn exit_code(&self) -> i32 {
        match self {
            ServerError::MissingName => 1,
            ServerError::Registration(_) => 2,
            ServerError::NoEndpoints => 3,
            ServerError::ConsumeFailed(_) => 5,
            ServerError::ConsumeClosed => 6,
            ServerError::BindFailed(_) => 7,
        }
    }
}

type Hook = Box<dyn Fn() + Send + Sync>;

/// A service endpoint host.
pub struct Server {
    info: Arc<ServerInfo>,
    broker: Arc<dyn Broker>,
    config: Arc<ConfigStore>,
    client: Arc<dyn Client>,
    session_store: Arc<dyn SessionStore>,
    registry: Arc<Registry>,
    tokens: Arc<TokenBuckets>,
    wg: WaitGroup,
    healthchecks: Arc<HealthCheckRegistry>,
    discovery: OnceLock<Arc<Discovery>>,
    draining: AtomicBool,
    publish_errors: AtomicBool,
    post_connect_handlers: Mutex<Vec<Hook>>,
    cleanup_handlers: Mutex<Vec<Hook>>,
}

impl Server {
    /// Assemble a server: registry, default middleware stack, admin
    /// endpoints and built-in health checks.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        server_config: ServerConfig,
        broker: Arc<dyn Broker>,
        config: Arc<ConfigStore>,
        client: Arc<dyn Client>,
        breakers: Arc<CircuitRegistry>,
        tracker: Arc<ErrorTracker>,
        session_store: Arc<dyn SessionStore>,
    ) -> Result<Arc<Self>, ServerError> {
        if server_config.name.is_empty() {
            return Err(ServerError::MissingName);
        }

        let info = Arc::new(ServerInfo::new(&server_config));
        tracing::info!(name = %info.name, version = info.version, "starting up");

        let registry = Arc::new(Registry::new());
        let tokens = Arc::new(TokenBuckets::new(server_config.concurrent_requests));
        let wg = WaitGroup::new();
        let tracer = Tracer::new(Arc::clone(&broker), info.instance_id.clone());
        let healthchecks = Arc::new(HealthCheckRegistry::new(Arc::clone(&config)));

        // Default middleware, innermost first; the last registered is the
        // outermost when a request enters
        registry.add_middleware(wait_group_middleware(wg.clone()));
        registry.add_middleware(token_middleware(Arc::clone(&tokens), info.name.clone()));
        registry.add_middleware(instrumented_middleware());
        registry.add_middleware(tracing_middleware(tracer, Arc::clone(&info)));
        registry.add_middleware(auth_middleware(Arc::clone(&tracker)));
        registry.add_middleware(access_log_middleware(server_config.access_log.clone()));

        // Default admin endpoints
        registry.add(crate::handlers::health_endpoint(Arc::clone(&healthchecks)))?;
        registry.add(crate::handlers::stats_endpoint(
            Arc::clone(&info),
            Arc::clone(&tokens),
            Arc::clone(&registry),
        ))?;
        registry.add(crate::handlers::loaded_config_endpoint(Arc::clone(&config)))?;
        registry.add(crate::handlers::jsonschema_endpoint(Arc::clone(&registry)))?;

        // Built-in platform health checks
        healthchecks.register(
            "com.corvid.kernel.configloaded",
            config_loaded_check(Arc::clone(&config)),
        );
        healthchecks.register(
            "com.corvid.kernel.servicetoservice.auth.badrole",
            bad_role_check(Arc::clone(&tracker)),
        );
        healthchecks.register(
            "com.corvid.kernel.resource.capacity",
            capacity_check(Arc::clone(&tokens)),
        );
        healthchecks.register("com.corvid.kernel.client.circuit", circuit_check(breakers));

        Ok(Arc::new(Self {
            info,
            broker,
            config,
            client,
            session_store,
            registry,
            tokens,
            wg,
            healthchecks,
            discovery: OnceLock::new(),
            draining: AtomicBool::new(false),
            publish_errors: AtomicBool::new(server_config.publish_errors),
            post_connect_handlers: Mutex::new(Vec::new()),
            cleanup_handlers: Mutex::new(Vec::new()),
        }))
    }

    pub fn info(&self) -> &ServerInfo {
        &self.info
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Register endpoints with the registry.
    pub fn register(&self, endpoints: Vec<Endpoint>) -> Result<(), ServerError> {
        for ep in endpoints {
            let name = ep.name.clone();
            self.registry.add(ep)?;
            tracing::info!(endpoint = %name, "registered endpoint");
        }
        Ok(())
    }

    /// Register additional middleware; applies to endpoints registered
    /// after this call.
    pub fn register_middleware(&self, mw: Middleware) {
        self.registry.add_middleware(mw);
    }

    /// Register a standard health check.
    pub fn health_check(&self, id: &str, checker: Checker) {
        self.healthchecks.register(id, checker);
    }

    /// Register a health check with an explicit priority.
    pub fn priority_health_check(&self, id: &str, checker: Checker, priority: u32) {
        self.healthchecks.register_with_priority(id, checker, priority);
    }

    /// Run after the broker consume loop is up.
    pub fn register_post_connect_handler(&self, f: Hook) {
        self.post_connect_handlers.lock().unwrap().push(f);
    }

    /// Run during graceful shutdown, after in-flight requests drain.
    pub fn register_cleanup_handler(&self, f: Hook) {
        self.cleanup_handlers.lock().unwrap().push(f);
    }

    /// Stop publishing handler error events to the monitoring topic.
    pub fn disable_error_publishing(&self) {
        self.publish_errors.store(false, Ordering::SeqCst);
    }

    /// Mint an outbound request carrying this server's scope
    /// (service-to-service, pre-authorised).
    pub fn scoped_request<T: WireMessage>(
        &self,
        service: &str,
        endpoint: &str,
        payload: &T,
    ) -> Result<Request, RequestError> {
        let bytes = corvid_broker::codec::marshal(ContentKind::OctetStream, payload)?;
        scoped_request(&self.info.name, service, endpoint, ContentKind::OctetStream, bytes)
    }

    /// A scoper for this server, for labelling fan-out errors.
    pub fn scoper(&self) -> ServerScoper {
        ServerScoper::new(self.info.name.clone())
    }

    /// A scoper propagating one inbound request's scope.
    pub fn request_scoper(&self, req: Arc<ServerRequest>) -> ServerScoper {
        ServerScoper::for_request(self.info.name.clone(), req)
    }

    /// Listen for deliveries until shutdown (Ok) or the broker fails the
    /// consume channel (Err). Call from the binary's main with the
    /// returned error's exit code.
    pub async fn run(self: &Arc<Self>, opts: ServerOptions) -> Result<(), ServerError> {
        if self.registry.size() == 0 {
            return Err(ServerError::NoEndpoints);
        }

        let mut deliveries = self
            .broker
            .consume(&self.info.instance_id)
            .await
            .map_err(ServerError::ConsumeFailed)?;

        if opts.self_bind {
            // Binding comes after consuming so the queue exists
            self.broker
                .bind_service(&self.info.name, &self.info.instance_id)
                .await
                .map_err(ServerError::BindFailed)?;
            for ep in self.registry.iterate() {
                if let Some(topic) = &ep.subscribe {
                    self.broker
                        .bind_topic(topic, &self.info.instance_id)
                        .await
                        .map_err(ServerError::BindFailed)?;
                }
            }
        }

        // Announce ourselves to the discovery service
        let discovery = Discovery::new(
            Arc::clone(&self.info),
            Arc::clone(&self.registry),
            Arc::clone(&self.client),
        );
        discovery.spawn_tick(opts.die);
        {
            let discovery = Arc::clone(&discovery);
            tokio::spawn(async move {
                let _ = discovery.connect().await;
            });
        }
        let _ = self.discovery.set(discovery);

        for handler in self.post_connect_handlers.lock().unwrap().drain(..) {
            tokio::spawn(async move { handler() });
        }

        while let Some(delivery) = deliveries.recv().await {
            if self.draining.load(Ordering::SeqCst) {
                // Drain mode: no new handlers
                continue;
            }
            let server = Arc::clone(self);
            tokio::spawn(async move {
                server.handle_delivery(delivery).await;
            });
        }

        if self.draining.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ServerError::ConsumeClosed)
        }
    }

    /// Graceful shutdown: stop dispatching, unregister from discovery,
    /// drop the broker, await in-flight handlers (bounded), run cleanup.
    pub async fn shutdown(&self) {
        self.draining.store(true, Ordering::SeqCst);

        if let Some(discovery) = self.discovery.get() {
            let _ = discovery.disconnect().await;
        }

        self.broker.disconnect().await;

        if tokio::time::timeout(REQUESTS_WAIT_TIMEOUT, self.wg.wait())
            .await
            .is_err()
        {
            tracing::warn!("giving up waiting for outstanding requests");
        } else {
            tracing::debug!("all requests finished");
        }

        for handler in self.cleanup_handlers.lock().unwrap().drain(..) {
            handler();
        }
    }

    /// Exit codes are part of the platform contract; binaries funnel
    /// through here so shutdown always runs first.
    pub async fn exit(&self, code: i32) -> ! {
        tracing::info!(code, "exiting");
        self.shutdown().await;
        std::process::exit(code)
    }

    /// Spawn a handler for SIGINT/SIGTERM/SIGQUIT that drains and exits
    /// with code 2.
    pub fn spawn_signal_handler(self: &Arc<Self>) {
        let server = Arc::clone(self);
        tokio::spawn(async move {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigint = signal(SignalKind::interrupt()).expect("SIGINT handler");
            let mut sigterm = signal(SignalKind::terminate()).expect("SIGTERM handler");
            let mut sigquit = signal(SignalKind::quit()).expect("SIGQUIT handler");

            tokio::select! {
                _ = sigint.recv() => {},
                _ = sigterm.recv() => {},
                _ = sigquit.recv() => {},
            }
            tracing::info!("received shutdown signal");
            server.exit(2).await;
        });
    }

    /// Handle one delivery with panic isolation.
    pub async fn handle_delivery(self: &Arc<Self>, delivery: Delivery) {
        let req = Arc::new(ServerRequest::from_delivery(delivery));
        let dispatch = std::panic::AssertUnwindSafe(self.dispatch(Arc::clone(&req))).catch_unwind();

        if let Err(panic) = dispatch.await {
            let reason = panic_message(panic);
            tracing::error!(
                message_id = req.message_id(),
                destination = %req.destination(),
                reason,
                "panic while handling request"
            );
            metrics::counter!("corvid_server_panics_total").increment(1);
            publish_failure(self.client.as_ref(), &self.info, &reason).await;
        }
    }

    async fn dispatch(self: &Arc<Self>, req: Arc<ServerRequest>) {
        // Deliveries meant for some other service are dropped outright
        if !req.service().is_empty() && req.service() != self.info.name {
            tracing::error!(
                wanted = req.service(),
                we_are = %self.info.name,
                "message not meant for this service"
            );
            return;
        }

        if req.is_heartbeat() {
            self.handle_heartbeat(&req).await;
            return;
        }

        if req.is_publication() {
            self.handle_publication(req).await;
            return;
        }

        self.handle_rpc(req).await;
    }

    async fn handle_heartbeat(&self, req: &ServerRequest) {
        let Some(discovery) = self.discovery.get() else {
            tracing::warn!(from = req.reply_to(), "heartbeat before discovery started");
            return;
        };
        if discovery.is_connected().await {
            tracing::trace!(from = req.reply_to(), "inbound heartbeat");
            discovery.beat();
            let pong = ServerResponse::pong(req);
            if let Err(err) = self.broker.send_response(&pong, &self.info.instance_id).await {
                tracing::warn!(%err, "failed to send heartbeat reply");
            }
        } else {
            tracing::warn!(from = req.reply_to(), "not connected but received heartbeat");
        }
    }

    async fn handle_publication(&self, req: Arc<ServerRequest>) {
        tracing::trace!(topic = req.topic(), "inbound publication");

        let Some(endpoint) = self.registry.find(req.topic()) else {
            return;
        };

        if let Some(descriptor) = &endpoint.request_proto {
            let Some(kind) = req.content_kind() else {
                tracing::warn!(content_type = req.content_type(), "unknown content type");
                return;
            };
            match descriptor.decode(kind, req.payload()) {
                Ok(data) => req.set_data(data),
                Err(err) => {
                    tracing::warn!(%err, "failed to unmarshal published message");
                    return;
                }
            }
        }

        // Pub/sub has no reply; errors are only logged
        let handler = Arc::clone(&endpoint.handler);
        if let Err(err) = handler(req).await {
            tracing::warn!(%err, "failed to process published message");
        }
    }

    async fn handle_rpc(self: &Arc<Self>, req: Arc<ServerRequest>) {
        tracing::trace!(
            message_id = req.message_id(),
            from = req.reply_to(),
            "inbound message"
        );

        let Some(endpoint) = self.registry.find(req.endpoint()) else {
            let err = PlatformError::internal_server(
                "com.corvid.kernel.handler.missing",
                format!("No handler registered for {}", req.destination()),
            );
            self.send_error(&req, &err).await;
            return;
        };

        // Recover the security scope once, before the chain runs
        req.init_scope(self.session_store.as_ref()).await;

        let kind = req.content_kind();
        let mut result = match (&endpoint.request_proto, kind) {
            (Some(descriptor), Some(kind)) => match descriptor.decode(kind, req.payload()) {
                Ok(data) => {
                    req.set_data(data);
                    Ok(None)
                }
                Err(err) => Err(PlatformError::internal_server(
                    format!("{}.{}.unmarshal", self.info.name, endpoint.name),
                    err,
                )),
            },
            (Some(_), None) => Err(PlatformError::internal_server(
                format!("{}.{}.unmarshal", self.info.name, endpoint.name),
                format!("Unknown content type: {}", req.content_type()),
            )),
            (None, _) => Ok(None),
        };

        // Call the composed handler if decoding went fine
        if result.is_ok() {
            let handler = Arc::clone(&endpoint.handler);
            result = handler(Arc::clone(&req)).await;
        }

        match result {
            Ok(reply) => {
                let payload = match reply {
                    Some(reply) => {
                        let Some(descriptor) = &endpoint.response_proto else {
                            let err = PlatformError::internal_server(
                                "com.corvid.kernel.server.mismatchedprotocol",
                                "Handler returned a payload but no response protocol is declared",
                            );
                            self.send_error(&req, &err).await;
                            return;
                        };
                        let kind = kind.unwrap_or(ContentKind::OctetStream);
                        match descriptor.encode(kind, reply.as_ref()) {
                            None => {
                                // Runtime type differs from the declared
                                // response protocol
                                let err = PlatformError::internal_server(
                                    "com.corvid.kernel.server.mismatchedprotocol",
                                    format!(
                                        "Mismatched response protocol, expected {}",
                                        descriptor.type_name()
                                    ),
                                );
                                self.send_error(&req, &err).await;
                                return;
                            }
                            Some(Err(err)) => {
                                let err = PlatformError::internal_server(
                                    "com.corvid.kernel.marshal.error",
                                    format!("Could not marshal response: {err}"),
                                );
                                self.send_error(&req, &err).await;
                                return;
                            }
                            Some(Ok(bytes)) => bytes,
                        }
                    }
                    None => Vec::new(),
                };

                let rsp = ServerResponse::reply(&req, payload);
                if let Err(err) = self.broker.send_response(&rsp, &self.info.instance_id).await {
                    tracing::error!(%err, "unable to send response");
                }
            }
            Err(err) => {
                match err.kind() {
                    ErrorKind::BadRequest | ErrorKind::Forbidden | ErrorKind::NotFound => {
                        tracing::debug!(
                            kind = err.kind().as_str(),
                            destination = %req.destination(),
                            from = req.from(),
                            %err,
                            "handler error"
                        );
                    }
                    kind => {
                        if kind == ErrorKind::InternalServer
                            && self.publish_errors.load(Ordering::SeqCst)
                        {
                            let server = Arc::clone(self);
                            let req = Arc::clone(&req);
                            let err = err.clone();
                            tokio::spawn(async move {
                                publish_error(server.client.as_ref(), &server.info, &req, &err)
                                    .await;
                            });
                        }
                        tracing::error!(
                            kind = err.kind().as_str(),
                            destination = %req.destination(),
                            from = req.from(),
                            %err,
                            "handler error"
                        );
                    }
                }
                self.send_error(&req, &err).await;
            }
        }
    }

    async fn send_error(&self, req: &ServerRequest, err: &PlatformError) {
        match ServerResponse::error(req, err) {
            Ok(rsp) => {
                if let Err(send_err) = self.broker.send_response(&rsp, &self.info.instance_id).await
                {
                    tracing::error!(%send_err, "unable to send error response");
                }
            }
            Err(build_err) => {
                tracing::error!(%build_err, "unable to build error response");
            }
        }
    }
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}
