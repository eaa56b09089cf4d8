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

//! The client core: request dispatch, reply correlation, retries

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use corvid_broker::codec::WireMessage;
use corvid_broker::{Broker, BrokerError};
use corvid_circuit_breaker::CircuitRegistry;
use corvid_config::ConfigStore;
use corvid_errors::{ErrorTracker, PlatformError};
use corvid_proto::error::PlatformError as PlatformErrorProto;
use corvid_proto::trace::trace_event::EventType;
use corvid_proto::trace::TraceEvent;
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

use crate::inflight::Inflight;
use crate::publication::Publication;
use crate::request::Request;
use crate::response::Response;
use crate::timeout::Timeout;
use crate::trace::{now_nanos, Tracer};
use crate::util;

const DEFAULT_RETRIES: u32 = 2;

/// Per-request options. Anything unset falls back to the client defaults
/// (and, for the timeout, to the oracle).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Options {
    pub retries: Option<u32>,
    /// Explicit per-attempt timeout, suppressing the oracle
    pub timeout: Option<Duration>,
}

/// A service client.
///
/// Object safe so that tests and bridges can swap in their own; typed
/// decoding lives in the free [`req`] helper and on
/// [`DefaultClient::req`].
#[async_trait]
pub trait Client: Send + Sync {
    /// Send a request and await the correlated raw reply.
    async fn custom_req(
        &self,
        req: Request,
        options: Option<Options>,
    ) -> Result<Response, PlatformError>;

    /// Fire-and-forget request: published on the request exchange, no
    /// reply awaited.
    async fn push(&self, req: Request) -> Result<(), BrokerError>;

    /// Publish on the topic exchange.
    async fn publish(&self, publication: Publication) -> Result<(), BrokerError>;
}

/// Send a request through any client and unmarshal the successful reply
/// into `rsp`.
pub async fn req<T: WireMessage>(
    client: &dyn Client,
    request: Request,
    rsp: &mut T,
    options: Option<Options>,
) -> Result<(), PlatformError> {
    let response = client.custom_req(request, options).await?;
    *rsp = response.unmarshal().map_err(|err| {
        PlatformError::internal_server("com.corvid.kernel.platform.unmarshal", err)
    })?;
    Ok(())
}

/// Build and publish a Publication in one step.
pub async fn publish<T: WireMessage>(
    client: &dyn Client,
    topic: &str,
    payload: &T,
) -> Result<(), PlatformError> {
    let publication = Publication::new(topic, payload).map_err(|err| {
        PlatformError::internal_server("com.corvid.kernel.platform.publication", err)
    })?;
    client.publish(publication).await.map_err(|err| {
        PlatformError::internal_server("com.corvid.kernel.platform.publication", err)
    })
}

/// The broker-backed client.
pub struct DefaultClient {
    instance_id: String,
    broker: Arc<dyn Broker>,
    config: Arc<ConfigStore>,
    breakers: Arc<CircuitRegistry>,
    tracker: Arc<ErrorTracker>,
    tracer: Tracer,
    responses: Inflight,
    listening: Arc<Mutex<bool>>,
    timeout: Arc<Timeout>,
    hostname: String,
    az: String,
}

impl DefaultClient {
    /// Build a client owning its correlation map and timeout oracle. The
    /// oracle holds a weak handle back to this client for its discovery
    /// lookups.
    pub fn new(
        broker: Arc<dyn Broker>,
        config: Arc<ConfigStore>,
        breakers: Arc<CircuitRegistry>,
        tracker: Arc<ErrorTracker>,
    ) -> Arc<Self> {
        let instance_id = format!("client-{}", Uuid::new_v4());
        Arc::new_cyclic(|weak| Self {
            instance_id: instance_id.clone(),
            broker: Arc::clone(&broker),
            config: Arc::clone(&config),
            breakers,
            tracker,
            tracer: Tracer::new(Arc::clone(&broker), instance_id.clone()),
            responses: Inflight::new(),
            listening: Arc::new(Mutex::new(false)),
            timeout: Timeout::new(weak.clone(), config),
            hostname: util::hostname(),
            az: util::az_name(),
        })
    }

    /// This client's private reply queue name.
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Send a request and unmarshal the successful reply into `rsp`.
    pub async fn req<T: WireMessage>(
        &self,
        request: Request,
        rsp: &mut T,
        options: Option<Options>,
    ) -> Result<(), PlatformError> {
        let response = self.custom_req(request, options).await?;
        *rsp = response.unmarshal().map_err(|err| {
            PlatformError::internal_server("com.corvid.kernel.platform.unmarshal", err)
        })?;
        Ok(())
    }

    /// Make sure the consumer side is up for our reply queue. Holds the
    /// listening lock only for the consume call; the long-lived loop runs
    /// on its own task.
    async fn ensure_listening(&self) -> bool {
        let mut listening = self.listening.lock().await;
        if *listening {
            return true;
        }

        match self.broker.consume(&self.instance_id).await {
            Err(err) => {
                tracing::error!(%err, "client failed to consume");
                false
            }
            Ok(mut deliveries) => {
                *listening = true;
                tracing::debug!(queue = %self.instance_id, "client listening");

                let inflight = self.responses.clone();
                let flag = Arc::clone(&self.listening);
                tokio::spawn(async move {
                    while let Some(delivery) = deliveries.recv().await {
                        dispatch_reply(&inflight, delivery);
                    }
                    tracing::error!("client stopped listening, consume channel closed");
                    *flag.lock().await = false;
                });
                true
            }
        }
    }

    async fn do_req(
        &self,
        req: &Request,
        options: Option<&Options>,
    ) -> Result<Response, PlatformError> {
        let service = req.service().to_string();
        let endpoint = req.endpoint().to_string();

        if self.breakers.open(&service, &endpoint).await {
            metrics::counter!(
                "corvid_client_circuit_broken_total",
                "service" => service.clone(), "endpoint" => endpoint.clone()
            )
            .increment(1);
            tracing::warn!(service, endpoint, "broken circuit");
            return Err(PlatformError::circuit_broken(
                "com.corvid.kernel.platform.circuitbreaker",
                "Circuit is open",
            ));
        }

        let mut retries = DEFAULT_RETRIES;
        let mut explicit_timeout = None;
        if let Some(opts) = options {
            if let Some(r) = opts.retries {
                retries = r;
            }
            explicit_timeout = opts.timeout;
        }

        // Buffered so a late reply arriving after a retry was scheduled
        // never blocks the listener.
        let (tx, mut rx) = mpsc::channel((retries as usize) + 1);
        self.responses.add(req.message_id(), tx);
        let result = self
            .attempt_loop(req, retries, explicit_timeout, &mut rx)
            .await;
        self.responses.remove(req.message_id());
        result
    }

    async fn attempt_loop(
        &self,
        req: &Request,
        retries: u32,
        explicit_timeout: Option<Duration>,
        rx: &mut mpsc::Receiver<Response>,
    ) -> Result<Response, PlatformError> {
        let service = req.service();
        let endpoint = req.endpoint();
        let mut timeout = explicit_timeout.unwrap_or_default();

        for attempt in 1..=retries + 1 {
            let start = tokio::time::Instant::now();

            if !self.ensure_listening().await {
                tracing::error!("client listener failed");
                metrics::counter!("corvid_client_listen_failures_total").increment(1);
                return Err(PlatformError::internal_server(
                    "com.corvid.kernel.platform.client.listenfail",
                    "Listener failed",
                ));
            }

            if explicit_timeout.is_none() {
                timeout = self.timeout.get(service, endpoint, attempt);
            }
            tracing::trace!(
                attempt,
                message_id = req.message_id(),
                ?timeout,
                "sync request attempt"
            );

            // Publish regardless of listener hiccups mid-call; the
            // listener monitor reconnects on its own.
            if let Err(err) = self.broker.send_request(req, &self.instance_id).await {
                tracing::error!(%err, "failed to send request");
            }

            match tokio::time::timeout(timeout, rx.recv()).await {
                Ok(Some(payload)) => {
                    if payload.is_error() {
                        self.record_timing(service, endpoint, "error", start.elapsed());

                        let error_proto: PlatformErrorProto =
                            payload.unmarshal().map_err(|err| {
                                metrics::counter!("corvid_client_bad_responses_total")
                                    .increment(1);
                                PlatformError::bad_response(
                                    "com.corvid.kernel.platform.badresponse",
                                    err,
                                )
                            })?;
                        let err = PlatformError::from_proto(&error_proto);
                        metrics::counter!(
                            "corvid_client_errors_total",
                            "code" => err.code().to_string()
                        )
                        .increment(1);

                        // Only a server fault degrades the circuit; the
                        // client being wrong is the callee working fine.
                        if err.is_internal_server() {
                            self.breakers.result(service, endpoint, Some(&err)).await;
                        } else {
                            self.breakers.result(service, endpoint, None).await;
                        }
                        return Err(err);
                    }

                    self.record_timing(service, endpoint, "success", start.elapsed());
                    self.breakers.result(service, endpoint, None).await;
                    return Ok(payload);
                }
                Ok(None) => {
                    // Our entry vanished under us; treat like a timed-out
                    // attempt.
                    tracing::warn!(
                        message_id = req.message_id(),
                        "reply channel closed mid-call"
                    );
                    self.breakers
                        .result(service, endpoint, Some(&attempt_timeout_error(req, timeout)))
                        .await;
                }
                Err(_) => {
                    tracing::error!(
                        service,
                        endpoint,
                        ?timeout,
                        message_id = req.message_id(),
                        "timeout awaiting reply"
                    );
                    self.record_timing(service, endpoint, "error", start.elapsed());
                    self.trace_attempt_timeout(req, attempt, timeout).await;
                    self.breakers
                        .result(service, endpoint, Some(&attempt_timeout_error(req, timeout)))
                        .await;
                }
            }
        }

        metrics::counter!(
            "corvid_client_errors_total",
            "code" => "com.corvid.kernel.platform.timeout".to_string()
        )
        .increment(1);

        Err(attempt_timeout_error(req, timeout))
    }

    fn record_timing(&self, service: &str, endpoint: &str, outcome: &'static str, d: Duration) {
        metrics::histogram!(
            "corvid_client_request_duration_seconds",
            "service" => service.to_string(),
            "endpoint" => endpoint.to_string(),
            "outcome" => outcome
        )
        .record(d.as_secs_f64());
    }

    fn base_event(&self, req: &Request, event_type: EventType) -> TraceEvent {
        TraceEvent {
            event_type: event_type as i32,
            timestamp: now_nanos(),
            trace_id: req.trace_id().to_string(),
            message_id: req.message_id().to_string(),
            parent_message_id: req.parent_message_id().to_string(),
            from: req.from().to_string(),
            from_endpoint: req.from_endpoint().to_string(),
            to: format!("{}.{}", req.service(), req.endpoint()),
            hostname: self.hostname.clone(),
            az: self.az.clone(),
            persistent_trace: req.trace_should_persist(),
            ..TraceEvent::default()
        }
    }

    async fn trace_req(&self, req: &Request) {
        self.tracer.send(self.base_event(req, EventType::Req)).await;
    }

    async fn trace_rsp(&self, req: &Request, err: Option<&PlatformError>, d: Duration) {
        let mut event = self.base_event(req, EventType::Rep);
        event.duration = d.as_nanos() as i64;
        if let Some(err) = err {
            event.error_code = err.code().to_string();
            event.error_description = err.description().to_string();
        }
        self.tracer.send(event).await;
    }

    async fn trace_attempt_timeout(&self, req: &Request, attempt: u32, timeout: Duration) {
        if req.trace_id().is_empty() {
            return;
        }
        let mut event = self.base_event(req, EventType::AttemptTimeout);
        event.duration = timeout.as_nanos() as i64;
        event.error_code = "com.corvid.kernel.platform.attemptTimeout".to_string();
        event.error_description = format!(
            "Attempt {} timeout talking to '{}.{}' after '{:?}' for '{}'",
            attempt,
            req.service(),
            req.endpoint(),
            timeout,
            req.message_id()
        );
        self.tracer.send(event).await;
    }
}

#[async_trait]
impl Client for DefaultClient {
    async fn custom_req(
        &self,
        mut req: Request,
        options: Option<Options>,
    ) -> Result<Response, PlatformError> {
        let options = options.or_else(|| req.options().cloned());

        let traced = req.should_trace(&self.config);
        if traced {
            self.trace_req(&req).await;
        }

        let start = tokio::time::Instant::now();
        let result = self.do_req(&req, options.as_ref()).await;

        if let Err(err) = &result {
            self.tracker
                .track(err.code(), &[req.from(), req.service(), req.endpoint()]);
        }
        if traced {
            self.trace_rsp(&req, result.as_ref().err(), start.elapsed())
                .await;
        }
        result
    }

    async fn push(&self, req: Request) -> Result<(), BrokerError> {
        self.broker.send_request(&req, &self.instance_id).await
    }

    async fn publish(&self, publication: Publication) -> Result<(), BrokerError> {
        self.broker
            .send_publication(&publication, &self.instance_id)
            .await
    }
}

fn dispatch_reply(inflight: &Inflight, delivery: corvid_broker::Delivery) {
    let rsp = Response::from_delivery(delivery);

    if rsp.correlation_id().is_empty() {
        tracing::error!("reply with no correlation id dropped");
        return;
    }

    match inflight.take(rsp.correlation_id()) {
        Some(ch) => {
            // Buffered send; dropping the sender closes the channel
            let _ = ch.try_send(rsp);
        }
        None => {
            tracing::error!(
                correlation_id = rsp.correlation_id(),
                "no return queue for reply, caller already retried or timed out"
            );
        }
    }
}

fn attempt_timeout_error(req: &Request, timeout: Duration) -> PlatformError {
    PlatformError::timeout(
        "com.corvid.kernel.platform.timeout",
        format!(
            "Request timed out talking to {}.{} from {} (most recent timeout {:?})",
            req.service(),
            req.endpoint(),
            req.from(),
            timeout
        ),
    )
    .with_context([req.service(), req.endpoint()])
}

#[cfg(test)]
mod tests {
    use super::*;
    use corvid_broker::{ContentKind, InMemoryBroker, RoutedResponse};
    use corvid_errors::ErrorKind;
    use corvid_proto::discovery::EndpointsRequest;

    const SERVICE: &str = "com.corvid.test";

    struct Reply {
        content_type: String,
        payload: Vec<u8>,
        message_type: String,
        message_id: String,
        reply_to: String,
    }

    impl RoutedResponse for Reply {
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

    fn platform() -> (
        Arc<InMemoryBroker>,
        Arc<ConfigStore>,
        Arc<CircuitRegistry>,
        Arc<DefaultClient>,
    ) {
        let broker = Arc::new(InMemoryBroker::new());
        let config = Arc::new(ConfigStore::new());
        let breakers = CircuitRegistry::new(Arc::clone(&config));
        let client = DefaultClient::new(
            broker.clone() as Arc<dyn Broker>,
            Arc::clone(&config),
            Arc::clone(&breakers),
            Arc::new(ErrorTracker::new()),
        );
        (broker, config, breakers, client)
    }

    /// Answer every request on the service queue by echoing the payload.
    async fn spawn_echo_server(broker: &Arc<InMemoryBroker>, reply_type: &'static str) {
        let mut deliveries = broker.consume("server-under-test").await.unwrap();
        broker
            .bind_service(SERVICE, "server-under-test")
            .await
            .unwrap();
        let broker = Arc::clone(broker);
        tokio::spawn(async move {
            while let Some(d) = deliveries.recv().await {
                let reply = Reply {
                    content_type: d.content_type.clone(),
                    payload: d.body.clone(),
                    message_type: reply_type.to_string(),
                    message_id: d.message_id.clone(),
                    reply_to: d.reply_to.clone(),
                };
                broker.send_response(&reply, "server-under-test").await.unwrap();
            }
        });
    }

    #[tokio::test(start_paused = true)]
    async fn req_round_trips_through_the_broker() {
        let (broker, _config, _breakers, client) = platform();
        spawn_echo_server(&broker, "reply").await;

        let payload = EndpointsRequest {
            service: "echo-me".into(),
        };
        let request = Request::new(SERVICE, "echo", &payload).unwrap();
        let message_id = request.message_id().to_string();

        let mut rsp = EndpointsRequest::default();
        client.req(request, &mut rsp, None).await.unwrap();
        assert_eq!(rsp.service, "echo-me");

        // Correlation entry is gone once the call completed
        assert!(!client.responses.contains(&message_id));
    }

    #[tokio::test(start_paused = true)]
    async fn error_reply_is_decoded_and_not_retried() {
        let (broker, _config, _breakers, client) = platform();

        let mut deliveries = broker.consume("server-under-test").await.unwrap();
        broker
            .bind_service(SERVICE, "server-under-test")
            .await
            .unwrap();
        let broker2 = Arc::clone(&broker);
        tokio::spawn(async move {
            let mut seen = 0u32;
            while let Some(d) = deliveries.recv().await {
                seen += 1;
                assert_eq!(seen, 1, "an error reply must not be retried");
                let err = PlatformError::not_found("com.corvid.test.missing", "nothing here");
                let body = corvid_broker::codec::marshal(
                    ContentKind::OctetStream,
                    &err.to_proto(),
                )
                .unwrap();
                let reply = Reply {
                    content_type: d.content_type.clone(),
                    payload: body,
                    message_type: "error".to_string(),
                    message_id: d.message_id.clone(),
                    reply_to: d.reply_to.clone(),
                };
                broker2.send_response(&reply, "server-under-test").await.unwrap();
            }
        });

        let request =
            Request::new(SERVICE, "missing", &EndpointsRequest::default()).unwrap();
        let err = client.custom_req(request, None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.code(), "com.corvid.test.missing");
    }

    #[tokio::test(start_paused = true)]
    async fn unanswered_request_times_out_after_all_attempts() {
        let (_broker, _config, _breakers, client) = platform();

        let request = Request::new(SERVICE, "void", &EndpointsRequest::default()).unwrap();
        let opts = Options {
            retries: Some(2),
            timeout: Some(Duration::from_millis(5)),
        };
        let err = client.custom_req(request, Some(opts)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert_eq!(err.code(), "com.corvid.kernel.platform.timeout");
        assert_eq!(err.context(), &[SERVICE.to_string(), "void".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn open_circuit_fails_fast() {
        let (_broker, _config, breakers, client) = platform();

        let err = PlatformError::timeout("code", "desc");
        for _ in 0..100 {
            breakers.result(SERVICE, "gated", Some(&err)).await;
        }

        let request = Request::new(SERVICE, "gated", &EndpointsRequest::default()).unwrap();
        let err = client.custom_req(request, None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CircuitBroken);
    }

    #[tokio::test(start_paused = true)]
    async fn listener_failure_surfaces_as_internal_error() {
        let (broker, _config, _breakers, client) = platform();
        broker.disconnect().await;

        let request = Request::new(SERVICE, "any", &EndpointsRequest::default()).unwrap();
        let err = client.custom_req(request, None).await.unwrap_err();
        assert_eq!(err.code(), "com.corvid.kernel.platform.client.listenfail");
    }

    #[tokio::test(start_paused = true)]
    async fn push_publishes_without_waiting() {
        let (broker, _config, _breakers, client) = platform();
        let mut deliveries = broker.consume("server-under-test").await.unwrap();
        broker
            .bind_service(SERVICE, "server-under-test")
            .await
            .unwrap();

        let request = Request::new(SERVICE, "fire", &EndpointsRequest::default()).unwrap();
        client.push(request).await.unwrap();

        let d = deliveries.recv().await.unwrap();
        assert_eq!(d.header("endpoint"), "fire");
    }

    #[tokio::test(start_paused = true)]
    async fn publish_reaches_topic_subscribers() {
        let (broker, _config, _breakers, client) = platform();
        let mut deliveries = broker.consume("subscriber").await.unwrap();
        broker.bind_topic("com.corvid.events", "subscriber").await.unwrap();

        publish(
            client.as_ref(),
            "com.corvid.events",
            &EndpointsRequest {
                service: "hello".into(),
            },
        )
        .await
        .unwrap();

        let d = deliveries.recv().await.unwrap();
        assert_eq!(d.header("topic"), "com.corvid.events");
    }
}
