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

//! The default middleware stack
//!
//! Registered innermost to outermost: waitgroup tracker, token-bucket
//! admission, instrumentation, tracing, authorization, access log. Each is
//! a factory capturing what it needs; composition happens in the registry
//! at endpoint registration time.

use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use corvid_client::trace::now_nanos;
use corvid_client::Tracer;
use corvid_errors::{ErrorKind, ErrorTracker, PlatformError};
use corvid_proto::trace::trace_event::EventType;
use corvid_proto::trace::TraceEvent;

use crate::authoriser::default_authoriser;
use crate::endpoint::{Endpoint, Handler, Middleware};
use crate::request::ServerRequest;
use crate::server::ServerInfo;
use crate::tokens::TokenBuckets;
use crate::waitgroup::WaitGroup;

/// Innermost: counts the handler in and out so graceful shutdown can
/// await completion. Uses a drop guard so a panicking handler still
/// counts out.
pub(crate) fn wait_group_middleware(wg: WaitGroup) -> Middleware {
    Arc::new(move |_ep: &Endpoint, next: Handler| {
        let wg = wg.clone();
        Arc::new(move |req| {
            let wg = wg.clone();
            let next = Arc::clone(&next);
            Box::pin(async move {
                struct Guard(WaitGroup);
                impl Drop for Guard {
                    fn drop(&mut self) {
                        self.0.done();
                    }
                }

                wg.add();
                let _guard = Guard(wg);
                next(req).await
            })
        })
    })
}

/// Bounded admission per calling service. Token acquisition is bounded by
/// the endpoint's promised mean response time.
pub(crate) fn token_middleware(tokens: Arc<TokenBuckets>, server_name: String) -> Middleware {
    Arc::new(move |ep: &Endpoint, next: Handler| {
        let tokens = Arc::clone(&tokens);
        let server_name = server_name.clone();
        let admission_timeout = Duration::from_millis(ep.mean.max(0) as u64);
        Arc::new(move |req: Arc<ServerRequest>| {
            let tokens = Arc::clone(&tokens);
            let server_name = server_name.clone();
            let next = Arc::clone(&next);
            Box::pin(async move {
                let caller = if req.from().is_empty() {
                    "unknown"
                } else {
                    req.from()
                };

                match tokens.acquire(caller, admission_timeout).await {
                    Some(_token) => next(req).await,
                    None => {
                        metrics::counter!("corvid_server_capacity_errors_total").increment(1);
                        Err(PlatformError::internal_server(
                            "com.corvid.kernel.server.capacity",
                            format!("Server {server_name} out of capacity"),
                        ))
                    }
                }
            })
        })
    })
}

/// Success/error timings and per-code error counters. Client faults
/// (bad request, not found) time as successes.
pub(crate) fn instrumented_middleware() -> Middleware {
    Arc::new(move |ep: &Endpoint, next: Handler| {
        let endpoint_name = ep.name.clone();
        Arc::new(move |req| {
            let endpoint_name = endpoint_name.clone();
            let next = Arc::clone(&next);
            Box::pin(async move {
                let start = tokio::time::Instant::now();
                let result = next(req).await;
                let elapsed = start.elapsed().as_secs_f64();

                match &result {
                    Ok(_) => {
                        metrics::histogram!(
                            "corvid_server_handler_duration_seconds",
                            "endpoint" => endpoint_name, "outcome" => "success"
                        )
                        .record(elapsed);
                    }
                    Err(err) => {
                        metrics::counter!(
                            "corvid_server_errors_total",
                            "code" => err.code().to_string()
                        )
                        .increment(1);
                        let outcome = match err.kind() {
                            ErrorKind::BadRequest | ErrorKind::NotFound => "success",
                            _ => "error",
                        };
                        metrics::histogram!(
                            "corvid_server_handler_duration_seconds",
                            "endpoint" => endpoint_name, "outcome" => outcome
                        )
                        .record(elapsed);
                    }
                }
                result
            })
        })
    })
}

/// Emits `IN` before the handler and `OUT` after, with duration and error
/// code.
pub(crate) fn tracing_middleware(tracer: Tracer, info: Arc<ServerInfo>) -> Middleware {
    Arc::new(move |_ep: &Endpoint, next: Handler| {
        let tracer = tracer.clone();
        let info = Arc::clone(&info);
        Arc::new(move |req: Arc<ServerRequest>| {
            let tracer = tracer.clone();
            let info = Arc::clone(&info);
            let next = Arc::clone(&next);
            Box::pin(async move {
                if !req.should_trace() {
                    return next(req).await;
                }

                let start = tokio::time::Instant::now();
                tracer.send(server_event(&info, &req, EventType::In)).await;

                let result = next(Arc::clone(&req)).await;

                let mut event = server_event(&info, &req, EventType::Out);
                event.duration = start.elapsed().as_nanos() as i64;
                if let Err(err) = &result {
                    event.error_code = err.code().to_string();
                    event.error_description = err.description().to_string();
                }
                tracer.send(event).await;

                result
            })
        })
    })
}

fn server_event(info: &ServerInfo, req: &ServerRequest, event_type: EventType) -> TraceEvent {
    TraceEvent {
        event_type: event_type as i32,
        timestamp: now_nanos(),
        trace_id: req.trace_id().to_string(),
        message_id: req.message_id().to_string(),
        parent_message_id: req.parent_message_id().to_string(),
        from: req.from().to_string(),
        to: req.destination(),
        hostname: info.hostname.clone(),
        az: info.az.clone(),
        handler_instance_id: info.instance_id.clone(),
        persistent_trace: req.trace_should_persist(),
        ..TraceEvent::default()
    }
}

/// Delegates to the endpoint's authoriser, marking the scope authorised
/// on success. Topic deliveries invoke the handler unconditionally.
/// Failed service-to-service role checks feed the bad-role health check.
pub(crate) fn auth_middleware(tracker: Arc<ErrorTracker>) -> Middleware {
    Arc::new(move |ep: &Endpoint, next: Handler| {
        let tracker = Arc::clone(&tracker);
        let authoriser = ep.authoriser.clone().unwrap_or_else(default_authoriser);
        Arc::new(move |req: Arc<ServerRequest>| {
            let tracker = Arc::clone(&tracker);
            let authoriser = Arc::clone(&authoriser);
            let next = Arc::clone(&next);
            Box::pin(async move {
                if req.is_publication() {
                    return next(req).await;
                }

                if let Err(err) = authoriser.authorise(&req) {
                    if err.code() == "com.corvid.kernel.auth.badrole"
                        && !req.scope().has_tried_auth()
                    {
                        tracker.track(
                            "com.corvid.kernel.auth.badrole",
                            &[req.from(), req.service(), req.endpoint()],
                        );
                    }
                    return Err(err);
                }

                req.scope().set_authorised(true);
                next(req).await
            })
        })
    })
}

/// Outermost: one Apache-common-log-style line per request. With no
/// writer configured the handler passes through untouched.
pub(crate) fn access_log_middleware(
    writer: Option<Arc<Mutex<Box<dyn Write + Send>>>>,
) -> Middleware {
    Arc::new(move |_ep: &Endpoint, next: Handler| {
        let Some(writer) = writer.clone() else {
            return next;
        };
        Arc::new(move |req: Arc<ServerRequest>| {
            let writer = Arc::clone(&writer);
            let next = Arc::clone(&next);
            Box::pin(async move {
                let result = next(Arc::clone(&req)).await;

                let user_id = req
                    .scope()
                    .auth_user()
                    .map(|u| u.id.clone())
                    .unwrap_or_default();
                let status = match &result {
                    Ok(_) => 200,
                    Err(err) => err.http_code(),
                };

                let line = format!(
                    "{} - {} [{}] \"GET {} HTTP/1.0\" {} 0\n",
                    req.from(),
                    user_id,
                    chrono::Local::now().format("%d/%b/%Y:%H:%M:%S %z"),
                    req.endpoint(),
                    status,
                );
                if let Ok(mut w) = writer.lock() {
                    let _ = w.write_all(line.as_bytes());
                }

                result
            })
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authoriser::open_to_the_world_authoriser;
    use crate::endpoint::HandlerReply;
    use corvid_proto::discovery::{EndpointsRequest, EndpointsResponse};

    fn passing_endpoint(name: &str) -> Endpoint {
        Endpoint::builder(name)
            .protocols::<EndpointsRequest, EndpointsResponse>()
            .authoriser(open_to_the_world_authoriser())
            .handler(|_req| async move { Ok(EndpointsResponse::default()) })
            .build()
    }

    fn request() -> Arc<ServerRequest> {
        Arc::new(ServerRequest::from_payload("com.corvid.test", "ep", vec![]))
    }

    fn raw_handler(ep: &Endpoint) -> Handler {
        Arc::clone(&ep.handler)
    }

    #[tokio::test]
    async fn waitgroup_counts_in_and_out() {
        let wg = WaitGroup::new();
        let ep = passing_endpoint("ep");
        let wrapped = wait_group_middleware(wg.clone())(&ep, raw_handler(&ep));

        assert_eq!(wg.count(), 0);
        wrapped(request()).await.unwrap();
        assert_eq!(wg.count(), 0);
    }

    #[tokio::test]
    async fn tokens_reject_when_exhausted() {
        // an empty pool can never admit anything
        let tokens = Arc::new(TokenBuckets::new(0));
        let ep = passing_endpoint("ep");
        let wrapped =
            token_middleware(Arc::clone(&tokens), "com.corvid.me".into())(&ep, raw_handler(&ep));

        let err = wrapped(request()).await.unwrap_err();
        assert_eq!(err.code(), "com.corvid.kernel.server.capacity");
    }

    #[tokio::test]
    async fn auth_denies_without_roles() {
        let tracker = Arc::new(ErrorTracker::new());
        let mut ep = passing_endpoint("ep");
        ep.authoriser = None; // default: ADMIN required
        let wrapped = auth_middleware(Arc::clone(&tracker))(&ep, raw_handler(&ep));

        let req = request();
        req.set_scope(crate::auth::SessionScope::anonymous());
        let err = wrapped(req).await.unwrap_err();
        assert_eq!(err.code(), "com.corvid.kernel.auth.badrole");

        // Service-to-service failure tracked for the health check
        assert_eq!(tracker.count("com.corvid.kernel.auth.badrole", &[]), 1);
    }

    #[tokio::test]
    async fn auth_marks_scope_authorised_on_success() {
        let tracker = Arc::new(ErrorTracker::new());
        let ep = passing_endpoint("ep");
        let wrapped = auth_middleware(tracker)(&ep, raw_handler(&ep));

        let req = request();
        wrapped(Arc::clone(&req)).await.unwrap();
        assert!(req.scope().authorised());
    }

    #[tokio::test]
    async fn access_log_writes_one_line() {
        let buffer: Arc<Mutex<Vec<u8>>> = Arc::new(Mutex::new(Vec::new()));

        struct SharedBuffer(Arc<Mutex<Vec<u8>>>);
        impl Write for SharedBuffer {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                self.0.lock().unwrap().extend_from_slice(buf);
                Ok(buf.len())
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let writer: Arc<Mutex<Box<dyn Write + Send>>> = Arc::new(Mutex::new(Box::new(
            SharedBuffer(Arc::clone(&buffer)),
        )));
        let ep = passing_endpoint("logged");
        let wrapped = access_log_middleware(Some(writer))(&ep, raw_handler(&ep));

        wrapped(request()).await.unwrap();

        let logged = String::from_utf8(buffer.lock().unwrap().clone()).unwrap();
        assert!(logged.contains("\"GET ep HTTP/1.0\" 200"), "line: {logged}");
    }

    #[tokio::test]
    async fn instrumentation_passes_results_through() {
        let ep = passing_endpoint("timed");
        let wrapped = instrumented_middleware()(&ep, raw_handler(&ep));
        let reply: HandlerReply = wrapped(request()).await.unwrap();
        assert!(reply.is_some());
    }
}
