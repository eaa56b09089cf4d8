// SPDX-License-Identifier: LGPL-2.1-or-later
// Copyright (C) 2025 Corvid Contributors

//! Fan-out behaviour across the multi-client and its callers.

use std::sync::Arc;

use corvid_config::ConfigStore;
use corvid_errors::{ErrorKind, PlatformError};
use corvid_multiclient::{
    error_caller, ExplicitScoper, Mock, MultiClient, ScopedReq, Scoper,
};
use corvid_proto::discovery::{EndpointsRequest, EndpointsResponse};

const SERVICE: &str = "com.corvid.svc";

fn scoped(uid: &str, endpoint: &str) -> ScopedReq<EndpointsRequest, EndpointsResponse> {
    ScopedReq {
        uid: uid.to_string(),
        from: None,
        service: SERVICE.to_string(),
        endpoint: endpoint.to_string(),
        req: EndpointsRequest {
            service: uid.to_string(),
        },
        rsp: EndpointsResponse::default(),
        options: None,
    }
}

fn caller_scope() -> Arc<dyn Scoper> {
    Arc::new(ExplicitScoper::new().set_context("com.corvid.caller"))
}

#[tokio::test]
async fn mixed_outcomes_across_six_requests() {
    let mock = Mock::new();
    mock.on(SERVICE, "a").return_rsp(&EndpointsResponse::default());
    mock.on(SERVICE, "b").return_rsp(&EndpointsResponse::default());
    mock.on(SERVICE, "c")
        .fail(PlatformError::forbidden("x", "not allowed"));

    let mut mc = MultiClient::new(mock.caller(), Arc::new(ConfigStore::new()))
        .default_scope_from(caller_scope())
        .set_concurrency(2);

    mc.add_scoped_req(scoped("a", "a"));
    mc.add_scoped_req(scoped("b", "b"));
    for uid in ["c", "d", "e", "f"] {
        mc.add_scoped_req(scoped(uid, "c"));
    }
    mc.execute().await;

    assert!(mc.succeeded("a").is_none());
    assert!(mc.succeeded("b").is_none());

    let err = mc.succeeded("c").expect("c failed");
    assert_eq!(err.kind(), ErrorKind::Forbidden);
    assert_eq!(err.code(), "x");

    assert!(mc.any_errors());

    let combined = mc.platform_error("s").expect("errors present");
    assert_eq!(combined.kind(), ErrorKind::InternalServer);
    assert_eq!(combined.code(), "com.corvid.caller.s");

    // Every uid resolved to exactly one of response or error
    for uid in ["a", "b", "c", "d", "e", "f"] {
        let has_rsp = mc.response::<EndpointsResponse>(uid).is_some();
        let has_err = mc.succeeded(uid).is_some();
        assert!(has_rsp ^ has_err, "uid {uid}: rsp={has_rsp} err={has_err}");
    }
}

#[tokio::test]
async fn single_error_is_returned_verbatim() {
    let mut mc = MultiClient::new(
        error_caller(Some(PlatformError::not_found("code.gone", "nothing"))),
        Arc::new(ConfigStore::new()),
    )
    .default_scope_from(caller_scope());

    mc.add_scoped_req(scoped("only", "ep"));
    mc.execute().await;

    let err = mc.platform_error("suffix").unwrap();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(err.code(), "code.gone", "single errors keep their code");
}

#[tokio::test]
async fn no_errors_means_no_platform_error() {
    let mock = Mock::new();
    mock.on(SERVICE, "ok").return_rsp(&EndpointsResponse::default());

    let mut mc = MultiClient::new(mock.caller(), Arc::new(ConfigStore::new()));
    mc.add_scoped_req(scoped("u", "ok"));
    mc.execute().await;

    assert!(!mc.any_errors());
    assert!(mc.platform_error("s").is_none());
}

#[tokio::test]
async fn ignoring_kinds_and_codes() {
    let mock = Mock::new();
    mock.on(SERVICE, "a").return_rsp(&EndpointsResponse::default());
    mock.on(SERVICE, "c")
        .fail(PlatformError::forbidden("x", "not allowed"));

    let mut mc = MultiClient::new(mock.caller(), Arc::new(ConfigStore::new()));
    mc.add_scoped_req(scoped("a", "a"));
    mc.add_scoped_req(scoped("c", "c"));
    mc.execute().await;

    assert!(mc.any_errors());
    assert!(!mc.any_errors_ignoring(&[ErrorKind::Forbidden], &[]));
    assert!(!mc.any_errors_ignoring(&[], &["x"]));
    assert!(mc.any_errors_ignoring(&[ErrorKind::Timeout], &["other"]));
}

#[tokio::test]
async fn reset_recycles_the_container() {
    let mock = Mock::new();
    mock.on(SERVICE, "ok").return_rsp(&EndpointsResponse::default());

    let mut mc = MultiClient::new(mock.caller(), Arc::new(ConfigStore::new()));
    mc.add_scoped_req(scoped("u", "ok"));
    mc.execute().await;
    assert!(mc.response::<EndpointsResponse>("u").is_some());

    mc.reset();
    assert!(mc.response::<EndpointsResponse>("u").is_none());
    assert!(!mc.any_errors());

    mc.add_scoped_req(scoped("u", "ok"));
    mc.execute().await;
    assert!(mc.succeeded("u").is_none());
}

#[tokio::test]
async fn scoper_stamps_session_onto_fanned_out_requests() {
    let mock = Mock::new();
    let stub = mock.on(SERVICE, "a");
    stub.return_rsp(&EndpointsResponse::default());

    let scope: Arc<dyn Scoper> = Arc::new(
        ExplicitScoper::new()
            .set_session_id("sess-42")
            .set_context("com.corvid.caller"),
    );
    let mut mc =
        MultiClient::new(mock.caller(), Arc::new(ConfigStore::new())).default_scope_from(scope);
    mc.add_scoped_req(scoped("a", "a"));
    mc.execute().await;

    let sent = stub.request(0).expect("request recorded");
    assert_eq!(sent.session_id(), "sess-42");
}
