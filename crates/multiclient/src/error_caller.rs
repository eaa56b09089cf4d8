// SPDX-License-Identifier: LGPL-2.1-or-later
// Copyright (C) 2025 Corvid Contributors

//! A caller that always fails, for exercising error paths.

use std::sync::Arc;

use corvid_client::Request;
use corvid_errors::PlatformError;

use crate::caller::Caller;

/// Returns `err` for every request. Without one, defaults to NOT_FOUND
/// `errorcaller.notfound`.
pub fn error_caller(err: Option<PlatformError>) -> Caller {
    Arc::new(move |_req: Request| {
        let err = err
            .clone()
            .unwrap_or_else(|| PlatformError::not_found("errorcaller.notfound", "No error supplied"));
        Box::pin(async move { Err(err) })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use corvid_proto::discovery::EndpointsRequest;

    #[tokio::test]
    async fn returns_supplied_error() {
        let caller = error_caller(Some(PlatformError::conflict("code.busy", "try later")));
        let req = Request::new("svc", "ep", &EndpointsRequest::default()).unwrap();
        assert_eq!(caller(req).await.unwrap_err().code(), "code.busy");
    }

    #[tokio::test]
    async fn defaults_to_not_found() {
        let caller = error_caller(None);
        let req = Request::new("svc", "ep", &EndpointsRequest::default()).unwrap();
        assert_eq!(caller(req).await.unwrap_err().code(), "errorcaller.notfound");
    }
}
