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

//! HTTP bridge caller
//!
//! POSTs requests to a thin API at `{base}/rpc`. Binary payloads go out
//! raw, JSON payloads go form-encoded. Non-2xx responses decode an error
//! envelope whose kind is guessed from the HTTP status, since the bridge's
//! JSON errors do not carry the type.

use std::sync::Arc;
use std::time::Duration;

use corvid_broker::ContentKind;
use corvid_client::Request;
use corvid_errors::PlatformError;
use serde::Deserialize;

use crate::caller::{Caller, CallerResponse};

const PROTO_CONTENT_TYPE: &str = "application/x-protobuf";

/// Error envelope the thin API returns for JSON requests.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    #[allow(dead_code)]
    status: bool,
    #[serde(default)]
    payload: String,
    #[serde(default)]
    #[allow(dead_code)]
    code: i64,
    #[serde(default)]
    dotted_code: String,
    #[serde(default)]
    context: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct HttpCallerOptions {
    pub base_url: String,
    pub tls_skip_verify: bool,
    pub connect_timeout: Option<Duration>,
    pub request_timeout: Option<Duration>,
}

impl HttpCallerOptions {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            tls_skip_verify: false,
            connect_timeout: None,
            request_timeout: None,
        }
    }
}

/// Caller that hits a thin API over HTTP, eg `https://api.example.com`.
pub fn http_caller(base_url: &str) -> Caller {
    configured_http_caller(HttpCallerOptions::new(base_url))
}

/// Like [`http_caller`] with explicit transport configuration.
pub fn configured_http_caller(opts: HttpCallerOptions) -> Caller {
    let client = reqwest::Client::builder()
        .connect_timeout(opts.connect_timeout.unwrap_or(Duration::from_secs(5)))
        .timeout(opts.request_timeout.unwrap_or(Duration::from_secs(5)))
        .danger_accept_invalid_certs(opts.tls_skip_verify)
        .build()
        .expect("http client must build");
    let base_url = opts.base_url;

    Arc::new(move |req: Request| {
        let client = client.clone();
        let base_url = base_url.clone();
        Box::pin(async move { http_call(&client, &base_url, req).await })
    })
}

async fn http_call(
    client: &reqwest::Client,
    base_url: &str,
    req: Request,
) -> Result<CallerResponse, PlatformError> {
    let url = format!(
        "{}/rpc?service={}&endpoint={}&session_id={}",
        base_url.trim_end_matches('/'),
        req.service(),
        req.endpoint(),
        req.session_id()
    );

    let builder = if req.content_kind() == ContentKind::Json {
        // The thin API takes JSON requests as form-encoded data
        client.post(&url).form(&[
            ("service", req.service()),
            ("endpoint", req.endpoint()),
            ("request", std::str::from_utf8(req.payload()).unwrap_or("")),
        ])
    } else {
        client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, PROTO_CONTENT_TYPE)
            .body(req.payload().to_vec())
    };

    tracing::trace!(url, "http caller posting");

    let rsp = builder.send().await.map_err(|err| {
        PlatformError::internal_server(
            "multiclienthttp.postform",
            format!(
                "Error calling {}.{} via {}: {}",
                req.service(),
                req.endpoint(),
                url,
                err
            ),
        )
    })?;

    let status = rsp.status().as_u16();
    let body = rsp.bytes().await.map_err(|err| {
        PlatformError::bad_response(
            "multiclienthttp.readresponse",
            format!("Error reading response bytes: {err}"),
        )
    })?;

    if status != 200 {
        return Err(decode_http_error(req.content_kind(), status, &body));
    }

    Ok(CallerResponse {
        content_type: req.content_kind(),
        body: body.to_vec(),
    })
}

fn decode_http_error(kind: ContentKind, status: u16, body: &[u8]) -> PlatformError {
    match kind {
        ContentKind::Json => match serde_json::from_slice::<ErrorBody>(body) {
            Ok(envelope) => {
                error_from_status(status, envelope.dotted_code, envelope.payload)
                    .with_context(envelope.context)
            }
            Err(err) => PlatformError::bad_response(
                "multiclienthttp.unmarshalerr",
                format!(
                    "Error unmarshaling error response '{}': {}",
                    String::from_utf8_lossy(body),
                    err
                ),
            ),
        },
        ContentKind::OctetStream => {
            match corvid_broker::codec::unmarshal::<corvid_proto::error::PlatformError>(
                ContentKind::OctetStream,
                body,
            ) {
                Ok(proto) => PlatformError::from_proto(&proto),
                Err(err) => PlatformError::bad_response(
                    "multiclienthttp.unmarshalerr",
                    format!("Error unmarshaling error response: {err}"),
                ),
            }
        }
    }
}

/// The JSON envelope has no error type, so the HTTP status decides the
/// kind.
fn error_from_status(status: u16, code: String, description: String) -> PlatformError {
    match status {
        400 => PlatformError::bad_request(code, description),
        403 => PlatformError::forbidden(code, description),
        404 => PlatformError::not_found(code, description),
        504 => PlatformError::timeout(code, description),
        _ => PlatformError::internal_server(code, description),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corvid_errors::ErrorKind;

    #[test]
    fn status_maps_to_kind() {
        let cases = [
            (400, ErrorKind::BadRequest),
            (403, ErrorKind::Forbidden),
            (404, ErrorKind::NotFound),
            (500, ErrorKind::InternalServer),
            (504, ErrorKind::Timeout),
            (418, ErrorKind::InternalServer),
        ];
        for (status, kind) in cases {
            let err = error_from_status(status, "code.x".into(), "desc".into());
            assert_eq!(err.kind(), kind, "status {status}");
        }
    }

    #[test]
    fn json_error_envelope_decodes() {
        let body = serde_json::json!({
            "status": false,
            "payload": "not allowed",
            "code": 7,
            "dotted_code": "com.corvid.api.denied",
            "context": ["a", "b"]
        });
        let err = decode_http_error(
            ContentKind::Json,
            403,
            body.to_string().as_bytes(),
        );
        assert_eq!(err.kind(), ErrorKind::Forbidden);
        assert_eq!(err.code(), "com.corvid.api.denied");
        assert_eq!(err.description(), "not allowed");
        assert_eq!(err.context(), &["a", "b"]);
    }

    #[test]
    fn proto_error_body_decodes() {
        let original = PlatformError::conflict("com.corvid.api.conflict", "taken");
        let body = corvid_broker::codec::marshal(
            ContentKind::OctetStream,
            &original.to_proto(),
        )
        .unwrap();
        let err = decode_http_error(ContentKind::OctetStream, 409, &body);
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(err.code(), "com.corvid.api.conflict");
    }

    #[test]
    fn garbage_error_body_is_bad_response() {
        let err = decode_http_error(ContentKind::Json, 500, b"{nope");
        assert_eq!(err.code(), "multiclienthttp.unmarshalerr");
    }
}
