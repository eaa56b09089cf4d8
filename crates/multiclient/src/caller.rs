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

//! The caller seam
//!
//! The multi-client talks to services exclusively through this function
//! boundary, so broker, HTTP and mock transports stay interchangeable.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use corvid_broker::ContentKind;
use corvid_client::{Client, Request};
use corvid_errors::PlatformError;

/// Raw successful reply from a caller; the multi-client decodes it into
/// the per-uid response slot.
#[derive(Debug, Clone)]
pub struct CallerResponse {
    pub content_type: ContentKind,
    pub body: Vec<u8>,
}

pub type CallerFuture = Pin<Box<dyn Future<Output = Result<CallerResponse, PlatformError>> + Send>>;

/// Takes a prepared request, returns the raw reply or a platform error.
pub type Caller = Arc<dyn Fn(Request) -> CallerFuture + Send + Sync>;

/// The default caller: requests go out over the platform RPC mechanism.
pub fn platform_caller(client: Arc<dyn Client>) -> Caller {
    Arc::new(move |req: Request| {
        let client = Arc::clone(&client);
        Box::pin(async move {
            let rsp = client.custom_req(req, None).await?;
            let content_type = ContentKind::from_str(rsp.content_type())
                .unwrap_or(ContentKind::OctetStream);
            Ok(CallerResponse {
                content_type,
                body: rsp.body().to_vec(),
            })
        })
    })
}
