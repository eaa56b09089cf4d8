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

//! Inbound delivery model and content types

use std::collections::HashMap;

/// The two payload codecs supported everywhere on the platform. The codec
/// used for a reply must equal the codec used on the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    /// `application/octet-stream`, binary schema-encoded
    OctetStream,
    /// `application/json`
    Json,
}

impl ContentKind {
    pub const OCTET_STREAM: &'static str = "application/octet-stream";
    pub const JSON: &'static str = "application/json";

    pub fn as_str(self) -> &'static str {
        match self {
            ContentKind::OctetStream => Self::OCTET_STREAM,
            ContentKind::Json => Self::JSON,
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            Self::OCTET_STREAM => Some(ContentKind::OctetStream),
            Self::JSON => Some(ContentKind::Json),
            _ => None,
        }
    }
}

/// One message handed to a consumer: body plus the broker-level properties
/// the platform routes on.
#[derive(Debug, Clone, Default)]
pub struct Delivery {
    pub content_type: String,
    pub body: Vec<u8>,
    /// Application headers, all string-valued on the wire
    pub headers: HashMap<String, String>,
    /// Unique per delivery
    pub message_id: String,
    /// Message id of the request this replies to, empty on requests
    pub correlation_id: String,
    /// Queue name of whoever sent this, for replying back
    pub reply_to: String,
    /// Broker priority, 0-9
    pub priority: u8,
}

impl Delivery {
    /// Header value, or empty string when absent. Headers are string-typed
    /// on the wire so there is nothing to coerce.
    pub fn header(&self, key: &str) -> &str {
        self.headers.get(key).map(String::as_str).unwrap_or("")
    }

    pub fn content_kind(&self) -> Option<ContentKind> {
        ContentKind::from_str(&self.content_type)
    }
}
