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

//! Payload codec
//!
//! Marshals any wire message under either supported content type. The reply
//! codec must always equal the request codec, so both sides funnel through
//! these two functions.

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use crate::ContentKind;

/// Anything that can cross the broker as a payload: prost for the binary
/// content type, serde for JSON.
pub trait WireMessage:
    prost::Message + Serialize + DeserializeOwned + Default + Clone + Send + Sync + 'static
{
}

impl<T> WireMessage for T where
    T: prost::Message + Serialize + DeserializeOwned + Default + Clone + Send + Sync + 'static
{
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Protobuf encode failed: {0}")]
    ProtoEncode(#[from] prost::EncodeError),

    #[error("Protobuf decode failed: {0}")]
    ProtoDecode(#[from] prost::DecodeError),

    #[error("JSON codec failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown content type: {0}")]
    UnknownContentType(String),
}

/// Encode a message under the given content kind.
pub fn marshal<T: WireMessage>(kind: ContentKind, msg: &T) -> Result<Vec<u8>, CodecError> {
    match kind {
        ContentKind::OctetStream => {
            let mut buf = Vec::with_capacity(msg.encoded_len());
            msg.encode(&mut buf)?;
            Ok(buf)
        }
        ContentKind::Json => Ok(serde_json::to_vec(msg)?),
    }
}

/// Decode a message under the given content kind.
pub fn unmarshal<T: WireMessage>(kind: ContentKind, body: &[u8]) -> Result<T, CodecError> {
    match kind {
        ContentKind::OctetStream => Ok(T::decode(body)?),
        ContentKind::Json => Ok(serde_json::from_slice(body)?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corvid_proto::discovery::EndpointsRequest;

    #[test]
    fn proto_round_trip() {
        let msg = EndpointsRequest {
            service: "com.corvid.kernel.discovery".into(),
        };
        let bytes = marshal(ContentKind::OctetStream, &msg).unwrap();
        let back: EndpointsRequest = unmarshal(ContentKind::OctetStream, &bytes).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn json_round_trip() {
        let msg = EndpointsRequest {
            service: "com.corvid.kernel.discovery".into(),
        };
        let bytes = marshal(ContentKind::Json, &msg).unwrap();
        let back: EndpointsRequest = unmarshal(ContentKind::Json, &bytes).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn garbage_fails_to_decode() {
        let r: Result<EndpointsRequest, _> = unmarshal(ContentKind::Json, b"{nope");
        assert!(r.is_err());
    }
}
