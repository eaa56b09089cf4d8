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

//! The surfaceable error type

use std::backtrace::Backtrace;
use std::fmt;
use std::sync::Arc;

use corvid_proto::error::platform_error::ErrorType;
use corvid_proto::error::PlatformError as PlatformErrorProto;

/// Closed set of error kinds. The kind deterministically maps to the HTTP
/// code surfaced by bridges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InternalServer,
    BadRequest,
    Forbidden,
    BadResponse,
    Timeout,
    NotFound,
    Conflict,
    Unauthorized,
    CircuitBroken,
}

impl ErrorKind {
    /// HTTP code this kind maps to.
    pub fn http_code(self) -> u32 {
        match self {
            ErrorKind::InternalServer => 500,
            ErrorKind::BadRequest => 400,
            ErrorKind::Forbidden => 403,
            ErrorKind::BadResponse => 500,
            ErrorKind::Timeout => 504,
            ErrorKind::NotFound => 404,
            ErrorKind::Conflict => 409,
            ErrorKind::Unauthorized => 401,
            ErrorKind::CircuitBroken => 500,
        }
    }

    /// Canonical string name, matching the wire enum variant names.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::InternalServer => "INTERNAL_SERVER_ERROR",
            ErrorKind::BadRequest => "BAD_REQUEST",
            ErrorKind::Forbidden => "FORBIDDEN",
            ErrorKind::BadResponse => "BAD_RESPONSE",
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Conflict => "CONFLICT",
            ErrorKind::Unauthorized => "UNAUTHORIZED",
            ErrorKind::CircuitBroken => "CIRCUIT_BROKEN",
        }
    }

    fn to_proto(self) -> ErrorType {
        match self {
            ErrorKind::InternalServer => ErrorType::InternalServerError,
            ErrorKind::BadRequest => ErrorType::BadRequest,
            ErrorKind::Forbidden => ErrorType::Forbidden,
            ErrorKind::BadResponse => ErrorType::BadResponse,
            ErrorKind::Timeout => ErrorType::Timeout,
            ErrorKind::NotFound => ErrorType::NotFound,
            ErrorKind::Conflict => ErrorType::Conflict,
            ErrorKind::Unauthorized => ErrorType::Unauthorized,
            ErrorKind::CircuitBroken => ErrorType::CircuitBroken,
        }
    }

    fn from_proto(t: ErrorType) -> Self {
        match t {
            ErrorType::InternalServerError => ErrorKind::InternalServer,
            ErrorType::BadRequest => ErrorKind::BadRequest,
            ErrorType::Forbidden => ErrorKind::Forbidden,
            ErrorType::BadResponse => ErrorKind::BadResponse,
            ErrorType::Timeout => ErrorKind::Timeout,
            ErrorType::NotFound => ErrorKind::NotFound,
            ErrorType::Conflict => ErrorKind::Conflict,
            ErrorType::Unauthorized => ErrorKind::Unauthorized,
            ErrorType::CircuitBroken => ErrorKind::CircuitBroken,
        }
    }
}

/// A platform error: kind, dotted code, description, context and the HTTP
/// code it maps to. The call stack is captured at construction and survives
/// clones, but does not cross the wire.
#[derive(Clone)]
pub struct PlatformError {
    kind: ErrorKind,
    code: String,
    description: String,
    context: Vec<String>,
    http_code: u32,
    backtrace: Option<Arc<Backtrace>>,
}

impl PlatformError {
    fn new(kind: ErrorKind, code: impl Into<String>, description: impl fmt::Display) -> Self {
        Self {
            kind,
            code: code.into(),
            description: description.to_string(),
            context: Vec::new(),
            http_code: kind.http_code(),
            backtrace: Some(Arc::new(Backtrace::capture())),
        }
    }

    pub fn internal_server(code: impl Into<String>, description: impl fmt::Display) -> Self {
        Self::new(ErrorKind::InternalServer, code, description)
    }

    pub fn bad_request(code: impl Into<String>, description: impl fmt::Display) -> Self {
        Self::new(ErrorKind::BadRequest, code, description)
    }

    pub fn forbidden(code: impl Into<String>, description: impl fmt::Display) -> Self {
        Self::new(ErrorKind::Forbidden, code, description)
    }

    pub fn bad_response(code: impl Into<String>, description: impl fmt::Display) -> Self {
        Self::new(ErrorKind::BadResponse, code, description)
    }

    pub fn timeout(code: impl Into<String>, description: impl fmt::Display) -> Self {
        Self::new(ErrorKind::Timeout, code, description)
    }

    pub fn not_found(code: impl Into<String>, description: impl fmt::Display) -> Self {
        Self::new(ErrorKind::NotFound, code, description)
    }

    pub fn conflict(code: impl Into<String>, description: impl fmt::Display) -> Self {
        Self::new(ErrorKind::Conflict, code, description)
    }

    pub fn unauthorized(code: impl Into<String>, description: impl fmt::Display) -> Self {
        Self::new(ErrorKind::Unauthorized, code, description)
    }

    pub fn circuit_broken(code: impl Into<String>, description: impl fmt::Display) -> Self {
        Self::new(ErrorKind::CircuitBroken, code, description)
    }

    /// Append context strings, returning the extended error.
    pub fn with_context<I, S>(mut self, context: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.context.extend(context.into_iter().map(Into::into));
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Dotted code, eg `com.corvid.kernel.platform.timeout`.
    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn context(&self) -> &[String] {
        &self.context
    }

    pub fn http_code(&self) -> u32 {
        self.http_code
    }

    /// The stack captured when the error was constructed locally, if any.
    pub fn backtrace(&self) -> Option<&Backtrace> {
        self.backtrace.as_deref()
    }

    pub fn is_internal_server(&self) -> bool {
        self.kind == ErrorKind::InternalServer
    }

    pub fn is_timeout(&self) -> bool {
        self.kind == ErrorKind::Timeout
    }

    pub fn is_circuit_broken(&self) -> bool {
        self.kind == ErrorKind::CircuitBroken
    }

    /// Rebuild an error from its wire form. The HTTP code is taken from the
    /// wire so bridge-supplied codes survive the round trip.
    pub fn from_proto(p: &PlatformErrorProto) -> Self {
        let kind = ErrorKind::from_proto(
            ErrorType::try_from(p.error_type).unwrap_or(ErrorType::InternalServerError),
        );
        Self {
            kind,
            code: p.code.clone(),
            description: p.description.clone(),
            context: p.context.clone(),
            http_code: p.http_code,
            backtrace: None,
        }
    }

    pub fn to_proto(&self) -> PlatformErrorProto {
        PlatformErrorProto {
            error_type: self.kind.to_proto() as i32,
            code: self.code.clone(),
            description: self.description.clone(),
            context: self.context.clone(),
            http_code: self.http_code,
        }
    }

    /// Replace the dotted code. Used by scoped error views which extend
    /// codes with a suffix.
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = code.into();
        self
    }
}

impl fmt::Display for PlatformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description)
    }
}

impl fmt::Debug for PlatformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlatformError")
            .field("kind", &self.kind)
            .field("code", &self.code)
            .field("description", &self.description)
            .field("context", &self.context)
            .field("http_code", &self.http_code)
            .finish()
    }
}

impl std::error::Error for PlatformError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_determines_http_code() {
        assert_eq!(
            PlatformError::bad_request("code", "desc").http_code(),
            400
        );
        assert_eq!(PlatformError::forbidden("code", "desc").http_code(), 403);
        assert_eq!(PlatformError::not_found("code", "desc").http_code(), 404);
        assert_eq!(PlatformError::conflict("code", "desc").http_code(), 409);
        assert_eq!(PlatformError::unauthorized("code", "desc").http_code(), 401);
        assert_eq!(PlatformError::timeout("code", "desc").http_code(), 504);
        assert_eq!(
            PlatformError::internal_server("code", "desc").http_code(),
            500
        );
        assert_eq!(
            PlatformError::circuit_broken("code", "desc").http_code(),
            500
        );
        assert_eq!(PlatformError::bad_response("code", "desc").http_code(), 500);
    }

    #[test]
    fn proto_round_trip_preserves_everything() {
        let err = PlatformError::forbidden("com.corvid.test.badrole", "must have role")
            .with_context(["5", "com.corvid.caller"]);

        let back = PlatformError::from_proto(&err.to_proto());
        assert_eq!(back.kind(), ErrorKind::Forbidden);
        assert_eq!(back.code(), "com.corvid.test.badrole");
        assert_eq!(back.description(), "must have role");
        assert_eq!(back.context(), &["5", "com.corvid.caller"]);
        assert_eq!(back.http_code(), 403);
    }

    #[test]
    fn kind_predicates() {
        assert!(PlatformError::timeout("c", "d").is_timeout());
        assert!(PlatformError::internal_server("c", "d").is_internal_server());
        assert!(PlatformError::circuit_broken("c", "d").is_circuit_broken());
        assert!(!PlatformError::bad_request("c", "d").is_timeout());
    }
}
