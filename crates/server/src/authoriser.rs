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

//! Endpoint authorisation
//!
//! Four shapes, all reducible to two booleans and a role set: open,
//! role-gated, sign-in, sign-in plus role. Undeclared endpoints default to
//! "admin role required".

use std::sync::Arc;

use corvid_errors::PlatformError;

use crate::request::ServerRequest;

/// Anything that can authorise endpoint calls.
pub trait Authoriser: Send + Sync {
    /// Check the request; error when it must not proceed.
    fn authorise(&self, req: &ServerRequest) -> Result<(), PlatformError>;
}

/// The default for endpoints that declare nothing.
pub fn default_authoriser() -> Arc<dyn Authoriser> {
    role_authoriser(&["ADMIN"])
}

/// Requires the caller (service or user) to hold ANY of these roles.
pub fn role_authoriser(roles: &[&str]) -> Arc<dyn Authoriser> {
    Arc::new(SimpleAuthoriser {
        require_user: false,
        require_role: true,
        roles: roles.iter().map(|s| s.to_string()).collect(),
    })
}

/// Requires a real person signed in, any role.
pub fn sign_in_authoriser() -> Arc<dyn Authoriser> {
    Arc::new(SimpleAuthoriser {
        require_user: true,
        require_role: false,
        roles: Vec::new(),
    })
}

/// Requires a signed-in person holding ANY of these roles.
pub fn sign_in_role_authoriser(roles: &[&str]) -> Arc<dyn Authoriser> {
    Arc::new(SimpleAuthoriser {
        require_user: true,
        require_role: true,
        roles: roles.iter().map(|s| s.to_string()).collect(),
    })
}

/// ANYONE, in the whole world, may call the endpoint.
pub fn open_to_the_world_authoriser() -> Arc<dyn Authoriser> {
    Arc::new(SimpleAuthoriser {
        require_user: false,
        require_role: false,
        roles: Vec::new(),
    })
}

/// The "bad role" error, also useful for row-level permission checks
/// inside services.
pub fn bad_role_error(req: &ServerRequest) -> PlatformError {
    PlatformError::forbidden(
        "com.corvid.kernel.auth.badrole",
        format!(
            "Must have the correct role to call this endpoint [endpoint={}, service={}, from={}]",
            req.endpoint(),
            req.service(),
            req.from()
        ),
    )
    .with_context(["5"])
}

pub(crate) struct SimpleAuthoriser {
    /// Need a real person (service-to-service cannot satisfy this)
    require_user: bool,
    require_role: bool,
    /// Caller must hold AT LEAST ONE
    roles: Vec<String>,
}

impl Authoriser for SimpleAuthoriser {
    fn authorise(&self, req: &ServerRequest) -> Result<(), PlatformError> {
        // Nothing required: no need to authorise at all
        if !self.require_user && !self.require_role {
            tracing::trace!(
                from = req.from(),
                to = %req.destination(),
                "skipping auth, neither user nor role required"
            );
            return Ok(());
        }

        let scope = req.scope();

        // Pre-authorised upstream (service-to-service)
        if scope.authorised() {
            return Ok(());
        }

        if self.require_user && !scope.is_auth() {
            return Err(PlatformError::forbidden(
                "com.corvid.kernel.auth.notsignedin",
                format!(
                    "Must be signed in to call this endpoint [endpoint={}, service={}, from={}]",
                    req.endpoint(),
                    req.service(),
                    req.from()
                ),
            )
            .with_context(["201"]));
        }

        if self.require_role {
            let matches_role = self.roles.iter().any(|r| scope.has_access(r));
            if !matches_role {
                if scope.has_tried_auth() {
                    return Err(PlatformError::forbidden(
                        "com.corvid.kernel.auth.badrole",
                        format!(
                            "Must have the correct role to call this endpoint [endpoint={}, service={}, from={}]",
                            req.endpoint(),
                            req.service(),
                            req.from()
                        ),
                    )
                    .with_context(["201"]));
                }

                // Service-to-service auth failed; the auth middleware
                // counts these towards the bad-role health check
                metrics::counter!("corvid_auth_service_to_service_failures_total").increment(1);
                return Err(bad_role_error(req));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthUser, SessionScope};
    use corvid_errors::ErrorKind;

    fn request_with_scope(scope: SessionScope) -> ServerRequest {
        let req = ServerRequest::from_payload("com.corvid.test", "ep", Vec::new());
        req.set_scope(scope);
        req
    }

    fn signed_in(roles: &[&str]) -> SessionScope {
        SessionScope::new(
            Some(AuthUser {
                id: "u1".into(),
                session_id: "s1".into(),
                roles: roles.iter().map(|s| s.to_string()).collect(),
                application: String::new(),
            }),
            true,
            Vec::new(),
            false,
        )
    }

    #[test]
    fn open_authoriser_allows_anyone() {
        let req = request_with_scope(SessionScope::anonymous());
        assert!(open_to_the_world_authoriser().authorise(&req).is_ok());
    }

    #[test]
    fn pre_authorised_requests_skip_checks() {
        let scope = SessionScope::anonymous();
        scope.set_authorised(true);
        let req = request_with_scope(scope);
        assert!(default_authoriser().authorise(&req).is_ok());
    }

    #[test]
    fn sign_in_required() {
        let req = request_with_scope(SessionScope::anonymous());
        let err = sign_in_authoriser().authorise(&req).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
        assert_eq!(err.code(), "com.corvid.kernel.auth.notsignedin");

        let req = request_with_scope(signed_in(&[]));
        assert!(sign_in_authoriser().authorise(&req).is_ok());
    }

    #[test]
    fn any_matching_role_satisfies() {
        let authoriser = role_authoriser(&["ADMIN", "OPS"]);

        let req = request_with_scope(signed_in(&["OPS"]));
        assert!(authoriser.authorise(&req).is_ok());

        let req = request_with_scope(signed_in(&["CUSTOMER"]));
        let err = authoriser.authorise(&req).unwrap_err();
        assert_eq!(err.code(), "com.corvid.kernel.auth.badrole");
    }

    #[test]
    fn service_roles_satisfy_role_checks() {
        let scope = SessionScope::new(None, false, vec!["ADMIN".into()], false);
        let req = request_with_scope(scope);
        assert!(default_authoriser().authorise(&req).is_ok());
    }

    #[test]
    fn sign_in_role_requires_both() {
        let authoriser = sign_in_role_authoriser(&["ADMIN"]);

        let req = request_with_scope(SessionScope::anonymous());
        assert_eq!(
            authoriser.authorise(&req).unwrap_err().code(),
            "com.corvid.kernel.auth.notsignedin"
        );

        let req = request_with_scope(signed_in(&["ADMIN"]));
        assert!(authoriser.authorise(&req).is_ok());
    }
}
