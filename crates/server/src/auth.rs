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

//! Session scope
//!
//! The authentication backend itself is an external collaborator; the
//! server only needs the [`SessionStore`] seam to recover a session id
//! into a user and to learn the roles granted to a calling service.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

/// An authenticated person.
#[derive(Debug, Clone, Default)]
pub struct AuthUser {
    pub id: String,
    pub session_id: String,
    pub roles: Vec<String>,
    /// Which application the session belongs to
    pub application: String,
}

/// Recovered security context for one inbound request.
pub struct SessionScope {
    user: Option<AuthUser>,
    /// Whether recovery was attempted with a real session id
    tried_auth: bool,
    /// Roles granted to the calling service for service-to-service calls
    service_roles: Vec<String>,
    authorised: AtomicBool,
}

impl SessionScope {
    pub fn new(
        user: Option<AuthUser>,
        tried_auth: bool,
        service_roles: Vec<String>,
        authorised: bool,
    ) -> Self {
        Self {
            user,
            tried_auth,
            service_roles,
            authorised: AtomicBool::new(authorised),
        }
    }

    /// An empty scope: nobody signed in, nothing pre-authorised.
    pub fn anonymous() -> Self {
        Self::new(None, false, Vec::new(), false)
    }

    /// Whether a real user is signed in.
    pub fn is_auth(&self) -> bool {
        self.user.is_some()
    }

    pub fn auth_user(&self) -> Option<&AuthUser> {
        self.user.as_ref()
    }

    pub fn has_tried_auth(&self) -> bool {
        self.tried_auth
    }

    /// Whether the user, or the calling service, holds this role.
    pub fn has_access(&self, role: &str) -> bool {
        if let Some(user) = &self.user {
            if user.roles.iter().any(|r| r == role) {
                return true;
            }
        }
        self.service_roles.iter().any(|r| r == role)
    }

    /// Whether this request was already authorised upstream.
    pub fn authorised(&self) -> bool {
        self.authorised.load(Ordering::SeqCst)
    }

    pub fn set_authorised(&self, val: bool) {
        self.authorised.store(val, Ordering::SeqCst)
    }
}

/// Seam onto the session backend.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Recover the user a session id belongs to, if the session is live.
    async fn recover_session(&self, session_id: &str) -> Option<AuthUser>;

    /// Roles granted to `from_service` when calling `endpoint` on us.
    async fn service_roles(&self, from_service: &str, endpoint: &str) -> Vec<String>;
}

/// A store with no sessions at all: every request is anonymous.
pub struct NullSessionStore;

#[async_trait]
impl SessionStore for NullSessionStore {
    async fn recover_session(&self, _session_id: &str) -> Option<AuthUser> {
        None
    }

    async fn service_roles(&self, _from_service: &str, _endpoint: &str) -> Vec<String> {
        Vec::new()
    }
}

/// Fixed sessions and service roles, for tests.
#[derive(Default)]
pub struct StaticSessionStore {
    sessions: HashMap<String, AuthUser>,
    service_roles: Vec<String>,
}

impl StaticSessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(mut self, user: AuthUser) -> Self {
        self.sessions.insert(user.session_id.clone(), user);
        self
    }

    pub fn with_service_roles(mut self, roles: Vec<String>) -> Self {
        self.service_roles = roles;
        self
    }

    pub fn into_arc(self) -> Arc<dyn SessionStore> {
        Arc::new(self)
    }
}

#[async_trait]
impl SessionStore for StaticSessionStore {
    async fn recover_session(&self, session_id: &str) -> Option<AuthUser> {
        self.sessions.get(session_id).cloned()
    }

    async fn service_roles(&self, _from_service: &str, _endpoint: &str) -> Vec<String> {
        self.service_roles.clone()
    }
}
