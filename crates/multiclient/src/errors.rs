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

//! Error views over a fan-out's outcomes
//!
//! Filtering operations return new immutable views; the original is
//! unchanged. `suffix` extends every child error's dotted code, and
//! `combined` folds the view into one platform error labelled by the
//! shared scoper.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use corvid_errors::{ErrorKind, PlatformError};

use crate::scoper::Scoper;

#[derive(Clone)]
pub(crate) struct ReqErr {
    pub(crate) service: String,
    pub(crate) endpoint: String,
    pub(crate) err: PlatformError,
    pub(crate) scoper: Option<Arc<dyn Scoper>>,
}

/// All errors recorded by one fan-out, keyed by request uid.
#[derive(Clone, Default)]
pub struct Errors {
    pub(crate) default_scoper: Option<Arc<dyn Scoper>>,
    suffix: String,
    errs: HashMap<String, ReqErr>,
}

impl Errors {
    pub(crate) fn new(default_scoper: Option<Arc<dyn Scoper>>) -> Self {
        Self {
            default_scoper,
            suffix: String::new(),
            errs: HashMap::new(),
        }
    }

    pub(crate) fn set(
        &mut self,
        uid: &str,
        service: &str,
        endpoint: &str,
        err: PlatformError,
        scoper: Option<Arc<dyn Scoper>>,
    ) {
        self.errs.insert(
            uid.to_string(),
            ReqErr {
                service: service.to_string(),
                endpoint: endpoint.to_string(),
                err,
                scoper,
            },
        );
    }

    fn retain(&self, keep: impl Fn(&str, &ReqErr) -> bool) -> Self {
        let mut result = self.clone();
        result.errs.retain(|uid, re| keep(uid, re));
        result
    }

    /// Remove all errors for the given request uids.
    pub fn ignore_uid(&self, uids: &[&str]) -> Self {
        if uids.is_empty() {
            return self.clone();
        }
        self.retain(|uid, _| !uids.contains(&uid))
    }

    /// Remove all errors for requests to the given services.
    pub fn ignore_service(&self, services: &[&str]) -> Self {
        if services.is_empty() {
            return self.clone();
        }
        self.retain(|_, re| !services.contains(&re.service.as_str()))
    }

    /// Remove all errors for one service endpoint.
    pub fn ignore_endpoint(&self, service: &str, endpoint: &str) -> Self {
        self.retain(|_, re| !(re.service == service && re.endpoint == endpoint))
    }

    /// Remove all errors of the given kinds.
    pub fn ignore_kind(&self, kinds: &[ErrorKind]) -> Self {
        if kinds.is_empty() {
            return self.clone();
        }
        self.retain(|_, re| !kinds.contains(&re.err.kind()))
    }

    /// Remove all errors with the given codes.
    pub fn ignore_code(&self, codes: &[&str]) -> Self {
        if codes.is_empty() {
            return self.clone();
        }
        self.retain(|_, re| !codes.contains(&re.err.code()))
    }

    /// All matching errors, mapped to their request uid.
    pub fn errors(&self) -> HashMap<String, PlatformError> {
        self.errs
            .iter()
            .map(|(uid, re)| (uid.clone(), re.err.clone()))
            .collect()
    }

    pub fn count(&self) -> usize {
        self.errs.len()
    }

    pub fn any_errors(&self) -> bool {
        self.count() > 0
    }

    /// The error for one request uid, if it failed.
    pub fn for_uid(&self, uid: &str) -> Option<PlatformError> {
        self.errs.get(uid).map(|re| re.err.clone())
    }

    /// A new view with every child error's dotted code extended by
    /// `"." + suffix`.
    pub fn suffix(&self, suffix: &str) -> Self {
        let suffix = suffix.trim_start_matches('.');
        if suffix.is_empty() {
            return self.clone();
        }

        let mut result = self.clone();
        if !result.suffix.is_empty() {
            result.suffix.push('.');
        }
        result.suffix.push_str(suffix);

        for re in result.errs.values_mut() {
            let code = format!("{}.{}", re.err.code(), suffix);
            re.err = re.err.clone().with_code(code);
        }
        result
    }

    /// Fold the view into one error: none → `None`, a single child →
    /// that error verbatim, several → an INTERNAL_SERVER_ERROR coded by
    /// the shared scoper context plus any accumulated suffix.
    pub fn combined(&self) -> Option<PlatformError> {
        match self.errs.len() {
            0 => None,
            1 => self.errs.values().next().map(|re| re.err.clone()),
            _ => {
                // If every request carried the same scoper use it,
                // otherwise fall back to the default.
                let mut scoper = self.default_scoper.clone();
                let mut first = true;
                for re in self.errs.values() {
                    match (&re.scoper, &scoper) {
                        (Some(s), _) if first => scoper = Some(Arc::clone(s)),
                        (Some(s), Some(current)) if Arc::ptr_eq(s, current) => {}
                        (Some(s), None) => scoper = Some(Arc::clone(s)),
                        _ => scoper = self.default_scoper.clone(),
                    }
                    first = false;
                }

                let mut context = scoper.map(|s| s.context()).unwrap_or_default();
                if !self.suffix.is_empty() {
                    if !context.is_empty() {
                        context.push('.');
                    }
                    context.push_str(&self.suffix);
                }

                Some(PlatformError::internal_server(context, self.description()))
            }
        }
    }

    fn description(&self) -> String {
        let mut parts: Vec<String> = self
            .errs
            .values()
            .map(|re| format!("{}: {}", re.err.code(), re.err.description()))
            .collect();
        parts.sort();
        parts.join("; ")
    }
}

impl fmt::Display for Errors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}
