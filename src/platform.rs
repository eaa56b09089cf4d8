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

//! The platform root context
//!
//! One explicitly-owned bundle of the shared platform pieces: broker
//! handle, configuration, circuit breakers, error tracker and the default
//! client. Constructed once at startup and threaded into components;
//! tests construct their own with whatever backends they like.

use std::sync::Arc;

use corvid_broker::Broker;
use corvid_circuit_breaker::CircuitRegistry;
use corvid_client::DefaultClient;
use corvid_config::ConfigStore;
use corvid_errors::ErrorTracker;
use corvid_multiclient::{platform_caller, MultiClient};
use corvid_server::auth::SessionStore;
use corvid_server::{Server, ServerConfig, ServerError};

/// Everything a service process shares across its client and server
/// sides.
pub struct Platform {
    pub broker: Arc<dyn Broker>,
    pub config: Arc<ConfigStore>,
    pub breakers: Arc<CircuitRegistry>,
    pub tracker: Arc<ErrorTracker>,
    pub client: Arc<DefaultClient>,
}

impl Platform {
    /// Wire a platform onto a broker with a fresh configuration store.
    pub fn new(broker: Arc<dyn Broker>) -> Self {
        Self::with_config(broker, Arc::new(ConfigStore::new()))
    }

    /// Wire a platform onto a broker with an existing configuration
    /// store (eg one already fed by a config subscriber).
    pub fn with_config(broker: Arc<dyn Broker>, config: Arc<ConfigStore>) -> Self {
        let breakers = CircuitRegistry::new(Arc::clone(&config));
        let tracker = Arc::new(ErrorTracker::new());
        let client = DefaultClient::new(
            Arc::clone(&broker),
            Arc::clone(&config),
            Arc::clone(&breakers),
            Arc::clone(&tracker),
        );

        Self {
            broker,
            config,
            breakers,
            tracker,
            client,
        }
    }

    /// Build a server sharing this platform's collaborators.
    pub fn server(
        &self,
        server_config: ServerConfig,
        session_store: Arc<dyn SessionStore>,
    ) -> Result<Arc<Server>, ServerError> {
        Server::new(
            server_config,
            Arc::clone(&self.broker),
            Arc::clone(&self.config),
            self.client.clone(),
            Arc::clone(&self.breakers),
            Arc::clone(&self.tracker),
            session_store,
        )
    }

    /// A fan-out container whose default caller is this platform's
    /// client.
    pub fn multi_client(&self) -> MultiClient {
        MultiClient::new(
            platform_caller(self.client.clone()),
            Arc::clone(&self.config),
        )
    }
}
