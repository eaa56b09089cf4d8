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

//! Discovery registration lifecycle
//!
//! A background ticker keeps us registered with the discovery service and
//! watches the heartbeat clock. Registration calls go through the platform
//! client with zero retries and a wide explicit timeout so a discovery
//! outage cannot feed back into our own retry machinery.

use std::sync::Arc;
use std::time::Duration;

use corvid_client::{req, Client, Options, Request};
use corvid_errors::PlatformError;
use corvid_proto::discovery::{MultiRequest, RegisterEndpoint, RegisterResponse, Service};
use tokio::sync::RwLock;

use crate::heartbeat::Heartbeat;
use crate::registry::Registry;
use crate::server::ServerInfo;

pub(crate) const DISCOVERY_SERVICE: &str = "com.corvid.kernel.discovery";

const LOST_CONTACT_INTERVAL: Duration = Duration::from_secs(60);
const TRY_DISCOVERY_INTERVAL: Duration = Duration::from_secs(10);
const MAX_DISCONNECTS: u32 = 5;

#[derive(Default)]
struct DiscoveryState {
    connected: bool,
    /// Whether we believe the batch registration went through; when false
    /// we re-register without waiting for a heartbeat timeout
    is_multi_registered: bool,
}

/// Keeps this server registered with the discovery directory.
pub(crate) struct Discovery {
    info: Arc<ServerInfo>,
    registry: Arc<Registry>,
    client: Arc<dyn Client>,
    hb: Heartbeat,
    state: RwLock<DiscoveryState>,
}

impl Discovery {
    pub(crate) fn new(
        info: Arc<ServerInfo>,
        registry: Arc<Registry>,
        client: Arc<dyn Client>,
    ) -> Arc<Self> {
        Arc::new(Self {
            info,
            registry,
            client,
            hb: Heartbeat::new(LOST_CONTACT_INTERVAL),
            state: RwLock::new(DiscoveryState::default()),
        })
    }

    /// Start the registration watchdog. With `die` set, the process exits
    /// after too many consecutive failed reconnects.
    pub(crate) fn spawn_tick(self: &Arc<Self>, die: bool) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut fail_count = 0u32;
            let mut ticker = tokio::time::interval(TRY_DISCOVERY_INTERVAL);
            ticker.tick().await;

            loop {
                ticker.tick().await;

                let healthy = {
                    let state = this.state.read().await;
                    state.is_multi_registered && this.hb.healthy()
                };
                if healthy {
                    continue;
                }

                fail_count += 1;
                tracing::info!(
                    ?LOST_CONTACT_INTERVAL,
                    "no heartbeats within the contact window, service is disconnected"
                );
                {
                    let mut state = this.state.write().await;
                    state.connected = false;
                }

                if fail_count >= MAX_DISCONNECTS && die {
                    tracing::error!(
                        max = MAX_DISCONNECTS,
                        "max discovery disconnects reached, exiting"
                    );
                    std::process::exit(1);
                }

                if this.connect().await.is_ok() {
                    fail_count = 0;
                }
            }
        });
    }

    /// Pulse the heartbeat clock; the dispatcher calls this on every
    /// inbound heartbeat.
    pub(crate) fn beat(&self) {
        self.hb.beat();
    }

    pub(crate) async fn is_connected(&self) -> bool {
        self.state.read().await.connected
    }

    /// Batch-register every endpoint with the directory.
    pub(crate) async fn connect(&self) -> Result<(), PlatformError> {
        tracing::trace!("discovery connecting");
        match self.call_discovery_service("multiregister", true).await {
            Ok(()) => {
                self.state.write().await.is_multi_registered = true;
                Ok(())
            }
            Err(err) => {
                self.state.write().await.is_multi_registered = false;
                Err(err)
            }
        }
    }

    /// Unregister so we can quit cleanly. No-op when not connected.
    pub(crate) async fn disconnect(&self) -> Result<(), PlatformError> {
        let connected = self.state.read().await.connected;
        if connected {
            return self.call_discovery_service("unregister", false).await;
        }
        Ok(())
    }

    async fn call_discovery_service(
        &self,
        action: &str,
        success_state: bool,
    ) -> Result<(), PlatformError> {
        tracing::info!(action, "calling the discovery service");

        let endpoints: Vec<RegisterEndpoint> = self
            .registry
            .iterate()
            .into_iter()
            .map(|ep| RegisterEndpoint {
                name: ep.name.clone(),
                mean: ep.mean,
                upper95: ep.upper95,
                subscribe: ep.subscribe.clone().unwrap_or_default(),
            })
            .collect();

        let multi = MultiRequest {
            instance_id: self.info.instance_id.clone(),
            hostname: self.info.hostname.clone(),
            machine_class: corvid_client::util::machine_class(),
            az_name: self.info.az.clone(),
            service: Some(Service {
                name: self.info.name.clone(),
                description: self.info.description.clone(),
                version: self.info.version,
                source: self.info.source.clone(),
                owner_email: self.info.owner_email.clone(),
                owner_mobile: self.info.owner_mobile.clone(),
                owner_team: self.info.owner_team.clone(),
            }),
            endpoints,
        };

        let mut request = Request::new(DISCOVERY_SERVICE, action, &multi).map_err(|err| {
            PlatformError::internal_server("com.corvid.kernel.discovery.badrequest", err)
        })?;
        request.set_from(&self.info.name);
        request.set_authorised(true);

        // Explicit timeout, we're happy to wait; zero retries so outages
        // don't loop back through us
        let opts = Options {
            retries: Some(0),
            timeout: Some(Duration::from_secs(5)),
        };
        let mut rsp = RegisterResponse::default();
        req(self.client.as_ref(), request, &mut rsp, Some(opts))
            .await
            .map_err(|err| {
                tracing::warn!(action, %err, "discovery call failed");
                err
            })?;

        self.state.write().await.connected = success_state;
        tracing::info!(action, "discovery call succeeded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corvid_client::MockClient;
    use corvid_proto::discovery::{EndpointsRequest, EndpointsResponse};

    use crate::endpoint::Endpoint;

    fn setup(mock: MockClient) -> (Arc<Discovery>, Arc<MockClient>) {
        let registry = Arc::new(Registry::new());
        registry
            .add(
                Endpoint::builder("register")
                    .mean(50)
                    .upper95(150)
                    .protocols::<EndpointsRequest, EndpointsResponse>()
                    .handler(|_req| async move { Ok(EndpointsResponse::default()) })
                    .build(),
            )
            .unwrap();

        let client = Arc::new(mock);
        let info = Arc::new(ServerInfo::for_tests("com.corvid.test"));
        let discovery = Discovery::new(info, registry, client.clone() as Arc<dyn Client>);
        (discovery, client)
    }

    #[tokio::test]
    async fn successful_multiregister_connects() {
        let mock = MockClient::new();
        mock.stub_response(
            DISCOVERY_SERVICE,
            "multiregister",
            &RegisterResponse::default(),
        );
        let (discovery, client) = setup(mock);

        discovery.connect().await.unwrap();
        assert!(discovery.is_connected().await);

        let sent = client.requests();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].endpoint(), "multiregister");
        assert!(sent[0].authorised());

        let multi: MultiRequest = sent[0].unmarshal().unwrap();
        assert_eq!(multi.endpoints.len(), 1);
        assert_eq!(multi.endpoints[0].name, "register");
        assert_eq!(multi.endpoints[0].mean, 50);
        assert_eq!(multi.endpoints[0].upper95, 150);
    }

    #[tokio::test]
    async fn failed_multiregister_stays_disconnected() {
        let (discovery, _client) = setup(MockClient::new());
        assert!(discovery.connect().await.is_err());
        assert!(!discovery.is_connected().await);
    }

    #[tokio::test]
    async fn disconnect_sends_unregister_only_when_connected() {
        let mock = MockClient::new();
        mock.stub_response(
            DISCOVERY_SERVICE,
            "multiregister",
            &RegisterResponse::default(),
        );
        mock.stub_response(
            DISCOVERY_SERVICE,
            "unregister",
            &RegisterResponse::default(),
        );
        let (discovery, client) = setup(mock);

        // Not yet connected: nothing sent
        discovery.disconnect().await.unwrap();
        assert!(client.requests().is_empty());

        discovery.connect().await.unwrap();
        discovery.disconnect().await.unwrap();

        let endpoints: Vec<String> = client
            .requests()
            .iter()
            .map(|r| r.endpoint().to_string())
            .collect();
        assert_eq!(endpoints, vec!["multiregister", "unregister"]);
        assert!(!discovery.is_connected().await);
    }
}
