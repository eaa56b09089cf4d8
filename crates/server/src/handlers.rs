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

//! Thin admin endpoints registered on every server
//!
//! They pass through the same middleware chain as everything else and
//! have no special privileges. `jsonschema` is open to the world; the
//! rest default to admin-role.

use std::sync::Arc;
use std::time::UNIX_EPOCH;

use corvid_config::ConfigStore;
use corvid_proto::admin::{
    EndpointSchema, HealthRequest, HealthResponse, JsonSchemaRequest, JsonSchemaResponse,
    LoadedConfigRequest, LoadedConfigResponse, StatsRequest, StatsResponse,
};

use crate::authoriser::open_to_the_world_authoriser;
use crate::endpoint::Endpoint;
use crate::healthchecks::HealthCheckRegistry;
use crate::registry::Registry;
use crate::server::ServerInfo;
use crate::tokens::TokenBuckets;

pub(crate) fn health_endpoint(checks: Arc<HealthCheckRegistry>) -> Endpoint {
    Endpoint::builder("health")
        .mean(100)
        .upper95(200)
        .protocols::<HealthRequest, HealthResponse>()
        .handler(move |_req| {
            let checks = Arc::clone(&checks);
            async move {
                Ok(HealthResponse {
                    healthchecks: checks.run_all().await,
                })
            }
        })
        .build()
}

pub(crate) fn stats_endpoint(
    info: Arc<ServerInfo>,
    tokens: Arc<TokenBuckets>,
    registry: Arc<Registry>,
) -> Endpoint {
    Endpoint::builder("stats")
        .mean(100)
        .upper95(200)
        .protocols::<StatsRequest, StatsResponse>()
        .handler(move |_req| {
            let info = Arc::clone(&info);
            let tokens = Arc::clone(&tokens);
            let registry = Arc::clone(&registry);
            async move {
                Ok(StatsResponse {
                    service_name: info.name.clone(),
                    service_version: info.version,
                    instance_id: info.instance_id.clone(),
                    uptime: info.uptime_seconds(),
                    inflight_requests: tokens.inflight(),
                    registered_endpoints: registry.size() as u32,
                })
            }
        })
        .build()
}

pub(crate) fn loaded_config_endpoint(config: Arc<ConfigStore>) -> Endpoint {
    Endpoint::builder("loadedconfig")
        .mean(100)
        .upper95(200)
        .protocols::<LoadedConfigRequest, LoadedConfigResponse>()
        .handler(move |_req| {
            let config = Arc::clone(&config);
            async move {
                let (config_hash, loaded_at) = config.last_loaded();
                let last_loaded = loaded_at
                    .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                    .map(|d| d.as_secs() as i64)
                    .unwrap_or(0);
                Ok(LoadedConfigResponse {
                    config_hash,
                    last_loaded,
                })
            }
        })
        .build()
}

pub(crate) fn jsonschema_endpoint(registry: Arc<Registry>) -> Endpoint {
    Endpoint::builder("jsonschema")
        .mean(100)
        .upper95(200)
        .protocols::<JsonSchemaRequest, JsonSchemaResponse>()
        .authoriser(open_to_the_world_authoriser())
        .handler(move |req| {
            let registry = Arc::clone(&registry);
            async move {
                let filter = req
                    .data::<JsonSchemaRequest>()
                    .map(|r| r.endpoint.clone())
                    .unwrap_or_default();

                let mut schemas: Vec<EndpointSchema> = registry
                    .iterate()
                    .into_iter()
                    .filter(|ep| filter.is_empty() || ep.name == filter)
                    .map(|ep| {
                        let (request_type, response_type) = ep.protocol_type_names();
                        EndpointSchema {
                            endpoint: ep.name.clone(),
                            request_type: request_type.unwrap_or_default().to_string(),
                            response_type: response_type.unwrap_or_default().to_string(),
                        }
                    })
                    .collect();
                schemas.sort_by(|a, b| a.endpoint.cmp(&b.endpoint));

                Ok(JsonSchemaResponse { schemas })
            }
        })
        .build()
}
