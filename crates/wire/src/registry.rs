// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cluster registry surface, as consumed by the manager.

use std::collections::HashMap;

use nsm_core::{EndpointRegistration, NetworkService, NetworkServiceEndpoint, NsmManager};
use serde::{Deserialize, Serialize};

/// Cluster-wide address layout, used to seed the excluded-prefix set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterConfiguration {
    pub pod_subnet: String,
    pub service_subnet: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubnetScope {
    Pod,
    Service,
}

/// A subnet was extended; the new prefix joins the excluded set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubnetExtensionEvent {
    pub scope: SubnetScope,
    pub prefix: String,
}

/// Discovery result for one service name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindReply {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<NetworkService>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub endpoints: Vec<NetworkServiceEndpoint>,
    /// Managers hosting the endpoints, keyed by canonical name.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub managers: HashMap<String, NsmManager>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RegistryRequest {
    #[serde(rename = "registry:register_nse")]
    RegisterNse { registration: EndpointRegistration },

    #[serde(rename = "registry:remove_nse")]
    RemoveNse { name: String },

    #[serde(rename = "registry:register_nsm")]
    RegisterNsm { manager: NsmManager },

    #[serde(rename = "registry:find_network_service")]
    FindNetworkService { name: String },

    #[serde(rename = "registry:get_cluster_configuration")]
    GetClusterConfiguration,

    /// Upgrade into a `RegistryResponse::SubnetExtension` stream.
    #[serde(rename = "registry:monitor_subnets")]
    MonitorSubnets,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RegistryResponse {
    #[serde(rename = "registry:registration")]
    Registration { registration: EndpointRegistration },

    #[serde(rename = "registry:manager")]
    Manager { manager: NsmManager },

    #[serde(rename = "registry:service")]
    Service { reply: FindReply },

    #[serde(rename = "registry:cluster_configuration")]
    ClusterConfiguration { configuration: ClusterConfiguration },

    #[serde(rename = "registry:ok")]
    Ok,

    #[serde(rename = "registry:error")]
    Error { message: String },

    #[serde(rename = "registry:subnet_extension")]
    SubnetExtension { event: SubnetExtensionEvent },
}
