// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Registry records: services, endpoints, managers.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A named L2/L3 connectivity offering.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkService {
    pub name: String,
    #[serde(default)]
    pub payload: String,
}

/// A registered provider of a network service, as the cluster registry
/// sees it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkServiceEndpoint {
    /// Globally unique endpoint name.
    pub name: String,
    pub network_service: String,
    #[serde(default)]
    pub payload: String,
    /// Canonical name of the manager hosting this endpoint.
    #[serde(default)]
    pub manager_name: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub labels: HashMap<String, String>,
}

/// A per-node manager as registered in the cluster registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NsmManager {
    pub name: String,
    /// Public peer-surface address (`host:port`).
    pub url: String,
}

/// The registration triple sent to (and returned by) the registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointRegistration {
    pub service: NetworkService,
    pub endpoint: NetworkServiceEndpoint,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manager: Option<NsmManager>,
}

/// Model-side record of a local (or known) endpoint: the registration plus
/// where to reach it on this node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub registration: EndpointRegistration,
    /// Workspace the endpoint lives in; empty for restored placeholders.
    #[serde(default)]
    pub workspace: String,
    /// Socket the endpoint serves requests on.
    #[serde(default)]
    pub socket_location: String,
}

impl Endpoint {
    pub fn name(&self) -> &str {
        &self.registration.endpoint.name
    }

    pub fn service_name(&self) -> &str {
        &self.registration.endpoint.network_service
    }

    pub fn manager_name(&self) -> &str {
        &self.registration.endpoint.manager_name
    }

    pub fn labels(&self) -> &HashMap<String, String> {
        &self.registration.endpoint.labels
    }
}
