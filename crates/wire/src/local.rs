// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-workspace local client surface.

use nsm_core::{Connection, EndpointRegistration};
use serde::{Deserialize, Serialize};

use crate::types::{ConnectionEvent, NetworkServiceRequest};

/// Request from a client (or in-workspace endpoint) on the workspace
/// unix socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LocalRequest {
    /// Request a connection to a named network service.
    #[serde(rename = "local:request")]
    Request { request: NetworkServiceRequest },

    /// Close a previously returned connection.
    #[serde(rename = "local:close")]
    Close { connection: Connection },

    /// Register an endpoint living inside this workspace.
    #[serde(rename = "local:register_endpoint")]
    RegisterEndpoint { registration: EndpointRegistration },

    /// Remove an endpoint by name.
    #[serde(rename = "local:remove_endpoint")]
    RemoveEndpoint { name: String },

    /// Subscribe to connection events for this workspace. Upgrades the
    /// connection: the server streams `LocalResponse::Event` frames.
    #[serde(rename = "local:monitor")]
    Monitor,
}

/// Response on the workspace socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LocalResponse {
    #[serde(rename = "local:connection")]
    Connection { connection: Connection },

    #[serde(rename = "local:registration")]
    Registration { registration: EndpointRegistration },

    #[serde(rename = "local:ok")]
    Ok,

    #[serde(rename = "local:error")]
    Error { message: String },

    #[serde(rename = "local:event")]
    Event { event: ConnectionEvent },
}
