// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Public peer surface: what one NSM asks of another.

use nsm_core::{Connection, ConnectionId, NsmManager};
use serde::{Deserialize, Serialize};

use crate::types::{ConnectionEvent, NetworkServiceRequest};

/// A cross-node request: the source NSM has already selected the endpoint
/// and negotiated the remote mechanism (with allocated tunnel key); the
/// destination NSM runs the state machine for its half and returns the
/// destination connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteServiceRequest {
    /// Connection skeleton; id is empty, the destination allocates its own.
    pub request: NetworkServiceRequest,
    /// Identity of the requesting manager, for monitoring back-references.
    pub requesting_manager: NsmManager,
    /// Endpoint the source NSM selected from the registry.
    pub endpoint_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PeerRequest {
    #[serde(rename = "peer:request")]
    Request { request: RemoteServiceRequest },

    #[serde(rename = "peer:close")]
    Close { connection_id: ConnectionId },

    /// Subscribe to events for connections requested by `manager_name`.
    /// Upgrades the connection into a `PeerResponse::Event` stream.
    #[serde(rename = "peer:monitor")]
    Monitor { manager_name: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PeerResponse {
    #[serde(rename = "peer:connection")]
    Connection { connection: Connection },

    #[serde(rename = "peer:ok")]
    Ok,

    #[serde(rename = "peer:error")]
    Error { message: String },

    #[serde(rename = "peer:event")]
    Event { event: ConnectionEvent },
}
