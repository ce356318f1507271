// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The NSM-side record of a client request in progress or installed.

use serde::{Deserialize, Serialize};

use crate::connection::Connection;
use crate::crossconnect::CrossConnect;
use crate::endpoint::Endpoint;
use crate::id::ConnectionId;

/// Lifecycle of a client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientConnectionState {
    Requesting,
    Ready,
    Healing,
    Closing,
    Closed,
}

crate::simple_display! {
    ClientConnectionState {
        Requesting => "requesting",
        Ready => "ready",
        Healing => "healing",
        Closing => "closing",
        Closed => "closed",
    }
}

/// One requested service path as tracked by this NSM.
///
/// The cross-connect is absent only while REQUESTING (not yet installed)
/// or after unprogramming during close. All references out of this record
/// are by name/id; the model is the single owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConnection {
    pub id: ConnectionId,
    /// Workspace that issued the request; empty for connections created on
    /// behalf of a peer NSM.
    #[serde(default)]
    pub workspace: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xcon: Option<CrossConnect>,
    /// Endpoint serving the destination half, when selected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<Endpoint>,
    /// Dataplane holding the cross-connect.
    #[serde(default)]
    pub dataplane: String,
    /// Peer manager that requested this connection (set on the destination
    /// NSM for incoming cross-node halves).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requesting_manager: Option<String>,
    pub state: ClientConnectionState,
}

impl ClientConnection {
    /// Start a record in REQUESTING state; everything else fills in as the
    /// state machine advances.
    pub fn requesting(id: ConnectionId, workspace: impl Into<String>) -> Self {
        Self {
            id,
            workspace: workspace.into(),
            xcon: None,
            endpoint: None,
            dataplane: String::new(),
            requesting_manager: None,
            state: ClientConnectionState::Requesting,
        }
    }

    /// The source half handed back to the requester, when installed.
    pub fn source_connection(&self) -> Option<&Connection> {
        self.xcon.as_ref().map(|x| x.source.connection())
    }

    /// Id of the destination half, local or remote.
    pub fn destination_id(&self) -> Option<&ConnectionId> {
        self.xcon.as_ref().map(CrossConnect::destination_id)
    }

    pub fn endpoint_name(&self) -> Option<&str> {
        self.endpoint.as_ref().map(Endpoint::name)
    }

    /// Remote manager on the destination side, when this is the source NSM
    /// of a cross-node path.
    pub fn remote_manager(&self) -> Option<&str> {
        self.xcon.as_ref().and_then(CrossConnect::destination_manager)
    }
}

#[cfg(test)]
#[path = "client_connection_tests.rs"]
mod tests;
