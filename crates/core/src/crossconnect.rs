// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cross-connects: the unit of forwarding state installed in a dataplane.

use serde::{Deserialize, Serialize};

use crate::connection::Connection;
use crate::id::ConnectionId;

/// One side of a cross-connect. `Local` halves live on this NSM; `Remote`
/// halves reference a connection owned by a peer NSM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum ConnectionSide {
    Local { connection: Connection },
    Remote { connection: Connection, manager_name: String },
}

impl ConnectionSide {
    pub fn connection(&self) -> &Connection {
        match self {
            ConnectionSide::Local { connection } => connection,
            ConnectionSide::Remote { connection, .. } => connection,
        }
    }

    pub fn connection_mut(&mut self) -> &mut Connection {
        match self {
            ConnectionSide::Local { connection } => connection,
            ConnectionSide::Remote { connection, .. } => connection,
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, ConnectionSide::Remote { .. })
    }
}

/// A source/destination pairing installed (or to be installed) in one
/// dataplane. Ids are unique per dataplane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossConnect {
    pub id: String,
    #[serde(default)]
    pub payload: String,
    pub source: ConnectionSide,
    pub destination: ConnectionSide,
}

impl CrossConnect {
    pub fn new(
        id: impl Into<String>,
        payload: impl Into<String>,
        source: ConnectionSide,
        destination: ConnectionSide,
    ) -> Self {
        Self { id: id.into(), payload: payload.into(), source, destination }
    }

    pub fn local_source(&self) -> Option<&Connection> {
        match &self.source {
            ConnectionSide::Local { connection } => Some(connection),
            ConnectionSide::Remote { .. } => None,
        }
    }

    pub fn local_destination(&self) -> Option<&Connection> {
        match &self.destination {
            ConnectionSide::Local { connection } => Some(connection),
            ConnectionSide::Remote { .. } => None,
        }
    }

    pub fn remote_destination(&self) -> Option<&Connection> {
        match &self.destination {
            ConnectionSide::Remote { connection, .. } => Some(connection),
            ConnectionSide::Local { .. } => None,
        }
    }

    /// Manager owning the remote destination, when there is one.
    pub fn destination_manager(&self) -> Option<&str> {
        match &self.destination {
            ConnectionSide::Remote { manager_name, .. } => Some(manager_name),
            ConnectionSide::Local { .. } => None,
        }
    }

    pub fn destination_id(&self) -> &ConnectionId {
        &self.destination.connection().id
    }
}

#[cfg(test)]
#[path = "crossconnect_tests.rs"]
mod tests;
