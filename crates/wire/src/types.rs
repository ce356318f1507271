// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! DTOs shared across surfaces.

use nsm_core::{Connection, Mechanism};
use serde::{Deserialize, Serialize};

/// A request for a network service: the desired connection skeleton plus
/// the requester's transport preferences in order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkServiceRequest {
    pub connection: Connection,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mechanism_preferences: Vec<Mechanism>,
}

/// Kind of a monitor stream frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionEventKind {
    /// Snapshot of everything currently known, sent once on subscribe.
    InitialStateTransfer,
    Update,
    Delete,
}

/// One monitor stream frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionEvent {
    pub kind: ConnectionEventKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub connections: Vec<Connection>,
}

impl ConnectionEvent {
    pub fn update(connection: Connection) -> Self {
        Self { kind: ConnectionEventKind::Update, connections: vec![connection] }
    }

    pub fn delete(connection: Connection) -> Self {
        Self { kind: ConnectionEventKind::Delete, connections: vec![connection] }
    }
}

#[cfg(test)]
#[path = "types_tests.rs"]
mod tests;
