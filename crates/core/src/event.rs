// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Model change events.
//!
//! Serializes with `{"type": "scope:verb", ...fields}` format, matching the
//! wire protocol enums.

use serde::{Deserialize, Serialize};

use crate::client_connection::ClientConnection;
use crate::dataplane::Dataplane;
use crate::endpoint::Endpoint;
use crate::id::ConnectionId;

/// Events emitted by the model after each serialized mutation.
///
/// Listeners receive them through a bounded per-subscriber mailbox; a slow
/// listener loses the oldest events, never blocks the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ModelEvent {
    #[serde(rename = "endpoint:added")]
    EndpointAdded { endpoint: Endpoint },

    #[serde(rename = "endpoint:deleted")]
    EndpointDeleted { name: String },

    #[serde(rename = "dataplane:added")]
    DataplaneAdded { dataplane: Dataplane },

    #[serde(rename = "dataplane:deleted")]
    DataplaneDeleted { name: String },

    #[serde(rename = "client_connection:added")]
    ClientConnectionAdded { connection: ClientConnection },

    #[serde(rename = "client_connection:updated")]
    ClientConnectionUpdated { connection: ClientConnection },

    #[serde(rename = "client_connection:deleted")]
    ClientConnectionDeleted { id: ConnectionId },
}
