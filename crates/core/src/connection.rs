// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One end of a service path.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::context::ConnectionContext;
use crate::id::ConnectionId;
use crate::mechanism::Mechanism;

/// Liveness of a connection as last reported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Up,
    Down,
}

crate::simple_display! {
    ConnectionState {
        Up => "up",
        Down => "down",
    }
}

/// Validation failures for a connection that is supposed to be installable.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("connection id is empty")]
    EmptyId,
    #[error("network service name is empty")]
    EmptyService,
    #[error("connection {0} has no mechanism")]
    NoMechanism(ConnectionId),
    #[error("connection {0} context incomplete: {1}")]
    IncompleteContext(ConnectionId, String),
}

/// One end of a service path: a source half on the requesting side or a
/// destination half on the endpoint side.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    pub id: ConnectionId,
    pub network_service: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mechanism: Option<Mechanism>,
    #[serde(default)]
    pub context: ConnectionContext,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub state: ConnectionState,
}

impl Connection {
    /// A skeleton connection for an outgoing request: no mechanism or
    /// addresses yet, just the service and desired context.
    pub fn request_skeleton(network_service: impl Into<String>) -> Self {
        Self { network_service: network_service.into(), ..Self::default() }
    }

    /// Check the connection is fully negotiated: id, service, mechanism,
    /// and every required context address present.
    pub fn is_complete(&self) -> Result<(), ConnectionError> {
        if self.id.is_empty() {
            return Err(ConnectionError::EmptyId);
        }
        if self.network_service.is_empty() {
            return Err(ConnectionError::EmptyService);
        }
        if self.mechanism.is_none() {
            return Err(ConnectionError::NoMechanism(self.id.clone()));
        }
        self.context
            .is_complete()
            .map_err(|reason| ConnectionError::IncompleteContext(self.id.clone(), reason))
    }
}

#[cfg(test)]
#[path = "connection_tests.rs"]
mod tests;
