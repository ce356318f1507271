// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Outbound surface to a dataplane agent.

use nsm_core::{CrossConnect, Mechanism};
use serde::{Deserialize, Serialize};

/// One update on the agent's mechanisms stream. Replaces both lists;
/// an empty update means the agent is not ready yet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MechanismsUpdate {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub local_mechanisms: Vec<Mechanism>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remote_mechanisms: Vec<Mechanism>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DataplaneRequest {
    /// Install a cross-connect; the agent may rewrite parameters it owns.
    #[serde(rename = "dataplane:program")]
    Program { cross_connect: CrossConnect },

    #[serde(rename = "dataplane:unprogram")]
    Unprogram { cross_connect: CrossConnect },

    /// Upgrade into a `DataplaneResponse::Mechanisms` stream.
    #[serde(rename = "dataplane:monitor_mechanisms")]
    MonitorMechanisms,

    /// Cross-connects the agent still holds; read once after an NSM
    /// restart to rebuild connection state.
    #[serde(rename = "dataplane:inventory")]
    Inventory,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DataplaneResponse {
    #[serde(rename = "dataplane:cross_connect")]
    CrossConnect { cross_connect: CrossConnect },

    #[serde(rename = "dataplane:ok")]
    Ok,

    #[serde(rename = "dataplane:error")]
    Error { message: String },

    #[serde(rename = "dataplane:mechanisms")]
    Mechanisms { update: MechanismsUpdate },

    #[serde(rename = "dataplane:inventory")]
    Inventory {
        #[serde(default)]
        cross_connects: Vec<CrossConnect>,
    },
}
