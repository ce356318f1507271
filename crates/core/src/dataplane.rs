// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Local forwarder registrations.

use serde::{Deserialize, Serialize};

use crate::mechanism::Mechanism;

/// A dataplane agent registered with this NSM.
///
/// Mechanism lists arrive over the agent's monitor stream after
/// registration; until `mechanisms_configured` flips, the dataplane is not
/// eligible for placement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataplane {
    pub registered_name: String,
    /// Agent socket, `unix:<path>` or `tcp:<addr>`.
    pub socket_location: String,
    /// Mechanisms usable for same-node endpoints.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub local_mechanisms: Vec<Mechanism>,
    /// Mechanisms usable for cross-node destinations.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remote_mechanisms: Vec<Mechanism>,
    #[serde(default)]
    pub mechanisms_configured: bool,
}

impl Dataplane {
    pub fn new(registered_name: impl Into<String>, socket_location: impl Into<String>) -> Self {
        Self {
            registered_name: registered_name.into(),
            socket_location: socket_location.into(),
            ..Self::default()
        }
    }

    /// Ready to host a cross-connect whose destination is local/remote.
    pub fn supports(&self, remote: bool) -> bool {
        if !self.mechanisms_configured {
            return false;
        }
        if remote {
            !self.remote_mechanisms.is_empty()
        } else {
            !self.local_mechanisms.is_empty()
        }
    }
}
