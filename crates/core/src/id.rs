// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Connection identifiers and generated endpoint names.
//!
//! Connection ids are small decimal strings ("1", "2", …) allocated from a
//! per-manager counter owned by the model. They are only unique within one
//! NSM; cross-node references always pair the id with the manager name.

use serde::{Deserialize, Serialize};

/// Identifier of one connection half, unique within its manager.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Render a counter value as an id.
    pub fn from_counter(n: u64) -> Self {
        Self(n.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parse back the counter value, if this id is numeric.
    pub fn counter_value(&self) -> Option<u64> {
        self.0.parse().ok()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ConnectionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for ConnectionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for ConnectionId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for ConnectionId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl std::borrow::Borrow<str> for ConnectionId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Generate a registry-unique endpoint name for a registration that did not
/// provide one: `<service>-<8 char nanoid>`.
pub fn generate_endpoint_name(service: &str) -> String {
    format!("{}-{}", service, nanoid::nanoid!(8))
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
