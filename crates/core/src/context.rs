// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Connection context: the address outcome of a request.

use serde::{Deserialize, Serialize};

/// Addressing negotiated for one connection.
///
/// A requester sets the `*_required` flags and optional extra prefix
/// requests; the endpoint's allocator fills the addresses and grants.
/// `excluded_prefixes` is populated by the manager before the request
/// reaches the endpoint so its pool avoids cluster-owned ranges.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src_ip_addr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dst_ip_addr: Option<String>,
    #[serde(default)]
    pub src_ip_required: bool,
    #[serde(default)]
    pub dst_ip_required: bool,
    /// Additional prefixes the requester asks to be routed to it.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_prefix_request: Vec<String>,
    /// Prefixes granted in response to `extra_prefix_request`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_prefixes: Vec<String>,
    /// Ranges the endpoint's allocator must not draw from.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub excluded_prefixes: Vec<String>,
}

impl ConnectionContext {
    /// Check that every required address was filled in.
    pub fn is_complete(&self) -> Result<(), String> {
        if self.src_ip_required && self.src_ip_addr.as_deref().unwrap_or("").is_empty() {
            return Err("source IP required but not provided".to_string());
        }
        if self.dst_ip_required && self.dst_ip_addr.as_deref().unwrap_or("").is_empty() {
            return Err("destination IP required but not provided".to_string());
        }
        Ok(())
    }
}
