// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Transport mechanisms.
//!
//! A mechanism describes how traffic crosses one boundary: into a client
//! netns (kernel interface), into a user-space endpoint (memif), or across
//! nodes (vxlan). Kinds split into *local* (same-node) and *remote*
//! (cross-node) sets; a dataplane advertises each set separately and a
//! connection half carries exactly one negotiated mechanism.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Netns inode of the requesting client (kernel interface).
pub const NETNS_INODE: &str = "netns_inode";
/// Interface name to create in the client netns.
pub const INTERFACE_NAME: &str = "interface_name";
/// Workspace owning the client side of a connection; stamped on source
/// mechanisms so a restored cross-connect finds its monitor stream again.
pub const WORKSPACE: &str = "workspace";
/// Endpoint name recorded on destination mechanisms; the restorer uses it
/// to decide whether a surviving cross-connect still has a live endpoint.
pub const WORKSPACE_NSE_NAME: &str = "workspace_nse_name";
/// VXLAN tunnel key.
pub const VXLAN_VNI: &str = "vni";
/// VXLAN source endpoint address.
pub const VXLAN_SRC_IP: &str = "src_ip";
/// VXLAN destination endpoint address.
pub const VXLAN_DST_IP: &str = "dst_ip";

/// Mechanism kind tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MechanismKind {
    KernelInterface,
    Memif,
    Vxlan,
}

crate::simple_display! {
    MechanismKind {
        KernelInterface => "kernel_interface",
        Memif => "memif",
        Vxlan => "vxlan",
    }
}

impl MechanismKind {
    /// Same-node kinds, usable for a source or a local destination.
    pub fn is_local(&self) -> bool {
        matches!(self, MechanismKind::KernelInterface | MechanismKind::Memif)
    }

    /// Cross-node kinds, usable for a remote destination.
    pub fn is_remote(&self) -> bool {
        matches!(self, MechanismKind::Vxlan)
    }
}

/// One negotiated (or proposed) transport descriptor.
///
/// Mechanisms compare by kind and full parameter map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mechanism {
    pub kind: Option<MechanismKind>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub parameters: HashMap<String, String>,
}

impl Mechanism {
    pub fn new(kind: MechanismKind) -> Self {
        Self { kind: Some(kind), parameters: HashMap::new() }
    }

    pub fn with_parameter(mut self, key: &str, value: impl Into<String>) -> Self {
        self.parameters.insert(key.to_string(), value.into());
        self
    }

    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).map(String::as_str)
    }

    /// VXLAN tunnel key, when present and numeric.
    pub fn vni(&self) -> Option<u32> {
        self.parameter(VXLAN_VNI)?.parse().ok()
    }
}

impl std::fmt::Display for Mechanism {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            Some(kind) => write!(f, "{}", kind),
            None => f.write_str("unset"),
        }
    }
}

/// Pick the mechanism to install: the earliest requester preference whose
/// kind the dataplane supports. The requester's parameters win; dataplane
/// parameters for the same kind are merged in underneath (tunnel source
/// addresses and similar capabilities the requester cannot know).
pub fn negotiate(preferences: &[Mechanism], supported: &[Mechanism]) -> Option<Mechanism> {
    for preference in preferences {
        let Some(kind) = preference.kind else { continue };
        if let Some(capability) = supported.iter().find(|m| m.kind == Some(kind)) {
            let mut chosen = preference.clone();
            for (k, v) in &capability.parameters {
                chosen.parameters.entry(k.clone()).or_insert_with(|| v.clone());
            }
            return Some(chosen);
        }
    }
    None
}

#[cfg(test)]
#[path = "mechanism_tests.rs"]
mod tests;
