// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Endpoint selection.
//!
//! Order of preference: label match first, then endpoints on this node
//! (no tunnel), then lowest endpoint name. A heal in progress passes the
//! failed endpoint names to exclude them outright.

use std::collections::HashMap;

use nsm_core::{labels_match, NetworkServiceEndpoint, NsmManager};
use nsm_wire::FindReply;

#[derive(Debug, Clone)]
pub(crate) struct SelectedEndpoint {
    pub endpoint: NetworkServiceEndpoint,
    /// Manager hosting the endpoint; `None` can only happen for stale
    /// registry entries and disqualifies remote candidates.
    pub manager: Option<NsmManager>,
    pub is_local: bool,
}

pub(crate) fn choose(
    reply: &FindReply,
    selector: &HashMap<String, String>,
    node_name: &str,
    exclude: &[String],
) -> Option<SelectedEndpoint> {
    let mut candidates: Vec<&NetworkServiceEndpoint> = reply
        .endpoints
        .iter()
        .filter(|ep| !exclude.contains(&ep.name))
        .filter(|ep| labels_match(selector, &ep.labels))
        .collect();

    // Local first, then lexicographic by endpoint name.
    candidates.sort_by_key(|ep| (ep.manager_name != node_name, ep.name.clone()));

    for ep in candidates {
        let is_local = ep.manager_name == node_name;
        let manager = reply.managers.get(&ep.manager_name).cloned();
        if !is_local && manager.is_none() {
            // Endpoint whose manager is gone: unusable from here.
            continue;
        }
        return Some(SelectedEndpoint { endpoint: ep.clone(), manager, is_local });
    }
    None
}

#[cfg(test)]
#[path = "selection_tests.rs"]
mod tests;
