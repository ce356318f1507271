// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Label parsing and selector matching.
//!
//! Labels travel as `key=value` maps on endpoints and requests; the env
//! format is a comma-separated list (`app=icmp,tier=edge`).

use std::collections::HashMap;

/// Parse a `k=v,k2=v2` string into a label map. Entries without `=` and
/// empty segments are ignored.
pub fn parse_labels(raw: &str) -> HashMap<String, String> {
    raw.split(',')
        .filter_map(|pair| {
            let (k, v) = pair.split_once('=')?;
            let k = k.trim();
            if k.is_empty() {
                return None;
            }
            Some((k.to_string(), v.trim().to_string()))
        })
        .collect()
}

/// Selector match: every selector pair must be present in `labels` with the
/// same value. An empty selector matches everything.
pub fn matches(selector: &HashMap<String, String>, labels: &HashMap<String, String>) -> bool {
    selector.iter().all(|(k, v)| labels.get(k) == Some(v))
}

#[cfg(test)]
#[path = "labels_tests.rs"]
mod tests;
