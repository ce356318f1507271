// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn connection_id_from_counter() {
    let id = ConnectionId::from_counter(7);
    assert_eq!(id.as_str(), "7");
    assert_eq!(id.counter_value(), Some(7));
}

#[test]
fn connection_id_counter_value_non_numeric() {
    let id = ConnectionId::new("restored-a");
    assert_eq!(id.counter_value(), None);
}

#[test]
fn connection_id_serde_transparent() {
    let id = ConnectionId::new("42");
    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, "\"42\"");

    let parsed: ConnectionId = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, id);
}

#[test]
fn connection_id_borrow_str_lookup() {
    let mut map = std::collections::HashMap::new();
    map.insert(ConnectionId::new("1"), "x");
    assert_eq!(map.get("1"), Some(&"x"));
}

#[test]
fn endpoint_name_carries_service_prefix() {
    let name = generate_endpoint_name("golden_network");
    assert!(name.starts_with("golden_network-"));
    assert_ne!(name, generate_endpoint_name("golden_network"));
}
