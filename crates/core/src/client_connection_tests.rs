// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::crossconnect::ConnectionSide;

fn conn(id: &str) -> Connection {
    Connection { id: ConnectionId::new(id), ..Connection::default() }
}

#[test]
fn requesting_record_has_no_crossconnect() {
    let cc = ClientConnection::requesting(ConnectionId::new("1"), "nsm-1");
    assert_eq!(cc.state, ClientConnectionState::Requesting);
    assert!(cc.xcon.is_none());
    assert!(cc.source_connection().is_none());
    assert!(cc.destination_id().is_none());
}

#[test]
fn installed_record_exposes_halves() {
    let mut cc = ClientConnection::requesting(ConnectionId::new("1"), "nsm-1");
    cc.xcon = Some(CrossConnect::new(
        "1",
        "IP",
        ConnectionSide::Local { connection: conn("1") },
        ConnectionSide::Remote { connection: conn("9"), manager_name: "worker".into() },
    ));
    cc.state = ClientConnectionState::Ready;

    assert_eq!(cc.source_connection().unwrap().id, "1");
    assert_eq!(cc.destination_id().unwrap(), &ConnectionId::new("9"));
    assert_eq!(cc.remote_manager(), Some("worker"));
}

#[test]
fn state_display() {
    assert_eq!(ClientConnectionState::Healing.to_string(), "healing");
    assert_eq!(ClientConnectionState::Requesting.to_string(), "requesting");
}
