// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One node, one dataplane, one endpoint: the local happy path.

use std::time::Duration;

use nsm_core::{ClientConnectionState, ConnectionState, MechanismKind};
use nsm_daemon::registry::SharedStorage;

use super::support::*;

#[tokio::test]
async fn local_happy_path() {
    let storage = SharedStorage::new(None);
    let node = new_nsm_server(MASTER, &storage).await;
    node.add_test_dataplane("test_data_plane", "10.1.1.1");
    node.register_fake_endpoint("golden_network", "golden_networkprovider").await;

    let client = node.request_nsm_connection("nsm-1").await;
    let connection = client.request(kernel_request("golden_network")).await.unwrap();

    assert_eq!(connection.network_service, "golden_network");
    assert_eq!(connection.mechanism.as_ref().unwrap().kind, Some(MechanismKind::KernelInterface));
    assert!(connection
        .context
        .src_ip_addr
        .as_deref()
        .unwrap()
        .starts_with("10.20.1."));
    assert!(connection
        .context
        .dst_ip_addr
        .as_deref()
        .unwrap()
        .starts_with("10.20.1."));

    // Exactly one cross-connect, both halves up.
    let programmed = node.dataplane.programmed.lock().clone();
    assert_eq!(programmed.len(), 1);
    assert_eq!(programmed[0].source.connection().state, ConnectionState::Up);
    assert_eq!(programmed[0].destination.connection().state, ConnectionState::Up);

    let cc = node.server.model().get_client_connection(&connection.id).unwrap();
    assert_eq!(cc.state, ClientConnectionState::Ready);
    assert_eq!(cc.workspace, "nsm-1");
}

#[tokio::test]
async fn request_for_unknown_service_reports_no_endpoint() {
    let storage = SharedStorage::new(None);
    let node = new_nsm_server(MASTER, &storage).await;
    node.add_test_dataplane("test_data_plane", "10.1.1.1");

    let client = node.request_nsm_connection("nsm-1").await;
    let err = client.request(kernel_request("golden_network")).await.unwrap_err();
    assert!(err.contains("golden_network"), "unexpected error: {err}");
    assert!(node.server.model().client_connections().is_empty());
}

#[tokio::test]
async fn monitor_sees_initial_state_and_close() {
    use nsm_wire::{
        next_frame, read_message, write_message, ConnectionEventKind, LocalRequest, LocalResponse,
    };
    use tokio::net::UnixStream;

    let storage = SharedStorage::new(None);
    let node = new_nsm_server(MASTER, &storage).await;
    node.add_test_dataplane("test_data_plane", "10.1.1.1");
    node.register_fake_endpoint("golden_network", "golden_networkprovider").await;

    let client = node.request_nsm_connection("nsm-1").await;
    let connection = client.request(kernel_request("golden_network")).await.unwrap();

    // Subscribe after the request: the snapshot must carry the connection.
    let workspace = node.server.workspaces().get("nsm-1").unwrap();
    let mut monitor = UnixStream::connect(workspace.server_socket()).await.unwrap();
    write_message(&mut monitor, &LocalRequest::Monitor, Duration::from_secs(1)).await.unwrap();

    let first: LocalResponse = read_message(&mut monitor, Duration::from_secs(1)).await.unwrap();
    match first {
        LocalResponse::Event { event } => {
            assert_eq!(event.kind, ConnectionEventKind::InitialStateTransfer);
            assert_eq!(event.connections.len(), 1);
            assert_eq!(event.connections[0].id, connection.id);
        }
        other => panic!("unexpected monitor frame: {other:?}"),
    }

    client.close(connection.clone()).await.unwrap();

    // Skip over update frames; the delete must arrive.
    loop {
        let frame: LocalResponse = next_frame(&mut monitor).await.unwrap();
        let LocalResponse::Event { event } = frame else {
            panic!("unexpected monitor frame")
        };
        if event.kind == ConnectionEventKind::Delete {
            assert_eq!(event.connections[0].id, connection.id);
            break;
        }
    }
}
