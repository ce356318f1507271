// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Startup recovery from the dataplane's surviving cross-connects.

use std::time::Duration;

use nsm_core::{
    mechanism, Connection, ConnectionId, ConnectionSide, CrossConnect, Mechanism, MechanismKind,
};
use nsm_daemon::registry::{RegistryClient, SharedStorage};

use super::support::*;

fn local_xcon(id: &str, src: &str, dst: &str, nse: &str) -> CrossConnect {
    let source = Connection {
        id: ConnectionId::new(src),
        network_service: "ns1".to_string(),
        mechanism: Some(
            Mechanism::new(MechanismKind::KernelInterface)
                .with_parameter(mechanism::WORKSPACE, "nsm-1"),
        ),
        ..Connection::default()
    };
    let destination = Connection {
        id: ConnectionId::new(dst),
        network_service: "ns1".to_string(),
        mechanism: Some(
            Mechanism::new(MechanismKind::KernelInterface)
                .with_parameter(mechanism::WORKSPACE_NSE_NAME, nse),
        ),
        ..Connection::default()
    };
    CrossConnect::new(
        id,
        "IP",
        ConnectionSide::Local { connection: source },
        ConnectionSide::Local { connection: destination },
    )
}

#[tokio::test]
async fn restore_connection_state() {
    let storage = SharedStorage::new(None);
    let node = new_nsm_server(MASTER, &storage).await;
    node.add_test_dataplane("dp1", "10.1.1.1");

    let err = node
        .server
        .restorer()
        .wait_for_dataplane(Duration::from_millis(1))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("timeout 1ms happened"));

    node.server.restorer().restore_connections(&[], "dp1").await;
    node.server.restorer().wait_for_dataplane(Duration::from_secs(1)).await.unwrap();
}

#[tokio::test]
async fn restore_with_stale_destination_unprograms() {
    let storage = SharedStorage::new(None);
    let node = new_nsm_server(MASTER, &storage).await;
    node.add_test_dataplane("dp1", "10.1.1.1");
    // Registered in the cluster registry, but not a local endpoint.
    node.registry
        .register_nse(nsm_core::EndpointRegistration {
            service: nsm_core::NetworkService { name: "ns1".into(), payload: "IP".into() },
            endpoint: nsm_core::NetworkServiceEndpoint {
                name: "ep2".into(),
                network_service: "ns1".into(),
                payload: "IP".into(),
                manager_name: String::new(),
                labels: Default::default(),
            },
            manager: None,
        })
        .await
        .unwrap();

    let xcons = vec![local_xcon("1", "1", "2", "nse1")];
    node.server.restorer().restore_connections(&xcons, "dp1").await;

    node.server.restorer().wait_for_dataplane(Duration::from_secs(1)).await.unwrap();
    assert!(node.server.model().client_connections().is_empty());
    assert_eq!(node.dataplane.unprogrammed.lock().len(), 1);
}

#[tokio::test]
async fn restore_with_live_endpoint_replays_ready() {
    let storage = SharedStorage::new(None);
    let node = new_nsm_server(MASTER, &storage).await;
    node.add_test_dataplane("dp1", "10.1.1.1");
    node.register_fake_endpoint("ns1", "nse1").await;

    let xcons = vec![local_xcon("1", "1", "2", "nse1")];
    node.server.restorer().restore_connections(&xcons, "dp1").await;

    let ccs = node.server.model().client_connections();
    assert_eq!(ccs.len(), 1);
    assert_eq!(ccs[0].id, "1");
    assert_eq!(ccs[0].state, nsm_core::ClientConnectionState::Ready);
    assert_eq!(ccs[0].workspace, "nsm-1");
    // A fresh request after restore continues above the replayed ids.
    assert_eq!(node.server.model().next_connection_id(), "3");
}
