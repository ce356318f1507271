// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Two nodes: cross-node request, close of both halves, and delayed
//! dataplane mechanism configuration.

use std::time::Duration;

use nsm_core::{Dataplane, Mechanism, MechanismKind};
use nsm_daemon::registry::SharedStorage;
use nsm_wire::MechanismsUpdate;

use super::support::*;

#[tokio::test]
async fn remote_happy_path() {
    let storage = SharedStorage::new(None);
    let master = new_nsm_server(MASTER, &storage).await;
    let worker = new_nsm_server(WORKER, &storage).await;

    master.add_test_dataplane("test_data_plane", "10.1.1.1");
    worker.add_test_dataplane("test_data_plane", "10.1.1.2");
    worker.register_fake_endpoint("golden_network", "golden_networkprovider").await;

    let client = master.request_nsm_connection("nsm-1").await;
    let connection = client.request(kernel_request("golden_network")).await.unwrap();
    assert_eq!(connection.network_service, "golden_network");

    // The master's record points at the worker's client connection.
    let master_cc = master.server.model().get_client_connection(&connection.id).unwrap();
    let xcon = master_cc.xcon.clone().unwrap();
    let remote_dst = xcon.remote_destination().unwrap();
    assert_eq!(xcon.destination_manager(), Some(WORKER));

    let worker_cc = worker.server.model().get_client_connection(&remote_dst.id).unwrap();
    assert_eq!(worker_cc.requesting_manager.as_deref(), Some(MASTER));

    // The worker's dataplane holds the one cross-connect of the pair; the
    // tunnel key is present on both halves.
    assert_eq!(worker.dataplane.programmed.lock().len(), 1);
    assert!(remote_dst.mechanism.as_ref().unwrap().vni().is_some());
    assert_eq!(remote_dst.mechanism.as_ref().unwrap().kind, Some(MechanismKind::Vxlan));
}

#[tokio::test]
async fn close_removes_both_halves() {
    let storage = SharedStorage::new(None);
    let master = new_nsm_server(MASTER, &storage).await;
    let worker = new_nsm_server(WORKER, &storage).await;

    master.add_test_dataplane("test_data_plane", "10.1.1.1");
    worker.add_test_dataplane("test_data_plane", "10.1.1.2");
    worker.register_fake_endpoint("golden_network", "golden_networkprovider").await;

    let l1 = listen(&master.server);
    let client = master.request_nsm_connection("nsm-1").await;
    let connection = client.request(kernel_request("golden_network")).await.unwrap();

    let master_cc = master.server.model().get_client_connection(&connection.id).unwrap();
    let dst_id = master_cc.destination_id().unwrap().clone();
    assert!(worker.server.model().get_client_connection(&dst_id).is_some());

    client.close(connection.clone()).await.unwrap();
    l1.wait_deletes(1, Duration::from_secs(5)).await;

    assert!(master.server.model().get_client_connection(&connection.id).is_none());
    assert!(worker.server.model().get_client_connection(&dst_id).is_none());
    assert_eq!(master.dataplane.installed(), 0);
    assert_eq!(worker.dataplane.installed(), 0);
}

#[tokio::test]
async fn delayed_mechanisms_complete_a_pending_request() {
    let storage = SharedStorage::new(None);
    let master = new_nsm_server(MASTER, &storage).await;
    let worker = new_nsm_server(WORKER, &storage).await;

    master.add_test_dataplane("test_data_plane", "10.1.1.1");
    // The worker's dataplane registers with no mechanisms at all.
    worker
        .server
        .model()
        .add_dataplane(Dataplane::new("test_data_plane2", "tcp:some_addr"));
    worker.register_fake_endpoint("golden_network", "golden_networkprovider").await;

    let client = master.request_nsm_connection("nsm-1").await;
    let pending = tokio::spawn(async move {
        client.request(kernel_request("golden_network")).await
    });

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(!pending.is_finished(), "request must wait for mechanisms");

    worker.server.model().update_dataplane_mechanisms(
        "test_data_plane2",
        MechanismsUpdate {
            local_mechanisms: vec![Mechanism::new(MechanismKind::KernelInterface)],
            remote_mechanisms: vec![Mechanism::new(MechanismKind::Vxlan)
                .with_parameter(nsm_core::mechanism::VXLAN_SRC_IP, "10.1.1.2")],
        },
    );

    let connection = pending.await.unwrap().unwrap();
    assert_eq!(connection.network_service, "golden_network");
    assert_eq!(worker.dataplane.programmed.lock().len(), 1);
}
