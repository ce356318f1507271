// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Remote endpoint failure: the source NSM renegotiates onto the second
//! endpoint while preserving the client-facing connection id.

use std::time::Duration;

use nsm_daemon::registry::{RegistryClient, SharedStorage};

use super::support::*;

const TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::test]
async fn heal_remote_nse() {
    let storage = SharedStorage::new(None);
    let master = new_nsm_server(MASTER, &storage).await;
    let worker = new_nsm_server(WORKER, &storage).await;

    master.add_test_dataplane("test_data_plane", "10.1.1.1");
    worker.add_test_dataplane("test_data_plane", "10.1.1.2");

    worker.register_fake_endpoint("golden_network", "ep1").await;
    worker.register_fake_endpoint("golden_network", "ep2").await;

    let l1 = listen(&master.server);
    let client = master.request_nsm_connection("nsm-1").await;
    let connection = client.request(kernel_request("golden_network")).await.unwrap();
    assert_eq!(connection.id, "1");

    // One add (REQUESTING) and one update (READY) for the initial request.
    l1.wait_adds(1, TIMEOUT).await;
    l1.wait_updates(1, TIMEOUT).await;

    let master_cc = master.server.model().get_client_connection(&connection.id).unwrap();
    let old_dst = master_cc.destination_id().unwrap().clone();
    assert_eq!(old_dst, "1");
    assert_eq!(master_cc.endpoint_name(), Some("ep1"));

    // Shrink the heal window, then take ep1 away: registry first, local
    // model second. The worker's healer closes its half; the master's
    // peer monitor picks the loss up and renegotiates onto ep2.
    master
        .server
        .healer()
        .timeouts()
        .set_dst_nse_wait(Duration::from_secs(1));
    master.registry.remove_nse("ep1").await.unwrap();
    worker.server.model().delete_endpoint("ep1");

    // The DOWN transition and the destination swap are both observed.
    l1.wait_updates(3, TIMEOUT).await;

    let healed = wait_for(TIMEOUT, || {
        master
            .server
            .model()
            .get_client_connection(&connection.id)
            .and_then(|cc| cc.destination_id().cloned())
            .map(|dst| dst != old_dst)
            .unwrap_or(false)
    })
    .await;
    assert!(healed, "destination was not swapped");

    let recovered = master.server.model().get_client_connection(&connection.id).unwrap();
    assert_eq!(recovered.id, "1", "source id must survive the heal");
    assert_eq!(recovered.endpoint_name(), Some("ep2"));
    assert_eq!(recovered.destination_id().unwrap(), &nsm_core::ConnectionId::new("3"));
}

async fn wait_for(limit: Duration, check: impl Fn() -> bool) -> bool {
    let started = tokio::time::Instant::now();
    while started.elapsed() < limit {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}
