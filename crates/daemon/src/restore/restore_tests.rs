// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_support::{endpoint_record, RecordingDataplane};
use nsm_core::{Connection, ConnectionId, Dataplane, Mechanism, MechanismKind};

fn conn(id: &str, param: Option<(&str, &str)>) -> Connection {
    let mut mech = Mechanism::new(MechanismKind::KernelInterface);
    if let Some((key, value)) = param {
        mech = mech.with_parameter(key, value);
    }
    Connection {
        id: ConnectionId::new(id),
        network_service: "ns1".to_string(),
        mechanism: Some(mech),
        ..Connection::default()
    }
}

fn local_xcon(id: &str, src: &str, dst: &str, nse: Option<&str>) -> CrossConnect {
    CrossConnect::new(
        id,
        "IP",
        ConnectionSide::Local {
            connection: conn(src, Some((mechanism::WORKSPACE, "nsm-1"))),
        },
        ConnectionSide::Local {
            connection: conn(dst, nse.map(|n| (mechanism::WORKSPACE_NSE_NAME, n))),
        },
    )
}

fn setup() -> (Arc<Model>, Arc<RecordingDataplane>, Arc<Restorer>) {
    let model = Model::new();
    let adapter = Arc::new(RecordingDataplane::default());
    let coordinator =
        crate::dataplane::DataplaneCoordinator::new(Arc::clone(&model), Arc::clone(&adapter) as _);
    let restorer = Restorer::new(Arc::clone(&model), coordinator);
    (model, adapter, restorer)
}

#[tokio::test]
async fn wait_times_out_before_any_restore() {
    let (_model, _adapter, restorer) = setup();
    let err = restorer.wait_for_dataplane(Duration::from_millis(1)).await.unwrap_err();
    assert!(err.to_string().contains("timeout 1ms happened"));
}

#[tokio::test]
async fn empty_restore_unblocks_waiters() {
    let (_model, _adapter, restorer) = setup();
    restorer.restore_connections(&[], "dp1").await;
    restorer.wait_for_dataplane(Duration::from_secs(1)).await.unwrap();
}

#[tokio::test]
async fn unknown_destination_endpoint_is_unprogrammed() {
    let (model, adapter, restorer) = setup();
    model.add_dataplane(Dataplane::new("dp1", "tcp:some_address"));

    let xcons = vec![local_xcon("1", "1", "2", Some("nse1"))];
    restorer.restore_connections(&xcons, "dp1").await;

    restorer.wait_for_dataplane(Duration::from_secs(1)).await.unwrap();
    assert!(model.client_connections().is_empty());
    assert_eq!(adapter.unprogrammed.lock().len(), 1);
}

#[tokio::test]
async fn known_destination_endpoint_is_replayed_ready() {
    let (model, adapter, restorer) = setup();
    model.add_dataplane(Dataplane::new("dp1", "tcp:some_address"));
    model.add_endpoint(endpoint_record("nse1", "ns1", "master"));

    let xcons = vec![local_xcon("1", "1", "2", Some("nse1"))];
    restorer.restore_connections(&xcons, "dp1").await;

    let ccs = model.client_connections();
    assert_eq!(ccs.len(), 1);
    assert_eq!(ccs[0].state, ClientConnectionState::Ready);
    assert_eq!(ccs[0].dataplane, "dp1");
    assert_eq!(ccs[0].workspace, "nsm-1");
    assert!(adapter.unprogrammed.lock().is_empty());

    // Restored numeric ids keep the counter ahead.
    assert_eq!(model.next_connection_id(), "3");
}
