// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn timeouts_are_adjustable_at_runtime() {
    let timeouts = HealTimeouts::new(Duration::from_secs(5), Duration::from_secs(30));
    assert_eq!(timeouts.dst_nse_wait(), Duration::from_secs(5));

    timeouts.set_dst_nse_wait(Duration::from_secs(1));
    timeouts.set_dst_manager_wait(Duration::from_secs(60));
    assert_eq!(timeouts.dst_nse_wait(), Duration::from_secs(1));
    assert_eq!(timeouts.dst_manager_wait(), Duration::from_secs(60));
}

#[yare::parameterized(
    dst = { HealTrigger::DstDown, "dst_down" },
    src = { HealTrigger::SrcDown, "src_down" },
    dataplane = { HealTrigger::DataplaneDown, "dataplane_down" },
    manager = { HealTrigger::DstManagerDown, "dst_manager_down" },
)]
fn trigger_display(trigger: HealTrigger, expected: &str) {
    assert_eq!(trigger.to_string(), expected);
}

#[tokio::test]
async fn heal_without_bound_manager_is_inert() {
    let model = Model::new();
    let healer = Healer::new(
        Arc::clone(&model),
        HealTimeouts::new(Duration::from_millis(10), Duration::from_millis(10)),
        CancellationToken::new(),
    );

    let id = model.next_connection_id();
    let cc = ClientConnection::requesting(id.clone(), "nsm-1");
    model.add_client_connection(cc.clone());

    healer.heal(cc, HealTrigger::DstDown);
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Nothing touched the record.
    assert_eq!(
        model.get_client_connection(&id).unwrap().state,
        ClientConnectionState::Requesting
    );
}
