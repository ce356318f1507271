// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn add_deduplicates_and_skips_empty() {
    let prefixes = ExcludedPrefixes::new(vec!["10.20.1.0/24".to_string()]);
    prefixes.add("10.20.1.0/24");
    prefixes.add("");
    prefixes.add("127.0.1.0/24");
    assert_eq!(prefixes.snapshot(), vec!["10.20.1.0/24", "127.0.1.0/24"]);
}

#[test]
fn inject_preserves_requester_exclusions() {
    let prefixes = ExcludedPrefixes::new(vec!["127.0.1.0/24".to_string()]);
    let mut context = ConnectionContext {
        excluded_prefixes: vec!["192.168.0.0/16".to_string(), "127.0.1.0/24".to_string()],
        ..ConnectionContext::default()
    };

    prefixes.inject(&mut context);
    assert_eq!(context.excluded_prefixes, vec!["192.168.0.0/16", "127.0.1.0/24"]);
}

#[tokio::test]
async fn refresh_seeds_from_cluster_configuration() {
    use crate::registry::{RegistryClient, SharedRegistry, SharedStorage};
    use nsm_wire::ClusterConfiguration;

    let storage = SharedStorage::new(Some(ClusterConfiguration {
        pod_subnet: "127.0.1.0/24".into(),
        service_subnet: "127.0.2.0/24".into(),
    }));
    let registry: Arc<dyn RegistryClient> =
        Arc::new(SharedRegistry::new(Arc::clone(&storage), "master"));

    let prefixes = ExcludedPrefixes::default();
    let cancel = CancellationToken::new();
    prefixes.spawn_refresh(Arc::clone(&registry), cancel.clone());

    // Wait for the background task to pick up the configuration.
    for _ in 0..50 {
        if prefixes.snapshot().len() == 2 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert_eq!(prefixes.snapshot(), vec!["127.0.1.0/24", "127.0.2.0/24"]);

    storage.extend_subnet(nsm_wire::SubnetExtensionEvent {
        scope: nsm_wire::SubnetScope::Pod,
        prefix: "10.32.0.0/16".into(),
    });
    for _ in 0..50 {
        if prefixes.snapshot().len() == 3 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert!(prefixes.snapshot().contains(&"10.32.0.0/16".to_string()));
    cancel.cancel();
}
