// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn registration(service: &str, endpoint: &str) -> EndpointRegistration {
    EndpointRegistration {
        service: NetworkService { name: service.to_string(), payload: "IP".to_string() },
        endpoint: NetworkServiceEndpoint {
            name: endpoint.to_string(),
            network_service: service.to_string(),
            payload: "IP".to_string(),
            manager_name: String::new(),
            labels: HashMap::new(),
        },
        manager: None,
    }
}

#[tokio::test]
async fn register_assigns_canonical_manager_name() {
    let storage = SharedStorage::new(None);
    let registry = SharedRegistry::new(storage, "master");

    let out = registry.register_nse(registration("golden_network", "ep1")).await.unwrap();
    assert_eq!(out.endpoint.manager_name, "master");
}

#[tokio::test]
async fn register_generates_endpoint_name_when_empty() {
    let storage = SharedStorage::new(None);
    let registry = SharedRegistry::new(storage, "master");

    let out = registry.register_nse(registration("golden_network", "")).await.unwrap();
    assert!(out.endpoint.name.starts_with("golden_network-"));
}

#[tokio::test]
async fn find_returns_endpoints_and_their_managers() {
    let storage = SharedStorage::new(None);
    let master = SharedRegistry::new(Arc::clone(&storage), "master");
    let worker = SharedRegistry::new(Arc::clone(&storage), "worker");

    worker
        .register_nsm(NsmManager { name: String::new(), url: "127.0.0.1:5007".into() })
        .await
        .unwrap();
    worker.register_nse(registration("golden_network", "ep1")).await.unwrap();
    worker.register_nse(registration("golden_network", "ep2")).await.unwrap();

    let reply = master.find_network_service("golden_network").await.unwrap();
    assert_eq!(reply.endpoints.len(), 2);
    assert_eq!(reply.managers["worker"].url, "127.0.0.1:5007");
    assert_eq!(reply.service.unwrap().name, "golden_network");
}

#[tokio::test]
async fn remove_nse_hides_endpoint_from_discovery() {
    let storage = SharedStorage::new(None);
    let registry = SharedRegistry::new(storage, "master");
    registry.register_nse(registration("golden_network", "ep1")).await.unwrap();

    registry.remove_nse("ep1").await.unwrap();
    let reply = registry.find_network_service("golden_network").await.unwrap();
    assert!(reply.endpoints.is_empty());
}

#[tokio::test]
async fn cluster_configuration_requires_seed() {
    let storage = SharedStorage::new(Some(ClusterConfiguration {
        pod_subnet: "127.0.1.0/24".into(),
        service_subnet: "127.0.2.0/24".into(),
    }));
    let registry = SharedRegistry::new(storage, "master");
    let cfg = registry.get_cluster_configuration().await.unwrap();
    assert_eq!(cfg.pod_subnet, "127.0.1.0/24");

    let none = SharedRegistry::new(SharedStorage::new(None), "master");
    assert!(none.get_cluster_configuration().await.is_err());
}

#[tokio::test]
async fn subnet_extensions_reach_subscribers() {
    let storage = SharedStorage::new(None);
    let registry = SharedRegistry::new(Arc::clone(&storage), "master");

    let mut rx = registry.monitor_subnets().await.unwrap();
    storage.extend_subnet(SubnetExtensionEvent {
        scope: nsm_wire::SubnetScope::Pod,
        prefix: "10.32.0.0/16".into(),
    });

    let event = rx.recv().await.unwrap();
    assert_eq!(event.prefix, "10.32.0.0/16");
}
