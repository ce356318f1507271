// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for daemon unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use nsm_core::{
    mechanism, Connection, ConnectionId, ConnectionState, CrossConnect, Dataplane, Endpoint,
    EndpointRegistration, Mechanism, MechanismKind, NetworkService, NetworkServiceEndpoint,
    PrefixPool,
};
use nsm_wire::{MechanismsUpdate, NetworkServiceRequest};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::dataplane::{DataplaneAdapter, DataplaneError};
use crate::endpoints::{EndpointConnector, EndpointError};

/// Dataplane agent double: records traffic, optionally refuses programs,
/// and advertises a kernel mechanism on its monitor stream.
#[derive(Default)]
pub(crate) struct RecordingDataplane {
    pub programmed: Mutex<Vec<CrossConnect>>,
    pub unprogrammed: Mutex<Vec<CrossConnect>>,
    pub survivors: Mutex<Vec<CrossConnect>>,
    pub fail_program: AtomicBool,
}

#[async_trait]
impl DataplaneAdapter for RecordingDataplane {
    async fn program(
        &self,
        _dataplane: &Dataplane,
        xcon: CrossConnect,
    ) -> Result<CrossConnect, DataplaneError> {
        if self.fail_program.load(Ordering::Relaxed) {
            return Err(DataplaneError::RequestFailed("agent says no".into()));
        }
        self.programmed.lock().push(xcon.clone());
        Ok(xcon)
    }

    async fn unprogram(
        &self,
        _dataplane: &Dataplane,
        xcon: CrossConnect,
    ) -> Result<(), DataplaneError> {
        self.unprogrammed.lock().push(xcon);
        Ok(())
    }

    async fn monitor_mechanisms(
        &self,
        _dataplane: &Dataplane,
    ) -> Result<mpsc::Receiver<MechanismsUpdate>, DataplaneError> {
        let (tx, rx) = mpsc::channel(4);
        let _ = tx
            .send(MechanismsUpdate {
                local_mechanisms: vec![Mechanism::new(MechanismKind::KernelInterface)],
                remote_mechanisms: vec![],
            })
            .await;
        // Park the sender so the stream stays open for the test's lifetime.
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
            drop(tx);
        });
        Ok(rx)
    }

    async fn existing_cross_connects(
        &self,
        _dataplane: &Dataplane,
    ) -> Result<Vec<CrossConnect>, DataplaneError> {
        Ok(self.survivors.lock().clone())
    }
}

/// Endpoint double answering like a kernel-interface NSE with a prefix
/// pool on `10.20.1.0/24`.
pub(crate) struct TestNse {
    pool: PrefixPool,
    pub requests: Mutex<Vec<NetworkServiceRequest>>,
    pub closed: Mutex<Vec<ConnectionId>>,
}

impl TestNse {
    pub fn new() -> Self {
        Self {
            pool: PrefixPool::new("10.20.1.0/24").unwrap(),
            requests: Mutex::new(Vec::new()),
            closed: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl EndpointConnector for TestNse {
    async fn request(
        &self,
        _endpoint: &Endpoint,
        request: NetworkServiceRequest,
    ) -> Result<Connection, EndpointError> {
        self.requests.lock().push(request.clone());
        let conn = request.connection;
        let extraction = self
            .pool
            .extract(conn.id.as_str(), &conn.context.extra_prefix_request)
            .map_err(|e| EndpointError::Refused(e.to_string()))?;

        let mech = Mechanism::new(MechanismKind::KernelInterface)
            .with_parameter(mechanism::NETNS_INODE, "12")
            .with_parameter(mechanism::INTERFACE_NAME, format!("nsm{}", conn.id));
        let mut context = conn.context.clone();
        context.src_ip_addr = Some(extraction.src_ip);
        context.dst_ip_addr = Some(extraction.dst_ip);
        context.extra_prefixes = extraction.extra_prefixes;

        Ok(Connection {
            id: conn.id,
            network_service: conn.network_service,
            mechanism: Some(mech),
            context,
            labels: conn.labels,
            state: ConnectionState::Up,
        })
    }

    async fn close(
        &self,
        _endpoint: &Endpoint,
        connection: Connection,
    ) -> Result<(), EndpointError> {
        self.pool.release(connection.id.as_str());
        self.closed.lock().push(connection.id);
        Ok(())
    }
}

/// A model endpoint record as registration would have produced it.
pub(crate) fn endpoint_record(name: &str, service: &str, manager: &str) -> Endpoint {
    Endpoint {
        registration: EndpointRegistration {
            service: NetworkService { name: service.to_string(), payload: "IP".to_string() },
            endpoint: NetworkServiceEndpoint {
                name: name.to_string(),
                network_service: service.to_string(),
                payload: "IP".to_string(),
                manager_name: manager.to_string(),
                labels: HashMap::new(),
            },
            manager: None,
        },
        workspace: "nsm-1".to_string(),
        socket_location: "nsm-1/client".to_string(),
    }
}

/// A full single-node assembly over fakes: model, recording dataplane,
/// test NSE, shared registry, manager, and a service context.
pub(crate) struct Fixture {
    pub model: std::sync::Arc<crate::model::Model>,
    pub adapter: std::sync::Arc<RecordingDataplane>,
    pub nse: std::sync::Arc<TestNse>,
    pub manager: std::sync::Arc<crate::manager::ConnectionManager>,
    pub registry: std::sync::Arc<dyn crate::registry::RegistryClient>,
    pub ctx: std::sync::Arc<crate::service::ServiceCtx>,
}

pub(crate) fn fixture() -> Fixture {
    use crate::registry::{SharedRegistry, SharedStorage};
    use std::sync::Arc;
    use std::time::Duration;

    let model = crate::model::Model::new();
    let adapter = Arc::new(RecordingDataplane::default());
    let nse = Arc::new(TestNse::new());
    let registry: Arc<dyn crate::registry::RegistryClient> =
        Arc::new(SharedRegistry::new(SharedStorage::new(None), "master"));
    let dataplanes =
        crate::dataplane::DataplaneCoordinator::new(Arc::clone(&model), Arc::clone(&adapter) as _);
    let restorer = crate::restore::Restorer::new(Arc::clone(&model), Arc::clone(&dataplanes));
    let manager = crate::manager::ConnectionManager::new(
        crate::manager::ManagerDeps {
            model: Arc::clone(&model),
            registry: Arc::clone(&registry),
            dataplanes,
            endpoints: Arc::clone(&nse) as _,
            peers: Arc::new(crate::peers::PeerPool::new(Duration::from_secs(1))),
            excluded: crate::prefixes::ExcludedPrefixes::default(),
        },
        nsm_core::NsmManager { name: "master".to_string(), url: "127.0.0.1:5007".to_string() },
        Duration::from_millis(300),
    );
    let ctx = Arc::new(crate::service::ServiceCtx {
        model: Arc::clone(&model),
        manager: Arc::clone(&manager),
        registry: Arc::clone(&registry),
        restorer,
        ipc_timeout: Duration::from_secs(2),
        restore_wait: Duration::from_millis(50),
    });
    Fixture { model, adapter, nse, manager, registry, ctx }
}

/// A dataplane already configured with kernel + vxlan mechanisms.
pub(crate) fn ready_dataplane(name: &str) -> Dataplane {
    Dataplane {
        registered_name: name.to_string(),
        socket_location: "tcp:some_addr".to_string(),
        local_mechanisms: vec![Mechanism::new(MechanismKind::KernelInterface)],
        remote_mechanisms: vec![Mechanism::new(MechanismKind::Vxlan)
            .with_parameter(mechanism::VXLAN_SRC_IP, "10.1.1.1")],
        mechanisms_configured: true,
    }
}
