// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-local registry: single-node deployments and in-process tests.
//!
//! Several managers can share one [`SharedStorage`]; each gets its own
//! [`SharedRegistry`] handle carrying the canonical name that storage
//! assigns to everything the handle registers.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use nsm_core::{
    generate_endpoint_name, EndpointRegistration, NetworkService, NetworkServiceEndpoint,
    NsmManager,
};
use nsm_wire::{ClusterConfiguration, FindReply, SubnetExtensionEvent};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::{RegistryClient, RegistryError};

#[derive(Default)]
struct StorageState {
    services: HashMap<String, NetworkService>,
    endpoints: HashMap<String, NetworkServiceEndpoint>,
    managers: HashMap<String, NsmManager>,
    subnet_subscribers: Vec<mpsc::Sender<SubnetExtensionEvent>>,
}

/// Registry state shared by every handle in this process.
pub struct SharedStorage {
    state: Mutex<StorageState>,
    cluster: Option<ClusterConfiguration>,
}

impl SharedStorage {
    pub fn new(cluster: Option<ClusterConfiguration>) -> Arc<Self> {
        Arc::new(Self { state: Mutex::new(StorageState::default()), cluster })
    }

    /// Push a subnet extension to every open monitor stream.
    pub fn extend_subnet(&self, event: SubnetExtensionEvent) {
        let subscribers = self.state.lock().subnet_subscribers.clone();
        for tx in subscribers {
            let _ = tx.try_send(event.clone());
        }
    }
}

/// One manager's handle onto a [`SharedStorage`].
pub struct SharedRegistry {
    storage: Arc<SharedStorage>,
    manager_name: String,
}

impl SharedRegistry {
    pub fn new(storage: Arc<SharedStorage>, manager_name: impl Into<String>) -> Self {
        Self { storage, manager_name: manager_name.into() }
    }
}

#[async_trait]
impl RegistryClient for SharedRegistry {
    async fn register_nse(
        &self,
        mut registration: EndpointRegistration,
    ) -> Result<EndpointRegistration, RegistryError> {
        let mut state = self.storage.state.lock();

        if registration.endpoint.name.is_empty() {
            registration.endpoint.name =
                generate_endpoint_name(&registration.endpoint.network_service);
        }
        registration.endpoint.manager_name = self.manager_name.clone();

        if !registration.service.name.is_empty() {
            state
                .services
                .insert(registration.service.name.clone(), registration.service.clone());
        }
        if let Some(manager) = &mut registration.manager {
            manager.name = self.manager_name.clone();
            state.managers.insert(manager.name.clone(), manager.clone());
        }
        state
            .endpoints
            .insert(registration.endpoint.name.clone(), registration.endpoint.clone());

        registration.manager = state.managers.get(&self.manager_name).cloned();
        Ok(registration)
    }

    async fn remove_nse(&self, name: &str) -> Result<(), RegistryError> {
        self.storage.state.lock().endpoints.remove(name);
        Ok(())
    }

    async fn register_nsm(&self, mut manager: NsmManager) -> Result<NsmManager, RegistryError> {
        manager.name = self.manager_name.clone();
        self.storage.state.lock().managers.insert(manager.name.clone(), manager.clone());
        Ok(manager)
    }

    async fn find_network_service(&self, name: &str) -> Result<FindReply, RegistryError> {
        let state = self.storage.state.lock();
        let mut endpoints = Vec::new();
        let mut managers = HashMap::new();
        for ep in state.endpoints.values() {
            if ep.network_service != name {
                continue;
            }
            endpoints.push(ep.clone());
            if let Some(mgr) = state.managers.get(&ep.manager_name) {
                managers.insert(mgr.name.clone(), mgr.clone());
            }
        }
        Ok(FindReply { service: state.services.get(name).cloned(), endpoints, managers })
    }

    async fn get_cluster_configuration(&self) -> Result<ClusterConfiguration, RegistryError> {
        self.storage
            .cluster
            .clone()
            .ok_or_else(|| RegistryError::Rejected("ClusterConfiguration is not supported".into()))
    }

    async fn monitor_subnets(
        &self,
    ) -> Result<mpsc::Receiver<SubnetExtensionEvent>, RegistryError> {
        let (tx, rx) = mpsc::channel(16);
        self.storage.state.lock().subnet_subscribers.push(tx);
        Ok(rx)
    }
}

#[cfg(test)]
#[path = "shared_tests.rs"]
mod tests;
