// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cluster registry clients.
//!
//! The registry is eventually consistent; reads may be stale and writes
//! become visible within a bounded delay. Callers retry around transient
//! failures and never assume read-your-writes across managers.

mod remote;
mod shared;

pub use remote::RemoteRegistry;
pub use shared::{SharedRegistry, SharedStorage};

use async_trait::async_trait;
use nsm_core::{EndpointRegistration, NsmManager};
use nsm_wire::{ClusterConfiguration, FindReply, ProtocolError, SubnetExtensionEvent};
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum RegistryError {
    /// Transient: the registry could not be reached. Retried with backoff.
    #[error("registry unavailable: {0}")]
    Unavailable(String),

    #[error("registry rejected the request: {0}")]
    Rejected(String),

    #[error("{0} not found in registry")]
    NotFound(String),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// The registry surface as consumed by the manager.
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Register or update an endpoint. The first call from a manager also
    /// registers the manager and assigns its canonical name; the returned
    /// registration carries it.
    async fn register_nse(
        &self,
        registration: EndpointRegistration,
    ) -> Result<EndpointRegistration, RegistryError>;

    async fn remove_nse(&self, name: &str) -> Result<(), RegistryError>;

    /// Register this manager's public address; returns the canonical record.
    async fn register_nsm(&self, manager: NsmManager) -> Result<NsmManager, RegistryError>;

    /// Endpoints across the cluster providing `name`, with their managers.
    async fn find_network_service(&self, name: &str) -> Result<FindReply, RegistryError>;

    async fn get_cluster_configuration(&self) -> Result<ClusterConfiguration, RegistryError>;

    /// Long-lived subnet extension stream.
    async fn monitor_subnets(
        &self,
    ) -> Result<mpsc::Receiver<SubnetExtensionEvent>, RegistryError>;
}
