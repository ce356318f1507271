// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The per-connection state machine.
//!
//! One Request: select an endpoint through the registry, wait for a ready
//! dataplane, negotiate mechanisms, invoke the endpoint (same node) or the
//! peer NSM (cross-node), install the cross-connect, record the result in
//! the model. Close unwinds the same steps. Request completion, Close, and
//! Heal for one connection id are mutually exclusive through a
//! per-connection async lock; the model lock is never held across awaits.

pub(crate) mod selection;
mod vni;

pub use vni::VniAllocator;

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use nsm_core::{
    mechanism, negotiate, ClientConnection, ClientConnectionState, Connection, ConnectionContext,
    ConnectionId, ConnectionSide, ConnectionState, CrossConnect, Endpoint, EndpointRegistration,
    Mechanism, MechanismKind, NsmManager,
};
use nsm_wire::{NetworkServiceRequest, RemoteServiceRequest};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, warn};

use crate::dataplane::DataplaneCoordinator;
use crate::endpoints::EndpointConnector;
use crate::heal::Healer;
use crate::model::Model;
use crate::peers::{PeerError, PeerPool};
use crate::prefixes::ExcludedPrefixes;
use crate::registry::{RegistryClient, RegistryError};

/// Ceiling for one endpoint invocation.
const ENDPOINT_DEADLINE: Duration = Duration::from_secs(60);
/// Ceiling for one dataplane program/unprogram call.
const PROGRAM_DEADLINE: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum RequestError {
    #[error("network service {0} has no matching endpoints")]
    NoEndpoint(String),

    #[error("no dataplane became ready within {0:?}")]
    NoDataplane(Duration),

    #[error("no mechanism overlap with dataplane {0}")]
    MechanismMismatch(String),

    #[error("endpoint {0} refused the request: {1}")]
    EndpointRefused(String, String),

    #[error("peer NSM at {0} unreachable: {1}")]
    PeerUnreachable(String, String),

    #[error("cross-connect install failed: {0}")]
    DataplaneProgramFailed(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("connection {0} not found")]
    NotFound(ConnectionId),
}

/// Collaborators the manager drives.
pub struct ManagerDeps {
    pub model: Arc<Model>,
    pub registry: Arc<dyn RegistryClient>,
    pub dataplanes: Arc<DataplaneCoordinator>,
    pub endpoints: Arc<dyn EndpointConnector>,
    pub peers: Arc<PeerPool>,
    pub excluded: ExcludedPrefixes,
}

pub struct ConnectionManager {
    model: Arc<Model>,
    registry: Arc<dyn RegistryClient>,
    dataplanes: Arc<DataplaneCoordinator>,
    endpoints: Arc<dyn EndpointConnector>,
    peers: Arc<PeerPool>,
    excluded: ExcludedPrefixes,
    vni: VniAllocator,
    identity: NsmManager,
    dataplane_wait: Duration,
    locks: Mutex<HashMap<ConnectionId, Arc<tokio::sync::Mutex<()>>>>,
    healer: OnceLock<Arc<Healer>>,
}

impl ConnectionManager {
    pub fn new(deps: ManagerDeps, identity: NsmManager, dataplane_wait: Duration) -> Arc<Self> {
        Arc::new(Self {
            model: deps.model,
            registry: deps.registry,
            dataplanes: deps.dataplanes,
            endpoints: deps.endpoints,
            peers: deps.peers,
            excluded: deps.excluded,
            vni: VniAllocator::new(),
            identity,
            dataplane_wait,
            locks: Mutex::new(HashMap::new()),
            healer: OnceLock::new(),
        })
    }

    /// Late-bound healer; set once during assembly.
    pub fn bind_healer(&self, healer: Arc<Healer>) {
        let _ = self.healer.set(healer);
    }

    pub fn healer(&self) -> Option<Arc<Healer>> {
        self.healer.get().cloned()
    }

    pub fn identity(&self) -> &NsmManager {
        &self.identity
    }

    pub fn model(&self) -> &Arc<Model> {
        &self.model
    }

    pub(crate) fn registry(&self) -> &Arc<dyn RegistryClient> {
        &self.registry
    }

    pub(crate) fn peers(&self) -> &Arc<PeerPool> {
        &self.peers
    }

    async fn lock_for(&self, id: &ConnectionId) -> OwnedMutexGuard<()> {
        let lock = Arc::clone(self.locks.lock().entry(id.clone()).or_default());
        lock.lock_owned().await
    }

    fn drop_lock(&self, id: &ConnectionId) {
        self.locks.lock().remove(id);
    }

    // ── request (source side) ────────────────────────────────────────

    /// Serve a local client's request end to end.
    pub async fn request(
        &self,
        workspace: &str,
        request: &NetworkServiceRequest,
    ) -> Result<Connection, RequestError> {
        let id = self.model.next_connection_id();
        let _guard = self.lock_for(&id).await;
        info!(conn_id = %id, service = %request.connection.network_service, workspace, "requesting network service");

        self.model.add_client_connection(ClientConnection::requesting(id.clone(), workspace));
        match self.establish(&id, workspace, request, &[]).await {
            Ok(connection) => Ok(connection),
            Err(e) => {
                self.model.delete_client_connection(&id);
                self.drop_lock(&id);
                Err(e)
            }
        }
    }

    /// Steps 1–5 of the request state machine for the source half. Reused
    /// by healing with a preserved connection id and an exclusion list.
    pub(crate) async fn establish(
        &self,
        id: &ConnectionId,
        workspace: &str,
        request: &NetworkServiceRequest,
        exclude: &[String],
    ) -> Result<Connection, RequestError> {
        let service = request.connection.network_service.clone();

        // 1. Endpoint selection.
        let reply = self.registry.find_network_service(&service).await?;
        let selected =
            selection::choose(&reply, &request.connection.labels, &self.identity.name, exclude)
                .ok_or_else(|| RequestError::NoEndpoint(service.clone()))?;
        let remote = !selected.is_local;
        debug!(conn_id = %id, endpoint = %selected.endpoint.name, remote, "endpoint selected");

        // 2. Dataplane selection & wait. The source half always needs a
        // local mechanism; a cross-node path needs a remote one on top.
        let dp = self
            .dataplanes
            .wait_for_any(self.dataplane_wait, |d| {
                d.mechanisms_configured
                    && !d.local_mechanisms.is_empty()
                    && (!remote || !d.remote_mechanisms.is_empty())
            })
            .await
            .map_err(|_| RequestError::NoDataplane(self.dataplane_wait))?;

        // 3. Mechanism negotiation for the source side.
        let source_mechanism = negotiate(&request.mechanism_preferences, &dp.local_mechanisms)
            .ok_or_else(|| RequestError::MechanismMismatch(dp.registered_name.clone()))?;

        let mut context = request.connection.context.clone();
        self.excluded.inject(&mut context);

        // 4. Endpoint invocation, local or through the peer manager.
        let payload = reply.service.as_ref().map(|s| s.payload.clone()).unwrap_or_default();
        let (destination, endpoint_record, allocated_vni) = if selected.is_local {
            let endpoint_record = self
                .model
                .get_endpoint(&selected.endpoint.name)
                .ok_or_else(|| RequestError::NoEndpoint(service.clone()))?;
            let dst = self
                .invoke_endpoint(&endpoint_record, &service, &context, &request.connection.labels, &dp.local_mechanisms)
                .await?;
            (ConnectionSide::Local { connection: dst }, endpoint_record, None)
        } else {
            // Manager presence is guaranteed by selection for remote picks.
            let manager = selected
                .manager
                .clone()
                .ok_or_else(|| RequestError::NoEndpoint(service.clone()))?;
            let mut remote_mechanism =
                negotiate(&[Mechanism::new(MechanismKind::Vxlan)], &dp.remote_mechanisms)
                    .ok_or_else(|| RequestError::MechanismMismatch(dp.registered_name.clone()))?;
            let vni = self.vni.allocate();
            remote_mechanism
                .parameters
                .insert(mechanism::VXLAN_VNI.to_string(), vni.to_string());

            let remote_request = RemoteServiceRequest {
                request: NetworkServiceRequest {
                    connection: Connection {
                        network_service: service.clone(),
                        context: context.clone(),
                        labels: request.connection.labels.clone(),
                        ..Connection::default()
                    },
                    mechanism_preferences: vec![remote_mechanism],
                },
                requesting_manager: self.identity.clone(),
                endpoint_name: selected.endpoint.name.clone(),
            };
            let dst = match self.peers.request(&manager.url, remote_request).await {
                Ok(dst) => dst,
                Err(e) => {
                    self.vni.release(vni);
                    return Err(match e {
                        PeerError::Unreachable(url, reason) => {
                            RequestError::PeerUnreachable(url, reason)
                        }
                        PeerError::Rejected(_, reason) => {
                            RequestError::EndpointRefused(selected.endpoint.name.clone(), reason)
                        }
                    });
                }
            };
            let endpoint_record = Endpoint {
                registration: EndpointRegistration {
                    service: reply.service.clone().unwrap_or_default(),
                    endpoint: selected.endpoint.clone(),
                    manager: Some(manager.clone()),
                },
                workspace: String::new(),
                socket_location: String::new(),
            };
            (
                ConnectionSide::Remote { connection: dst, manager_name: manager.name.clone() },
                endpoint_record,
                Some(vni),
            )
        };

        // The source half mirrors the addresses the endpoint allocated.
        let mut source = Self::source_from(
            id,
            &service,
            source_mechanism,
            &context,
            &request.connection.labels,
            destination.connection(),
        );
        // The dataplane inventory is all that survives a restart; the
        // owning workspace rides along on the source mechanism.
        if !workspace.is_empty() {
            if let Some(m) = &mut source.mechanism {
                m.parameters
                    .entry(mechanism::WORKSPACE.to_string())
                    .or_insert_with(|| workspace.to_string());
            }
        }

        // 5. Cross-connect install.
        let xcon = CrossConnect::new(id.as_str(), payload, ConnectionSide::Local { connection: source }, destination);
        let programmed = match self.dataplanes.program(&dp.registered_name, xcon.clone(), PROGRAM_DEADLINE).await
        {
            Ok(programmed) => programmed,
            Err(e) => {
                warn!(conn_id = %id, error = %e, "cross-connect install failed, unwinding");
                self.teardown_destination(&endpoint_record, &xcon).await;
                if let Some(vni) = allocated_vni {
                    self.vni.release(vni);
                }
                return Err(RequestError::DataplaneProgramFailed(e.to_string()));
            }
        };

        let mut cc = self
            .model
            .get_client_connection(id)
            .unwrap_or_else(|| ClientConnection::requesting(id.clone(), workspace));
        cc.workspace = workspace.to_string();
        cc.xcon = Some(programmed.clone());
        cc.endpoint = Some(endpoint_record);
        cc.dataplane = dp.registered_name.clone();
        cc.state = ClientConnectionState::Ready;
        if !self.model.update_client_connection(cc.clone()) {
            self.model.add_client_connection(cc);
        }

        if remote {
            if let (Some(healer), Some(manager)) = (self.healer(), selected.manager) {
                healer.watch_peer(manager);
            }
        }

        info!(conn_id = %id, dataplane = %dp.registered_name, "connection ready");
        Ok(programmed.source.connection().clone())
    }

    // ── request (destination side of a cross-node path) ──────────────

    /// Serve a peer NSM's request for the destination half.
    pub async fn request_remote(
        &self,
        request: RemoteServiceRequest,
    ) -> Result<Connection, RequestError> {
        let id = self.model.next_connection_id();
        let _guard = self.lock_for(&id).await;
        info!(conn_id = %id, peer = %request.requesting_manager.name, endpoint = %request.endpoint_name, "incoming remote request");

        let mut cc = ClientConnection::requesting(id.clone(), "");
        cc.requesting_manager = Some(request.requesting_manager.name.clone());
        self.model.add_client_connection(cc);

        match self.establish_remote_half(&id, &request).await {
            Ok(connection) => Ok(connection),
            Err(e) => {
                self.model.delete_client_connection(&id);
                self.drop_lock(&id);
                Err(e)
            }
        }
    }

    async fn establish_remote_half(
        &self,
        id: &ConnectionId,
        request: &RemoteServiceRequest,
    ) -> Result<Connection, RequestError> {
        let service = request.request.connection.network_service.clone();
        let endpoint_record = self
            .model
            .get_endpoint(&request.endpoint_name)
            .ok_or_else(|| RequestError::NoEndpoint(service.clone()))?;

        // Destination side needs both sets: a remote mechanism facing the
        // peer and a local one facing the endpoint.
        let dp = self
            .dataplanes
            .wait_for_any(self.dataplane_wait, |d| {
                d.mechanisms_configured
                    && !d.local_mechanisms.is_empty()
                    && !d.remote_mechanisms.is_empty()
            })
            .await
            .map_err(|_| RequestError::NoDataplane(self.dataplane_wait))?;

        let mut remote_mechanism =
            negotiate(&request.request.mechanism_preferences, &dp.remote_mechanisms)
                .ok_or_else(|| RequestError::MechanismMismatch(dp.registered_name.clone()))?;
        // This node terminates the tunnel; advertise its endpoint address.
        if remote_mechanism.parameter(mechanism::VXLAN_DST_IP).is_none() {
            let terminator = dp
                .remote_mechanisms
                .iter()
                .find(|m| m.kind == remote_mechanism.kind)
                .and_then(|m| m.parameter(mechanism::VXLAN_SRC_IP))
                .map(str::to_string);
            if let Some(ip) = terminator {
                remote_mechanism.parameters.insert(mechanism::VXLAN_DST_IP.to_string(), ip);
            }
        }

        let mut context = request.request.connection.context.clone();
        self.excluded.inject(&mut context);

        let dst = self
            .invoke_endpoint(
                &endpoint_record,
                &service,
                &context,
                &request.request.connection.labels,
                &dp.local_mechanisms,
            )
            .await?;

        let source = Self::source_from(
            id,
            &service,
            remote_mechanism,
            &context,
            &request.request.connection.labels,
            &dst,
        );

        let payload = endpoint_record.registration.service.payload.clone();
        let xcon = CrossConnect::new(
            id.as_str(),
            payload,
            ConnectionSide::Remote {
                connection: source,
                manager_name: request.requesting_manager.name.clone(),
            },
            ConnectionSide::Local { connection: dst },
        );
        let programmed = match self
            .dataplanes
            .program(&dp.registered_name, xcon.clone(), PROGRAM_DEADLINE)
            .await
        {
            Ok(programmed) => programmed,
            Err(e) => {
                self.teardown_destination(&endpoint_record, &xcon).await;
                return Err(RequestError::DataplaneProgramFailed(e.to_string()));
            }
        };

        let mut cc = self
            .model
            .get_client_connection(id)
            .ok_or_else(|| RequestError::NotFound(id.clone()))?;
        cc.xcon = Some(programmed.clone());
        cc.endpoint = Some(endpoint_record);
        cc.dataplane = dp.registered_name.clone();
        cc.state = ClientConnectionState::Ready;
        self.model.update_client_connection(cc);

        Ok(programmed.source.connection().clone())
    }

    /// Invoke a local endpoint with a fresh destination connection id.
    async fn invoke_endpoint(
        &self,
        endpoint: &Endpoint,
        service: &str,
        context: &ConnectionContext,
        labels: &HashMap<String, String>,
        local_mechanisms: &[Mechanism],
    ) -> Result<Connection, RequestError> {
        let dst_id = self.model.next_connection_id();
        let nse_request = NetworkServiceRequest {
            connection: Connection {
                id: dst_id,
                network_service: service.to_string(),
                mechanism: None,
                context: context.clone(),
                labels: labels.clone(),
                state: ConnectionState::Up,
            },
            mechanism_preferences: local_mechanisms.to_vec(),
        };

        let refused =
            |reason: String| RequestError::EndpointRefused(endpoint.name().to_string(), reason);
        let mut dst =
            tokio::time::timeout(ENDPOINT_DEADLINE, self.endpoints.request(endpoint, nse_request))
                .await
                .map_err(|_| refused(format!("no answer within {ENDPOINT_DEADLINE:?}")))?
                .map_err(|e| refused(e.to_string()))?;
        dst.is_complete().map_err(|e| refused(e.to_string()))?;

        // Stamp the serving endpoint so a restored cross-connect can be
        // matched back to it.
        if let Some(m) = &mut dst.mechanism {
            m.parameters
                .entry(mechanism::WORKSPACE_NSE_NAME.to_string())
                .or_insert_with(|| endpoint.name().to_string());
        }
        Ok(dst)
    }

    fn source_from(
        id: &ConnectionId,
        service: &str,
        mechanism: Mechanism,
        requested: &ConnectionContext,
        labels: &HashMap<String, String>,
        destination: &Connection,
    ) -> Connection {
        Connection {
            id: id.clone(),
            network_service: service.to_string(),
            mechanism: Some(mechanism),
            context: ConnectionContext {
                src_ip_addr: destination.context.src_ip_addr.clone(),
                dst_ip_addr: destination.context.dst_ip_addr.clone(),
                src_ip_required: requested.src_ip_required,
                dst_ip_required: requested.dst_ip_required,
                extra_prefix_request: requested.extra_prefix_request.clone(),
                extra_prefixes: destination.context.extra_prefixes.clone(),
                excluded_prefixes: requested.excluded_prefixes.clone(),
            },
            labels: labels.clone(),
            state: ConnectionState::Up,
        }
    }

    // ── close ────────────────────────────────────────────────────────

    /// Close a connection and remove every trace of it. Idempotent.
    pub async fn close(&self, id: &ConnectionId) -> Result<(), RequestError> {
        if self.model.get_client_connection(id).is_none() {
            return Ok(());
        }
        let _guard = self.lock_for(id).await;
        let Some(mut cc) = self.model.get_client_connection(id) else {
            return Ok(());
        };
        if matches!(cc.state, ClientConnectionState::Closing | ClientConnectionState::Closed) {
            return Ok(());
        }
        info!(conn_id = %id, "closing connection");
        cc.state = ClientConnectionState::Closing;
        self.model.update_client_connection(cc.clone());

        if let Some(xcon) = cc.xcon.clone() {
            if let Err(e) =
                self.dataplanes.unprogram(&cc.dataplane, xcon.clone(), PROGRAM_DEADLINE).await
            {
                warn!(conn_id = %id, error = %e, "unprogram failed during close");
            }
            if let Some(endpoint) = &cc.endpoint {
                self.teardown_destination(endpoint, &xcon).await;
            }
        }

        self.model.delete_client_connection(id);
        self.drop_lock(id);
        Ok(())
    }

    /// Release the destination half: close the endpoint or the peer's
    /// connection and return the tunnel key. Best-effort; failures are
    /// logged, never propagated.
    pub(crate) async fn teardown_destination(&self, endpoint: &Endpoint, xcon: &CrossConnect) {
        match &xcon.destination {
            ConnectionSide::Local { connection } => {
                let outcome = tokio::time::timeout(
                    ENDPOINT_DEADLINE,
                    self.endpoints.close(endpoint, connection.clone()),
                )
                .await;
                if let Ok(Err(e)) = outcome {
                    debug!(endpoint = %endpoint.name(), error = %e, "endpoint close failed");
                }
            }
            ConnectionSide::Remote { connection, manager_name } => {
                let url = endpoint.registration.manager.as_ref().map(|m| m.url.clone());
                if let Some(url) = url {
                    if let Err(e) = self.peers.close(&url, connection.id.clone()).await {
                        debug!(peer = %manager_name, error = %e, "peer close failed");
                    }
                }
                if let Some(vni) = connection.mechanism.as_ref().and_then(Mechanism::vni) {
                    self.vni.release(vni);
                }
            }
        }
    }

    // ── healing support ──────────────────────────────────────────────

    /// Re-run endpoint selection and installation for an existing
    /// connection, preserving the source id and mechanism but swapping the
    /// destination half.
    pub(crate) async fn renegotiate(
        &self,
        id: &ConnectionId,
        exclude: &[String],
    ) -> Result<Connection, RequestError> {
        let _guard = self.lock_for(id).await;
        let cc = self
            .model
            .get_client_connection(id)
            .ok_or_else(|| RequestError::NotFound(id.clone()))?;
        let xcon = cc.xcon.clone().ok_or_else(|| RequestError::NotFound(id.clone()))?;

        // Tear down the failed destination before rebuilding.
        if let Err(e) =
            self.dataplanes.unprogram(&cc.dataplane, xcon.clone(), PROGRAM_DEADLINE).await
        {
            debug!(conn_id = %id, error = %e, "unprogram of failed cross-connect");
        }
        if let Some(endpoint) = &cc.endpoint {
            self.teardown_destination(endpoint, &xcon).await;
        }

        let source = xcon.source.connection().clone();
        let request = NetworkServiceRequest {
            connection: Connection {
                network_service: source.network_service.clone(),
                context: ConnectionContext {
                    src_ip_required: source.context.src_ip_required,
                    dst_ip_required: source.context.dst_ip_required,
                    extra_prefix_request: source.context.extra_prefix_request.clone(),
                    ..ConnectionContext::default()
                },
                labels: source.labels.clone(),
                ..Connection::default()
            },
            mechanism_preferences: source.mechanism.clone().into_iter().collect(),
        };
        self.establish(id, &cc.workspace, &request, exclude).await
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
