// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory store of local endpoints, dataplanes, and client connections.
//!
//! The model is the single source of truth for this node and a passive
//! store: it never originates I/O. Mutations are serialized under one
//! short-held lock and published as [`ModelEvent`]s on a broadcast
//! channel, so every subscriber sees the same linearized sequence through
//! its own bounded mailbox (slow subscribers lag and lose the oldest
//! events rather than blocking the model).

use std::collections::HashMap;
use std::sync::Arc;

use nsm_core::{
    ClientConnection, ConnectionId, Dataplane, Endpoint, ModelEvent,
};
use nsm_wire::MechanismsUpdate;
use parking_lot::Mutex;
use tokio::sync::broadcast;

/// Capacity of each subscriber's event mailbox.
const EVENT_MAILBOX: usize = 256;

#[derive(Default)]
struct ModelState {
    endpoints: HashMap<String, Endpoint>,
    dataplanes: HashMap<String, Dataplane>,
    client_connections: HashMap<ConnectionId, ClientConnection>,
    next_connection_id: u64,
}

pub struct Model {
    state: Mutex<ModelState>,
    events: broadcast::Sender<ModelEvent>,
}

impl Model {
    pub fn new() -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_MAILBOX);
        Arc::new(Self { state: Mutex::new(ModelState::default()), events })
    }

    /// Subscribe to model events from this point on.
    pub fn subscribe(&self) -> broadcast::Receiver<ModelEvent> {
        self.events.subscribe()
    }

    // Events are sent while the state lock is held so subscribers observe
    // them in mutation order. broadcast::send never blocks.
    fn emit(&self, event: ModelEvent) {
        let _ = self.events.send(event);
    }

    // ── connection ids ───────────────────────────────────────────────

    /// Allocate the next connection id for this manager.
    pub fn next_connection_id(&self) -> ConnectionId {
        let mut state = self.state.lock();
        state.next_connection_id += 1;
        ConnectionId::from_counter(state.next_connection_id)
    }

    /// Keep the counter above `value`; used when restoring numeric ids.
    pub fn seed_connection_id(&self, value: u64) {
        let mut state = self.state.lock();
        state.next_connection_id = state.next_connection_id.max(value);
    }

    // ── endpoints ────────────────────────────────────────────────────

    pub fn add_endpoint(&self, endpoint: Endpoint) {
        let mut state = self.state.lock();
        state.endpoints.insert(endpoint.name().to_string(), endpoint.clone());
        self.emit(ModelEvent::EndpointAdded { endpoint });
    }

    pub fn get_endpoint(&self, name: &str) -> Option<Endpoint> {
        self.state.lock().endpoints.get(name).cloned()
    }

    pub fn delete_endpoint(&self, name: &str) -> Option<Endpoint> {
        let mut state = self.state.lock();
        let removed = state.endpoints.remove(name);
        if removed.is_some() {
            self.emit(ModelEvent::EndpointDeleted { name: name.to_string() });
        }
        removed
    }

    pub fn endpoints(&self) -> Vec<Endpoint> {
        self.state.lock().endpoints.values().cloned().collect()
    }

    pub fn endpoints_for_service(&self, service: &str) -> Vec<Endpoint> {
        self.state
            .lock()
            .endpoints
            .values()
            .filter(|e| e.service_name() == service)
            .cloned()
            .collect()
    }

    // ── dataplanes ───────────────────────────────────────────────────

    pub fn add_dataplane(&self, dataplane: Dataplane) {
        let mut state = self.state.lock();
        state.dataplanes.insert(dataplane.registered_name.clone(), dataplane.clone());
        self.emit(ModelEvent::DataplaneAdded { dataplane });
    }

    pub fn get_dataplane(&self, name: &str) -> Option<Dataplane> {
        self.state.lock().dataplanes.get(name).cloned()
    }

    pub fn delete_dataplane(&self, name: &str) -> Option<Dataplane> {
        let mut state = self.state.lock();
        let removed = state.dataplanes.remove(name);
        if removed.is_some() {
            self.emit(ModelEvent::DataplaneDeleted { name: name.to_string() });
        }
        removed
    }

    /// Apply a mechanisms-stream update. The dataplane becomes eligible for
    /// placement once it advertises at least one mechanism. The updated
    /// record is re-announced as `DataplaneAdded` so waiters blocked on a
    /// ready dataplane wake up without polling.
    pub fn update_dataplane_mechanisms(&self, name: &str, update: MechanismsUpdate) -> bool {
        let mut state = self.state.lock();
        let Some(dp) = state.dataplanes.get_mut(name) else {
            return false;
        };
        dp.local_mechanisms = update.local_mechanisms;
        dp.remote_mechanisms = update.remote_mechanisms;
        dp.mechanisms_configured =
            !dp.local_mechanisms.is_empty() || !dp.remote_mechanisms.is_empty();
        let announced = dp.clone();
        self.emit(ModelEvent::DataplaneAdded { dataplane: announced });
        true
    }

    /// First dataplane satisfying the predicate, if any.
    pub fn find_dataplane(&self, pred: impl Fn(&Dataplane) -> bool) -> Option<Dataplane> {
        let state = self.state.lock();
        let mut names: Vec<&String> = state.dataplanes.keys().collect();
        // Deterministic pick when several qualify.
        names.sort();
        names
            .into_iter()
            .filter_map(|n| state.dataplanes.get(n))
            .find(|dp| pred(dp))
            .cloned()
    }

    // ── client connections ───────────────────────────────────────────

    pub fn add_client_connection(&self, connection: ClientConnection) {
        let mut state = self.state.lock();
        state.client_connections.insert(connection.id.clone(), connection.clone());
        self.emit(ModelEvent::ClientConnectionAdded { connection });
    }

    /// Replace an existing record; no-op if it was deleted meanwhile.
    pub fn update_client_connection(&self, connection: ClientConnection) -> bool {
        let mut state = self.state.lock();
        if !state.client_connections.contains_key(&connection.id) {
            return false;
        }
        state.client_connections.insert(connection.id.clone(), connection.clone());
        self.emit(ModelEvent::ClientConnectionUpdated { connection });
        true
    }

    pub fn get_client_connection(&self, id: &ConnectionId) -> Option<ClientConnection> {
        self.state.lock().client_connections.get(id).cloned()
    }

    pub fn delete_client_connection(&self, id: &ConnectionId) -> Option<ClientConnection> {
        let mut state = self.state.lock();
        let removed = state.client_connections.remove(id);
        if removed.is_some() {
            self.emit(ModelEvent::ClientConnectionDeleted { id: id.clone() });
        }
        removed
    }

    pub fn client_connections(&self) -> Vec<ClientConnection> {
        self.state.lock().client_connections.values().cloned().collect()
    }
}

#[cfg(test)]
#[path = "model_tests.rs"]
mod tests;
