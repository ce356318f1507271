// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Connection healing.
//!
//! Reacts to endpoint removals, dataplane loss, remote destinations going
//! down, and lost peer managers. Per connection the machine is:
//!
//! ```text
//! READY --trigger--> HEALING_WAIT_DST --found--> RENEGOTIATE --ok--> READY
//! HEALING_WAIT_DST --timeout--> FINAL_CLOSE
//! RENEGOTIATE --err--> FINAL_CLOSE
//! ```
//!
//! The source connection id survives renegotiation; only the destination
//! half of the cross-connect is swapped. Destination-side records (created
//! on behalf of a peer) are closed instead: recovery belongs to the NSM
//! that owns the source.

use std::collections::HashSet;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use nsm_core::{
    ClientConnection, ClientConnectionState, ConnectionState, NsmManager,
};
use nsm_wire::{next_frame, ConnectionEvent, ConnectionEventKind, PeerResponse};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::manager::{selection, ConnectionManager};
use crate::model::Model;

/// How often healing re-polls the registry.
const REPLACEMENT_POLL: Duration = Duration::from_millis(100);

/// What broke.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealTrigger {
    /// Destination endpoint gone or its connection reported down.
    DstDown,
    /// Local source connection reported down.
    SrcDown,
    /// The dataplane holding the cross-connect unregistered.
    DataplaneDown,
    /// The peer manager's monitor stream was lost.
    DstManagerDown,
}

nsm_core::simple_display! {
    HealTrigger {
        DstDown => "dst_down",
        SrcDown => "src_down",
        DataplaneDown => "dataplane_down",
        DstManagerDown => "dst_manager_down",
    }
}

/// Heal deadlines; adjustable at runtime (tests shrink them).
pub struct HealTimeouts {
    dst_nse_wait: Mutex<Duration>,
    dst_manager_wait: Mutex<Duration>,
}

impl HealTimeouts {
    pub fn new(dst_nse_wait: Duration, dst_manager_wait: Duration) -> Self {
        Self {
            dst_nse_wait: Mutex::new(dst_nse_wait),
            dst_manager_wait: Mutex::new(dst_manager_wait),
        }
    }

    pub fn dst_nse_wait(&self) -> Duration {
        *self.dst_nse_wait.lock()
    }

    pub fn set_dst_nse_wait(&self, value: Duration) {
        *self.dst_nse_wait.lock() = value;
    }

    pub fn dst_manager_wait(&self) -> Duration {
        *self.dst_manager_wait.lock()
    }

    pub fn set_dst_manager_wait(&self, value: Duration) {
        *self.dst_manager_wait.lock() = value;
    }
}

pub struct Healer {
    model: Arc<Model>,
    manager: OnceLock<Arc<ConnectionManager>>,
    timeouts: HealTimeouts,
    watched_peers: Mutex<HashSet<String>>,
    cancel: CancellationToken,
}

impl Healer {
    pub fn new(model: Arc<Model>, timeouts: HealTimeouts, cancel: CancellationToken) -> Arc<Self> {
        Arc::new(Self {
            model,
            manager: OnceLock::new(),
            timeouts,
            watched_peers: Mutex::new(HashSet::new()),
            cancel,
        })
    }

    /// Late-bound manager; set once during assembly.
    pub fn bind_manager(&self, manager: Arc<ConnectionManager>) {
        let _ = self.manager.set(manager);
    }

    fn manager(&self) -> Option<Arc<ConnectionManager>> {
        self.manager.get().cloned()
    }

    pub fn timeouts(&self) -> &HealTimeouts {
        &self.timeouts
    }

    /// Follow model events and translate failures into heals.
    pub fn spawn_event_loop(self: &Arc<Self>) {
        let healer = Arc::clone(self);
        let mut events = self.model.subscribe();
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = cancel.cancelled() => break,
                    event = events.recv() => match event {
                        Ok(event) => event,
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            warn!(missed = n, "heal event loop lagged");
                            continue;
                        }
                        Err(_) => break,
                    },
                };
                match event {
                    nsm_core::ModelEvent::EndpointDeleted { name } => {
                        for cc in healer.model.client_connections() {
                            if cc.endpoint_name() == Some(name.as_str())
                                && cc.state == ClientConnectionState::Ready
                            {
                                healer.heal(cc, HealTrigger::DstDown);
                            }
                        }
                    }
                    nsm_core::ModelEvent::DataplaneDeleted { name } => {
                        for cc in healer.model.client_connections() {
                            if cc.dataplane == name && cc.state == ClientConnectionState::Ready {
                                healer.heal(cc, HealTrigger::DataplaneDown);
                            }
                        }
                    }
                    _ => {}
                }
            }
        });
    }

    /// Start healing one connection in the background.
    pub fn heal(self: &Arc<Self>, connection: ClientConnection, trigger: HealTrigger) {
        let healer = Arc::clone(self);
        tokio::spawn(async move {
            healer.run_heal(connection, trigger).await;
        });
    }

    async fn run_heal(self: Arc<Self>, cc: ClientConnection, trigger: HealTrigger) {
        let Some(manager) = self.manager() else { return };
        let id = cc.id.clone();

        // Only installed connections heal; anything else is in someone
        // else's hands already.
        let Some(mut current) = self.model.get_client_connection(&id) else { return };
        if current.state != ClientConnectionState::Ready {
            return;
        }
        info!(conn_id = %id, trigger = %trigger, "healing connection");

        // Listeners observe the DOWN transition before any replacement.
        current.state = ClientConnectionState::Healing;
        if let Some(xcon) = &mut current.xcon {
            xcon.destination.connection_mut().state = ConnectionState::Down;
        }
        self.model.update_client_connection(current.clone());

        // Destination-side half of a cross-node path: close and let the
        // source NSM renegotiate against someone else.
        if current.requesting_manager.is_some() {
            let _ = manager.close(&id).await;
            return;
        }

        let exclude: Vec<String> = match trigger {
            HealTrigger::DstDown => current.endpoint_name().map(str::to_string).into_iter().collect(),
            _ => Vec::new(),
        };

        let replacement_found = match trigger {
            HealTrigger::SrcDown => false,
            HealTrigger::DataplaneDown => true,
            HealTrigger::DstDown => {
                self.await_replacement(&current, self.timeouts.dst_nse_wait(), &exclude).await
            }
            HealTrigger::DstManagerDown => {
                self.await_replacement(&current, self.timeouts.dst_manager_wait(), &exclude).await
            }
        };

        if !replacement_found {
            warn!(conn_id = %id, trigger = %trigger, "no recovery path, closing");
            let _ = manager.close(&id).await;
            return;
        }

        match manager.renegotiate(&id, &exclude).await {
            Ok(_) => info!(conn_id = %id, "Heal: Connection recovered"),
            Err(e) => {
                warn!(conn_id = %id, error = %e, "heal renegotiation failed, closing");
                let _ = manager.close(&id).await;
            }
        }
    }

    /// Poll the registry for a usable replacement endpoint until `limit`.
    async fn await_replacement(
        &self,
        cc: &ClientConnection,
        limit: Duration,
        exclude: &[String],
    ) -> bool {
        let Some(manager) = self.manager() else { return false };
        let Some(source) = cc.source_connection().cloned() else { return false };
        let service = source.network_service.clone();
        let started = tokio::time::Instant::now();

        loop {
            match manager.registry().find_network_service(&service).await {
                Ok(reply) => {
                    if selection::choose(
                        &reply,
                        &source.labels,
                        &manager.identity().name,
                        exclude,
                    )
                    .is_some()
                    {
                        return true;
                    }
                }
                Err(e) => debug!(service = %service, error = %e, "registry poll failed"),
            }
            if started.elapsed() >= limit {
                return false;
            }
            info!(
                "Waiting for NSE with network service {}. Since elapsed: {:?}",
                service,
                started.elapsed()
            );
            tokio::time::sleep(REPLACEMENT_POLL).await;
        }
    }

    /// Keep a monitor stream open to a peer manager we depend on. Remote
    /// destination DOWN/DELETE events and stream loss both feed back into
    /// heals of the affected connections.
    pub fn watch_peer(self: &Arc<Self>, peer: NsmManager) {
        if !self.watched_peers.lock().insert(peer.name.clone()) {
            return;
        }
        let healer = Arc::clone(self);
        tokio::spawn(async move {
            healer.run_peer_watch(peer).await;
        });
    }

    async fn run_peer_watch(self: Arc<Self>, peer: NsmManager) {
        let Some(manager) = self.manager() else { return };
        let identity = manager.identity().name.clone();

        let outcome = async {
            let mut stream = manager.peers().monitor(&peer.url, &identity).await?;
            loop {
                let frame: PeerResponse = match next_frame(&mut stream).await {
                    Ok(frame) => frame,
                    Err(e) => return Err(crate::peers::PeerError::Unreachable(
                        peer.url.clone(),
                        e.to_string(),
                    )),
                };
                if let PeerResponse::Event { event } = frame {
                    self.on_peer_event(&peer, event);
                }
            }
        };

        let result: Result<(), crate::peers::PeerError> = tokio::select! {
            _ = self.cancel.cancelled() => Ok(()),
            outcome = outcome => outcome,
        };

        self.watched_peers.lock().remove(&peer.name);
        if let Err(e) = result {
            warn!(peer = %peer.name, error = %e, "peer monitor lost");
            for cc in self.model.client_connections() {
                if cc.remote_manager() == Some(peer.name.as_str())
                    && cc.state == ClientConnectionState::Ready
                {
                    self.heal(cc, HealTrigger::DstManagerDown);
                }
            }
        }
    }

    fn on_peer_event(self: &Arc<Self>, peer: &NsmManager, event: ConnectionEvent) {
        if event.kind == ConnectionEventKind::InitialStateTransfer {
            return;
        }
        for remote in &event.connections {
            let gone = event.kind == ConnectionEventKind::Delete
                || remote.state == ConnectionState::Down;
            if !gone {
                continue;
            }
            for cc in self.model.client_connections() {
                if cc.state == ClientConnectionState::Ready
                    && cc.remote_manager() == Some(peer.name.as_str())
                    && cc.destination_id() == Some(&remote.id)
                {
                    debug!(conn_id = %cc.id, remote_id = %remote.id, "remote destination lost");
                    self.heal(cc, HealTrigger::DstDown);
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "heal_tests.rs"]
mod tests;
