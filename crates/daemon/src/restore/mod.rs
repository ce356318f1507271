// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Crash recovery from the dataplane's surviving cross-connects.
//!
//! There is no durable database: on restart the dataplane agent is the
//! only witness of what was installed. Each surviving cross-connect whose
//! destination still maps to a known local endpoint is replayed into the
//! model as a READY client connection; anything stale is unprogrammed.

use std::sync::Arc;
use std::time::Duration;

use nsm_core::{
    mechanism, ClientConnection, ClientConnectionState, ConnectionSide, CrossConnect,
};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::dataplane::DataplaneCoordinator;
use crate::model::Model;

/// Ceiling for unprogramming one stale cross-connect.
const UNPROGRAM_DEADLINE: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum RestoreError {
    #[error("Failed to wait for NSMD state restore, timeout {0:?} happened")]
    Timeout(Duration),
}

pub struct Restorer {
    model: Arc<Model>,
    dataplanes: Arc<DataplaneCoordinator>,
    restored_tx: watch::Sender<bool>,
    restored_rx: watch::Receiver<bool>,
}

impl Restorer {
    pub fn new(model: Arc<Model>, dataplanes: Arc<DataplaneCoordinator>) -> Arc<Self> {
        let (restored_tx, restored_rx) = watch::channel(false);
        Arc::new(Self { model, dataplanes, restored_tx, restored_rx })
    }

    /// Replay one dataplane's surviving cross-connects into the model.
    /// Returns the reconstructed records so the caller can bring their
    /// workspaces back up.
    pub async fn restore_connections(
        &self,
        xcons: &[CrossConnect],
        dataplane: &str,
    ) -> Vec<ClientConnection> {
        let mut restored = Vec::new();
        for xcon in xcons {
            if let Some(stale) = self.stale_reason(xcon) {
                warn!(xcon_id = %xcon.id, reason = %stale, "stale cross-connect, unprogramming");
                if let Err(e) = self
                    .dataplanes
                    .unprogram(dataplane, xcon.clone(), UNPROGRAM_DEADLINE)
                    .await
                {
                    warn!(xcon_id = %xcon.id, error = %e, "unprogram of stale cross-connect failed");
                }
                continue;
            }
            restored.push(self.replay(xcon.clone(), dataplane));
        }
        let _ = self.restored_tx.send(true);
        info!(dataplane, restored = restored.len(), "state restore finished");
        restored
    }

    /// A cross-connect is stale when its local destination names an
    /// endpoint this node no longer knows.
    fn stale_reason(&self, xcon: &CrossConnect) -> Option<String> {
        let destination = xcon.local_destination()?;
        let nse = destination
            .mechanism
            .as_ref()
            .and_then(|m| m.parameter(mechanism::WORKSPACE_NSE_NAME));
        match nse {
            Some(name) if self.model.get_endpoint(name).is_some() => None,
            Some(name) => Some(format!("endpoint {name} is no longer registered")),
            None => Some("destination carries no endpoint reference".to_string()),
        }
    }

    fn replay(&self, xcon: CrossConnect, dataplane: &str) -> ClientConnection {
        let source_id = xcon.source.connection().id.clone();

        // Keep the id counter ahead of everything we restore.
        for value in [&source_id, xcon.destination_id()]
            .into_iter()
            .filter_map(|id| id.counter_value())
        {
            self.model.seed_connection_id(value);
        }

        let endpoint = xcon
            .local_destination()
            .and_then(|d| d.mechanism.as_ref())
            .and_then(|m| m.parameter(mechanism::WORKSPACE_NSE_NAME))
            .and_then(|name| self.model.get_endpoint(name));

        // The owning client's workspace was stamped onto the source
        // mechanism at install time; destination-side halves of remote
        // paths legitimately have none.
        let workspace = xcon
            .local_source()
            .and_then(|s| s.mechanism.as_ref())
            .and_then(|m| m.parameter(mechanism::WORKSPACE))
            .unwrap_or_default()
            .to_string();

        let requesting_manager = match &xcon.source {
            ConnectionSide::Remote { manager_name, .. } => Some(manager_name.clone()),
            ConnectionSide::Local { .. } => None,
        };

        info!(conn_id = %source_id, xcon_id = %xcon.id, workspace = %workspace, "restoring client connection");
        let connection = ClientConnection {
            id: source_id,
            workspace,
            xcon: Some(xcon),
            endpoint,
            dataplane: dataplane.to_string(),
            requesting_manager,
            state: ClientConnectionState::Ready,
        };
        self.model.add_client_connection(connection.clone());
        connection
    }

    /// Block until restore has run at least once, or `limit` expires.
    pub async fn wait_for_dataplane(&self, limit: Duration) -> Result<(), RestoreError> {
        let mut rx = self.restored_rx.clone();
        if *rx.borrow() {
            return Ok(());
        }
        tokio::time::timeout(limit, async {
            while !*rx.borrow_and_update() {
                if rx.changed().await.is_err() {
                    break;
                }
            }
        })
        .await
        .map_err(|_| RestoreError::Timeout(limit))
    }
}

#[cfg(test)]
#[path = "restore_tests.rs"]
mod tests;
