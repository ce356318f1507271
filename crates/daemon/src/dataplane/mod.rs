// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dataplane coordination.
//!
//! Tracks registered dataplane agents, follows their mechanism streams,
//! answers "give me a ready dataplane" with a bounded wait, and dispatches
//! cross-connect program/unprogram calls through the adapter seam.

mod wire_adapter;

pub use wire_adapter::WireDataplane;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use nsm_core::{CrossConnect, Dataplane, ModelEvent};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::model::Model;
use nsm_wire::MechanismsUpdate;

#[derive(Debug, Error)]
pub enum DataplaneError {
    #[error("dataplane {0} is not registered")]
    NotRegistered(String),

    #[error("dataplane request failed: {0}")]
    RequestFailed(String),

    #[error("dataplane request timed out after {0:?}")]
    Timeout(Duration),
}

/// Seam to a dataplane agent.
#[async_trait]
pub trait DataplaneAdapter: Send + Sync {
    async fn program(
        &self,
        dataplane: &Dataplane,
        xcon: CrossConnect,
    ) -> Result<CrossConnect, DataplaneError>;

    async fn unprogram(
        &self,
        dataplane: &Dataplane,
        xcon: CrossConnect,
    ) -> Result<(), DataplaneError>;

    /// Mechanism updates for the agent; the stream ends when the agent
    /// disconnects.
    async fn monitor_mechanisms(
        &self,
        dataplane: &Dataplane,
    ) -> Result<mpsc::Receiver<MechanismsUpdate>, DataplaneError>;

    /// Cross-connects that survived in the agent across an NSM restart.
    async fn existing_cross_connects(
        &self,
        dataplane: &Dataplane,
    ) -> Result<Vec<CrossConnect>, DataplaneError>;
}

pub struct DataplaneCoordinator {
    model: Arc<Model>,
    adapter: Arc<dyn DataplaneAdapter>,
}

impl DataplaneCoordinator {
    pub fn new(model: Arc<Model>, adapter: Arc<dyn DataplaneAdapter>) -> Arc<Self> {
        Arc::new(Self { model, adapter })
    }

    /// Record a newly announced agent and follow its mechanisms stream.
    /// Returns the cross-connects the agent still holds, for the restorer.
    pub async fn register(
        &self,
        name: &str,
        socket_location: &str,
        cancel: CancellationToken,
    ) -> Result<Vec<CrossConnect>, DataplaneError> {
        let dataplane = Dataplane::new(name, socket_location);
        info!(dataplane = name, socket = socket_location, "dataplane registered");
        self.model.add_dataplane(dataplane.clone());

        let survivors = self.adapter.existing_cross_connects(&dataplane).await?;

        let model = Arc::clone(&self.model);
        let adapter = Arc::clone(&self.adapter);
        let name = name.to_string();
        tokio::spawn(async move {
            let mut stream = match adapter.monitor_mechanisms(&dataplane).await {
                Ok(stream) => stream,
                Err(e) => {
                    warn!(dataplane = %name, error = %e, "mechanisms monitor unavailable");
                    model.delete_dataplane(&name);
                    return;
                }
            };
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    update = stream.recv() => match update {
                        Some(update) => {
                            model.update_dataplane_mechanisms(&name, update);
                        }
                        None => {
                            // Agent hung up; the healer reacts to the delete.
                            warn!(dataplane = %name, "mechanisms stream lost, unregistering");
                            model.delete_dataplane(&name);
                            break;
                        }
                    },
                }
            }
        });
        Ok(survivors)
    }

    pub fn unregister(&self, name: &str) {
        if self.model.delete_dataplane(name).is_some() {
            info!(dataplane = name, "dataplane unregistered");
        }
    }

    /// Block until some dataplane satisfies `pred`, up to `limit`.
    ///
    /// Current-state check first, then a model-event subscription until
    /// the deadline; registrations and mechanism re-announcements wake
    /// waiters. Subscribing before the check closes the race with a
    /// dataplane arriving in between.
    pub async fn wait_for_any(
        &self,
        limit: Duration,
        pred: impl Fn(&Dataplane) -> bool,
    ) -> Result<Dataplane, DataplaneError> {
        let mut events = self.model.subscribe();
        if let Some(dp) = self.model.find_dataplane(&pred) {
            return Ok(dp);
        }
        let deadline = tokio::time::Instant::now() + limit;
        loop {
            let event = tokio::select! {
                _ = tokio::time::sleep_until(deadline) => {
                    return Err(DataplaneError::Timeout(limit));
                }
                event = events.recv() => event,
            };
            match event {
                Ok(ModelEvent::DataplaneAdded { dataplane }) if pred(&dataplane) => {
                    return Ok(dataplane);
                }
                Ok(_) => {}
                // Missed events: re-check the model directly.
                Err(broadcast::error::RecvError::Lagged(_)) => {
                    if let Some(dp) = self.model.find_dataplane(&pred) {
                        return Ok(dp);
                    }
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(DataplaneError::Timeout(limit));
                }
            }
        }
    }

    pub async fn program(
        &self,
        dataplane_name: &str,
        xcon: CrossConnect,
        limit: Duration,
    ) -> Result<CrossConnect, DataplaneError> {
        let dp = self
            .model
            .get_dataplane(dataplane_name)
            .ok_or_else(|| DataplaneError::NotRegistered(dataplane_name.to_string()))?;
        tokio::time::timeout(limit, self.adapter.program(&dp, xcon))
            .await
            .map_err(|_| DataplaneError::Timeout(limit))?
    }

    pub async fn unprogram(
        &self,
        dataplane_name: &str,
        xcon: CrossConnect,
        limit: Duration,
    ) -> Result<(), DataplaneError> {
        let dp = self
            .model
            .get_dataplane(dataplane_name)
            .ok_or_else(|| DataplaneError::NotRegistered(dataplane_name.to_string()))?;
        tokio::time::timeout(limit, self.adapter.unprogram(&dp, xcon))
            .await
            .map_err(|_| DataplaneError::Timeout(limit))?
    }
}

#[cfg(test)]
#[path = "coordinator_tests.rs"]
mod tests;
