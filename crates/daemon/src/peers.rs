// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Peer NSM clients.
//!
//! Request/close exchanges reuse one pooled connection per peer address,
//! redialing once on failure; monitor streams get dedicated connections
//! owned by the healer.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use nsm_core::{Connection, ConnectionId};
use nsm_wire::{
    read_message, write_message, PeerRequest, PeerResponse, ProtocolError, RemoteServiceRequest,
};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::net::TcpStream;
use tracing::debug;

#[derive(Debug, Error)]
pub enum PeerError {
    /// Dial or transport failure; the peer may be down.
    #[error("peer {0} unreachable: {1}")]
    Unreachable(String, String),

    /// The peer answered and rejected the request.
    #[error("peer {0} rejected: {1}")]
    Rejected(String, String),
}

type Slot = Arc<tokio::sync::Mutex<Option<TcpStream>>>;

pub struct PeerPool {
    slots: Mutex<HashMap<String, Slot>>,
    timeout: Duration,
}

impl PeerPool {
    pub fn new(timeout: Duration) -> Self {
        Self { slots: Mutex::new(HashMap::new()), timeout }
    }

    fn slot(&self, url: &str) -> Slot {
        Arc::clone(self.slots.lock().entry(url.to_string()).or_default())
    }

    /// One framed exchange against `url`, reusing the pooled stream and
    /// redialing once when it has gone stale.
    async fn call(&self, url: &str, request: &PeerRequest) -> Result<PeerResponse, PeerError> {
        let slot = self.slot(url);
        let mut guard = slot.lock().await;

        for attempt in 0..2 {
            let mut stream = match guard.take() {
                Some(stream) => stream,
                None => match TcpStream::connect(url).await {
                    Ok(stream) => stream,
                    Err(e) if attempt == 0 => {
                        debug!(peer = url, error = %e, "peer dial failed, retrying");
                        continue;
                    }
                    Err(e) => {
                        return Err(PeerError::Unreachable(url.to_string(), e.to_string()))
                    }
                },
            };
            match Self::exchange(&mut stream, request, self.timeout).await {
                Ok(response) => {
                    *guard = Some(stream);
                    return Ok(response);
                }
                Err(e) if attempt == 0 => {
                    // Pooled stream was stale; redial once.
                    debug!(peer = url, error = %e, "peer exchange failed, redialing");
                }
                Err(e) => return Err(PeerError::Unreachable(url.to_string(), e.to_string())),
            }
        }
        Err(PeerError::Unreachable(url.to_string(), "retries exhausted".into()))
    }

    async fn exchange(
        stream: &mut TcpStream,
        request: &PeerRequest,
        limit: Duration,
    ) -> Result<PeerResponse, ProtocolError> {
        write_message(stream, request, limit).await?;
        read_message(stream, limit).await
    }

    /// Submit a cross-node request; returns the destination connection.
    pub async fn request(
        &self,
        url: &str,
        request: RemoteServiceRequest,
    ) -> Result<Connection, PeerError> {
        match self.call(url, &PeerRequest::Request { request }).await? {
            PeerResponse::Connection { connection } => Ok(connection),
            PeerResponse::Error { message } => Err(PeerError::Rejected(url.to_string(), message)),
            other => {
                Err(PeerError::Rejected(url.to_string(), format!("unexpected response: {other:?}")))
            }
        }
    }

    pub async fn close(&self, url: &str, connection_id: ConnectionId) -> Result<(), PeerError> {
        match self.call(url, &PeerRequest::Close { connection_id }).await? {
            PeerResponse::Ok => Ok(()),
            PeerResponse::Error { message } => Err(PeerError::Rejected(url.to_string(), message)),
            other => {
                Err(PeerError::Rejected(url.to_string(), format!("unexpected response: {other:?}")))
            }
        }
    }

    /// Open a dedicated monitor stream; the caller reads event frames.
    pub async fn monitor(&self, url: &str, manager_name: &str) -> Result<TcpStream, PeerError> {
        let mut stream = TcpStream::connect(url)
            .await
            .map_err(|e| PeerError::Unreachable(url.to_string(), e.to_string()))?;
        write_message(
            &mut stream,
            &PeerRequest::Monitor { manager_name: manager_name.to_string() },
            self.timeout,
        )
        .await
        .map_err(|e| PeerError::Unreachable(url.to_string(), e.to_string()))?;
        Ok(stream)
    }
}
