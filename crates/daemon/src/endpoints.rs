// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Invoking local endpoints.
//!
//! Endpoints live inside client workspaces and serve the local protocol on
//! their advertised socket. The connector seam lets tests stand in for a
//! real endpoint process.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use nsm_core::{Connection, Endpoint};
use nsm_wire::{read_message, write_message, LocalRequest, LocalResponse, NetworkServiceRequest};
use thiserror::Error;
use tokio::net::UnixStream;

#[derive(Debug, Error)]
pub enum EndpointError {
    /// The endpoint answered and said no.
    #[error("endpoint refused: {0}")]
    Refused(String),

    #[error("endpoint unreachable: {0}")]
    Unreachable(String),

    #[error(transparent)]
    Protocol(#[from] nsm_wire::ProtocolError),
}

/// Seam for invoking an endpoint's network-service surface.
#[async_trait]
pub trait EndpointConnector: Send + Sync {
    async fn request(
        &self,
        endpoint: &Endpoint,
        request: NetworkServiceRequest,
    ) -> Result<Connection, EndpointError>;

    async fn close(&self, endpoint: &Endpoint, connection: Connection)
        -> Result<(), EndpointError>;
}

/// Production connector: dials the endpoint's workspace socket.
pub struct WorkspaceEndpointConnector {
    base_dir: PathBuf,
    timeout: Duration,
}

impl WorkspaceEndpointConnector {
    pub fn new(base_dir: PathBuf, timeout: Duration) -> Self {
        Self { base_dir, timeout }
    }

    async fn connect(&self, endpoint: &Endpoint) -> Result<UnixStream, EndpointError> {
        let socket = self.base_dir.join(&endpoint.socket_location);
        UnixStream::connect(&socket)
            .await
            .map_err(|e| EndpointError::Unreachable(format!("{}: {e}", socket.display())))
    }
}

#[async_trait]
impl EndpointConnector for WorkspaceEndpointConnector {
    async fn request(
        &self,
        endpoint: &Endpoint,
        request: NetworkServiceRequest,
    ) -> Result<Connection, EndpointError> {
        let mut stream = self.connect(endpoint).await?;
        write_message(&mut stream, &LocalRequest::Request { request }, self.timeout).await?;
        match read_message(&mut stream, self.timeout).await? {
            LocalResponse::Connection { connection } => Ok(connection),
            LocalResponse::Error { message } => Err(EndpointError::Refused(message)),
            other => Err(EndpointError::Refused(format!("unexpected response: {other:?}"))),
        }
    }

    async fn close(
        &self,
        endpoint: &Endpoint,
        connection: Connection,
    ) -> Result<(), EndpointError> {
        let mut stream = self.connect(endpoint).await?;
        write_message(&mut stream, &LocalRequest::Close { connection }, self.timeout).await?;
        match read_message(&mut stream, self.timeout).await? {
            LocalResponse::Ok => Ok(()),
            LocalResponse::Error { message } => Err(EndpointError::Refused(message)),
            other => Err(EndpointError::Refused(format!("unexpected response: {other:?}"))),
        }
    }
}
