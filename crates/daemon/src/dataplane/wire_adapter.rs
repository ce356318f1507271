// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Framed client to a real dataplane agent.
//!
//! Socket locations are `unix:<path>` or `tcp:<addr>`, as the agent
//! announced them at registration.

use std::time::Duration;

use async_trait::async_trait;
use nsm_core::{CrossConnect, Dataplane};
use nsm_wire::{
    next_frame, read_message, write_message, DataplaneRequest, DataplaneResponse,
    MechanismsUpdate,
};
use tokio::net::{TcpStream, UnixStream};
use tokio::sync::mpsc;
use tracing::warn;

use super::{DataplaneAdapter, DataplaneError};

enum AgentStream {
    Unix(UnixStream),
    Tcp(TcpStream),
}

pub struct WireDataplane {
    timeout: Duration,
}

impl WireDataplane {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn connect(&self, dataplane: &Dataplane) -> Result<AgentStream, DataplaneError> {
        let location = &dataplane.socket_location;
        if let Some(path) = location.strip_prefix("unix:") {
            let stream = UnixStream::connect(path)
                .await
                .map_err(|e| DataplaneError::RequestFailed(format!("{location}: {e}")))?;
            Ok(AgentStream::Unix(stream))
        } else if let Some(addr) = location.strip_prefix("tcp:") {
            let stream = TcpStream::connect(addr)
                .await
                .map_err(|e| DataplaneError::RequestFailed(format!("{location}: {e}")))?;
            Ok(AgentStream::Tcp(stream))
        } else {
            Err(DataplaneError::RequestFailed(format!("unsupported socket location {location}")))
        }
    }

    async fn exchange(
        &self,
        dataplane: &Dataplane,
        request: &DataplaneRequest,
    ) -> Result<DataplaneResponse, DataplaneError> {
        let failed = |e: nsm_wire::ProtocolError| DataplaneError::RequestFailed(e.to_string());
        match self.connect(dataplane).await? {
            AgentStream::Unix(mut s) => {
                write_message(&mut s, request, self.timeout).await.map_err(failed)?;
                read_message(&mut s, self.timeout).await.map_err(failed)
            }
            AgentStream::Tcp(mut s) => {
                write_message(&mut s, request, self.timeout).await.map_err(failed)?;
                read_message(&mut s, self.timeout).await.map_err(failed)
            }
        }
    }
}

#[async_trait]
impl DataplaneAdapter for WireDataplane {
    async fn program(
        &self,
        dataplane: &Dataplane,
        xcon: CrossConnect,
    ) -> Result<CrossConnect, DataplaneError> {
        match self.exchange(dataplane, &DataplaneRequest::Program { cross_connect: xcon }).await? {
            DataplaneResponse::CrossConnect { cross_connect } => Ok(cross_connect),
            DataplaneResponse::Error { message } => Err(DataplaneError::RequestFailed(message)),
            other => {
                Err(DataplaneError::RequestFailed(format!("unexpected response: {other:?}")))
            }
        }
    }

    async fn unprogram(
        &self,
        dataplane: &Dataplane,
        xcon: CrossConnect,
    ) -> Result<(), DataplaneError> {
        match self
            .exchange(dataplane, &DataplaneRequest::Unprogram { cross_connect: xcon })
            .await?
        {
            DataplaneResponse::Ok => Ok(()),
            DataplaneResponse::Error { message } => Err(DataplaneError::RequestFailed(message)),
            other => {
                Err(DataplaneError::RequestFailed(format!("unexpected response: {other:?}")))
            }
        }
    }

    async fn monitor_mechanisms(
        &self,
        dataplane: &Dataplane,
    ) -> Result<mpsc::Receiver<MechanismsUpdate>, DataplaneError> {
        let failed = |e: nsm_wire::ProtocolError| DataplaneError::RequestFailed(e.to_string());
        let mut stream = self.connect(dataplane).await?;
        match &mut stream {
            AgentStream::Unix(s) => {
                write_message(s, &DataplaneRequest::MonitorMechanisms, self.timeout)
                    .await
                    .map_err(failed)?
            }
            AgentStream::Tcp(s) => {
                write_message(s, &DataplaneRequest::MonitorMechanisms, self.timeout)
                    .await
                    .map_err(failed)?
            }
        }

        let (tx, rx) = mpsc::channel(16);
        let name = dataplane.registered_name.clone();
        tokio::spawn(async move {
            loop {
                let frame = match &mut stream {
                    AgentStream::Unix(s) => next_frame::<_, DataplaneResponse>(s).await,
                    AgentStream::Tcp(s) => next_frame::<_, DataplaneResponse>(s).await,
                };
                match frame {
                    Ok(DataplaneResponse::Mechanisms { update }) => {
                        if tx.send(update).await.is_err() {
                            break;
                        }
                    }
                    Ok(other) => {
                        warn!(dataplane = %name, response = ?other, "unexpected frame on mechanisms stream");
                    }
                    Err(e) => {
                        warn!(dataplane = %name, error = %e, "mechanisms stream closed");
                        break;
                    }
                }
            }
        });
        Ok(rx)
    }

    async fn existing_cross_connects(
        &self,
        dataplane: &Dataplane,
    ) -> Result<Vec<CrossConnect>, DataplaneError> {
        match self.exchange(dataplane, &DataplaneRequest::Inventory).await? {
            DataplaneResponse::Inventory { cross_connects } => Ok(cross_connects),
            DataplaneResponse::Error { message } => Err(DataplaneError::RequestFailed(message)),
            other => {
                Err(DataplaneError::RequestFailed(format!("unexpected response: {other:?}")))
            }
        }
    }
}
