// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Framed registry client over TCP.
//!
//! One connection per exchange; transient dial and transport failures are
//! retried with exponential backoff. Application-level rejections are not
//! retried.

use std::time::Duration;

use async_trait::async_trait;
use nsm_core::{EndpointRegistration, NsmManager};
use nsm_wire::{
    next_frame, read_message, write_message, ClusterConfiguration, FindReply, RegistryRequest,
    RegistryResponse, SubnetExtensionEvent,
};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{RegistryClient, RegistryError};

const RETRIES: u32 = 3;
const BACKOFF_BASE: Duration = Duration::from_millis(100);
/// Ceiling for one registry exchange attempt.
const REGISTRY_DEADLINE: Duration = Duration::from_secs(30);

pub struct RemoteRegistry {
    address: String,
}

impl RemoteRegistry {
    pub fn new(address: impl Into<String>) -> Self {
        Self { address: address.into() }
    }

    async fn exchange(&self, request: &RegistryRequest) -> Result<RegistryResponse, RegistryError> {
        let mut backoff = BACKOFF_BASE;
        let mut last_err = None;
        for attempt in 0..RETRIES {
            if attempt > 0 {
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }
            match self.exchange_once(request).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    debug!(attempt, error = %e, "registry exchange failed");
                    last_err = Some(e);
                }
            }
        }
        Err(RegistryError::Unavailable(
            last_err.map(|e| e.to_string()).unwrap_or_else(|| "no attempts".into()),
        ))
    }

    async fn exchange_once(
        &self,
        request: &RegistryRequest,
    ) -> Result<RegistryResponse, RegistryError> {
        let mut stream = TcpStream::connect(&self.address)
            .await
            .map_err(|e| RegistryError::Unavailable(e.to_string()))?;
        write_message(&mut stream, request, REGISTRY_DEADLINE).await?;
        let response: RegistryResponse = read_message(&mut stream, REGISTRY_DEADLINE).await?;
        Ok(response)
    }
}

fn unexpected(response: RegistryResponse) -> RegistryError {
    match response {
        RegistryResponse::Error { message } => RegistryError::Rejected(message),
        other => RegistryError::Rejected(format!("unexpected registry response: {other:?}")),
    }
}

#[async_trait]
impl RegistryClient for RemoteRegistry {
    async fn register_nse(
        &self,
        registration: EndpointRegistration,
    ) -> Result<EndpointRegistration, RegistryError> {
        match self.exchange(&RegistryRequest::RegisterNse { registration }).await? {
            RegistryResponse::Registration { registration } => Ok(registration),
            other => Err(unexpected(other)),
        }
    }

    async fn remove_nse(&self, name: &str) -> Result<(), RegistryError> {
        match self.exchange(&RegistryRequest::RemoveNse { name: name.to_string() }).await? {
            RegistryResponse::Ok => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    async fn register_nsm(&self, manager: NsmManager) -> Result<NsmManager, RegistryError> {
        match self.exchange(&RegistryRequest::RegisterNsm { manager }).await? {
            RegistryResponse::Manager { manager } => Ok(manager),
            other => Err(unexpected(other)),
        }
    }

    async fn find_network_service(&self, name: &str) -> Result<FindReply, RegistryError> {
        match self
            .exchange(&RegistryRequest::FindNetworkService { name: name.to_string() })
            .await?
        {
            RegistryResponse::Service { reply } => Ok(reply),
            other => Err(unexpected(other)),
        }
    }

    async fn get_cluster_configuration(&self) -> Result<ClusterConfiguration, RegistryError> {
        match self.exchange(&RegistryRequest::GetClusterConfiguration).await? {
            RegistryResponse::ClusterConfiguration { configuration } => Ok(configuration),
            other => Err(unexpected(other)),
        }
    }

    async fn monitor_subnets(
        &self,
    ) -> Result<mpsc::Receiver<SubnetExtensionEvent>, RegistryError> {
        let mut stream = TcpStream::connect(&self.address)
            .await
            .map_err(|e| RegistryError::Unavailable(e.to_string()))?;
        write_message(&mut stream, &RegistryRequest::MonitorSubnets, REGISTRY_DEADLINE).await?;

        let (tx, rx) = mpsc::channel(16);
        let address = self.address.clone();
        tokio::spawn(async move {
            loop {
                match next_frame::<_, RegistryResponse>(&mut stream).await {
                    Ok(RegistryResponse::SubnetExtension { event }) => {
                        if tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    Ok(other) => {
                        warn!(registry = %address, response = ?other, "unexpected frame on subnet stream");
                    }
                    Err(e) => {
                        warn!(registry = %address, error = %e, "subnet stream closed");
                        break;
                    }
                }
            }
        });
        Ok(rx)
    }
}
