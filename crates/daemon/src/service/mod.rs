// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Socket-facing request handlers.
//!
//! Each accepted connection is handled in its own task: one framed
//! request, one framed response. Monitor requests instead upgrade
//! the connection into an event stream that lives until the client hangs
//! up.

pub(crate) mod api;
pub(crate) mod local;
pub(crate) mod peer;

use std::sync::Arc;
use std::time::Duration;

use nsm_wire::ProtocolError;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::manager::ConnectionManager;
use crate::model::Model;
use crate::registry::RegistryClient;
use crate::restore::Restorer;

/// Shared dependencies for workspace and peer request handlers.
pub(crate) struct ServiceCtx {
    pub model: Arc<Model>,
    pub manager: Arc<ConnectionManager>,
    pub registry: Arc<dyn RegistryClient>,
    pub restorer: Arc<Restorer>,
    pub ipc_timeout: Duration,
    /// How long a client request waits for a startup restore to finish.
    pub restore_wait: Duration,
}

/// Errors from connection handling.
#[derive(Debug, Error)]
pub(crate) enum ConnectionError {
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

pub(crate) fn log_connection_error(e: ConnectionError) {
    match e {
        ConnectionError::Protocol(ProtocolError::ConnectionClosed) => {
            debug!("Client disconnected")
        }
        ConnectionError::Protocol(ProtocolError::Timeout) => {
            warn!("Connection timeout")
        }
        _ => error!("Connection error: {}", e),
    }
}
