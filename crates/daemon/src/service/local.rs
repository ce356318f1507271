// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace socket handlers: the local client surface.

use std::collections::HashSet;
use std::sync::Arc;

use nsm_core::{Connection, ConnectionId, Endpoint, ModelEvent};
use nsm_wire::{
    read_message, write_message, ConnectionEvent, ConnectionEventKind, LocalRequest,
    LocalResponse,
};
use tokio::io::AsyncReadExt;
use tokio::net::UnixStream;
use tracing::{debug, info};

use super::{ConnectionError, ServiceCtx};
use crate::workspace::NSM_CLIENT_SOCKET;

pub(crate) async fn handle_connection(
    ctx: Arc<ServiceCtx>,
    workspace: String,
    stream: UnixStream,
) -> Result<(), ConnectionError> {
    let (mut reader, mut writer) = stream.into_split();
    let request: LocalRequest = read_message(&mut reader, ctx.ipc_timeout).await?;
    debug!(workspace = %workspace, request = ?request, "local request");

    // Monitor upgrades the connection into an event stream.
    if matches!(request, LocalRequest::Monitor) {
        return serve_monitor(ctx, workspace, reader, writer).await;
    }

    let response = match request {
        LocalRequest::Request { request } => {
            // Hold the request while a startup restore may still be
            // replaying state; after the grace period it proceeds anyway.
            if let Err(e) = ctx.restorer.wait_for_dataplane(ctx.restore_wait).await {
                debug!(error = %e, "proceeding without a completed restore");
            }
            match ctx.manager.request(&workspace, &request).await {
                Ok(connection) => LocalResponse::Connection { connection },
                Err(e) => LocalResponse::Error { message: e.to_string() },
            }
        }

        LocalRequest::Close { connection } => match ctx.manager.close(&connection.id).await {
            Ok(()) => LocalResponse::Ok,
            Err(e) => LocalResponse::Error { message: e.to_string() },
        },

        LocalRequest::RegisterEndpoint { registration } => {
            match register_endpoint(&ctx, &workspace, registration).await {
                Ok(registration) => LocalResponse::Registration { registration },
                Err(message) => LocalResponse::Error { message },
            }
        }

        LocalRequest::RemoveEndpoint { name } => {
            if let Err(e) = ctx.registry.remove_nse(&name).await {
                LocalResponse::Error { message: e.to_string() }
            } else {
                ctx.model.delete_endpoint(&name);
                LocalResponse::Ok
            }
        }

        // Handled above; kept for exhaustiveness.
        LocalRequest::Monitor => return Ok(()),
    };

    write_message(&mut writer, &response, ctx.ipc_timeout).await?;
    Ok(())
}

async fn register_endpoint(
    ctx: &Arc<ServiceCtx>,
    workspace: &str,
    mut registration: nsm_core::EndpointRegistration,
) -> Result<nsm_core::EndpointRegistration, String> {
    if registration.endpoint.network_service.is_empty() {
        registration.endpoint.network_service = registration.service.name.clone();
    }
    // Carry our public identity so the registry can record the manager.
    if registration.manager.is_none() {
        registration.manager = Some(ctx.manager.identity().clone());
    }

    let registered =
        ctx.registry.register_nse(registration).await.map_err(|e| e.to_string())?;

    let endpoint = Endpoint {
        registration: registered.clone(),
        workspace: workspace.to_string(),
        socket_location: format!("{workspace}/{NSM_CLIENT_SOCKET}"),
    };
    info!(endpoint = %endpoint.name(), workspace, "endpoint registered");
    ctx.model.add_endpoint(endpoint);
    Ok(registered)
}

/// Stream connection events scoped to this workspace until the client
/// disconnects.
async fn serve_monitor(
    ctx: Arc<ServiceCtx>,
    workspace: String,
    mut reader: tokio::net::unix::OwnedReadHalf,
    mut writer: tokio::net::unix::OwnedWriteHalf,
) -> Result<(), ConnectionError> {
    let mut events = ctx.model.subscribe();

    let mut known: HashSet<ConnectionId> = HashSet::new();
    let initial: Vec<Connection> = ctx
        .model
        .client_connections()
        .into_iter()
        .filter(|cc| cc.workspace == workspace)
        .filter_map(|cc| {
            known.insert(cc.id.clone());
            cc.source_connection().cloned()
        })
        .collect();
    let transfer = ConnectionEvent { kind: ConnectionEventKind::InitialStateTransfer, connections: initial };
    write_message(&mut writer, &LocalResponse::Event { event: transfer }, ctx.ipc_timeout).await?;

    let mut probe = [0u8; 1];
    loop {
        let event = tokio::select! {
            // A read returning anything means the client is gone (the
            // protocol has no client frames after Monitor).
            _ = reader.read(&mut probe) => break,
            event = events.recv() => match event {
                Ok(event) => event,
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(_) => break,
            },
        };

        let out = match event {
            ModelEvent::ClientConnectionAdded { connection }
            | ModelEvent::ClientConnectionUpdated { connection }
                if connection.workspace == workspace =>
            {
                known.insert(connection.id.clone());
                connection.source_connection().cloned().map(ConnectionEvent::update)
            }
            ModelEvent::ClientConnectionDeleted { id } if known.remove(&id) => {
                Some(ConnectionEvent::delete(Connection { id, ..Connection::default() }))
            }
            _ => None,
        };

        if let Some(event) = out {
            write_message(&mut writer, &LocalResponse::Event { event }, ctx.ipc_timeout).await?;
        }
    }
    Ok(())
}
