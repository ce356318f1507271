// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Public peer surface handlers: requests from other NSMs.

use std::collections::HashSet;
use std::sync::Arc;

use nsm_core::{
    ClientConnectionState, Connection, ConnectionId, ConnectionState, ModelEvent,
};
use nsm_wire::{
    read_message, write_message, ConnectionEvent, ConnectionEventKind, PeerRequest, PeerResponse,
};
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tracing::debug;

use super::{ConnectionError, ServiceCtx};

pub(crate) async fn handle_connection(
    ctx: Arc<ServiceCtx>,
    stream: TcpStream,
) -> Result<(), ConnectionError> {
    let (mut reader, mut writer) = stream.into_split();
    let request: PeerRequest = read_message(&mut reader, ctx.ipc_timeout).await?;
    debug!(request = ?request, "peer request");

    if let PeerRequest::Monitor { manager_name } = &request {
        return serve_monitor(ctx, manager_name.clone(), reader, writer).await;
    }

    let response = match request {
        PeerRequest::Request { request } => match ctx.manager.request_remote(request).await {
            Ok(connection) => PeerResponse::Connection { connection },
            Err(e) => PeerResponse::Error { message: e.to_string() },
        },

        PeerRequest::Close { connection_id } => match ctx.manager.close(&connection_id).await {
            Ok(()) => PeerResponse::Ok,
            Err(e) => PeerResponse::Error { message: e.to_string() },
        },

        // Handled above; kept for exhaustiveness.
        PeerRequest::Monitor { .. } => return Ok(()),
    };

    write_message(&mut writer, &response, ctx.ipc_timeout).await?;
    Ok(())
}

/// The connection a subscriber cares about is the half facing it: the
/// remote source of the local cross-connect. A healing or closing record
/// is reported as DOWN so the peer can start its own recovery.
fn facing_connection(cc: &nsm_core::ClientConnection) -> Option<Connection> {
    let mut conn = cc.xcon.as_ref()?.source.connection().clone();
    if matches!(cc.state, ClientConnectionState::Healing | ClientConnectionState::Closing) {
        conn.state = ConnectionState::Down;
    }
    Some(conn)
}

async fn serve_monitor(
    ctx: Arc<ServiceCtx>,
    manager_name: String,
    mut reader: tokio::net::tcp::OwnedReadHalf,
    mut writer: tokio::net::tcp::OwnedWriteHalf,
) -> Result<(), ConnectionError> {
    let mut events = ctx.model.subscribe();

    let mut known: HashSet<ConnectionId> = HashSet::new();
    let initial: Vec<Connection> = ctx
        .model
        .client_connections()
        .into_iter()
        .filter(|cc| cc.requesting_manager.as_deref() == Some(manager_name.as_str()))
        .filter_map(|cc| {
            known.insert(cc.id.clone());
            facing_connection(&cc)
        })
        .collect();
    let transfer =
        ConnectionEvent { kind: ConnectionEventKind::InitialStateTransfer, connections: initial };
    write_message(&mut writer, &PeerResponse::Event { event: transfer }, ctx.ipc_timeout).await?;

    let mut probe = [0u8; 1];
    loop {
        let event = tokio::select! {
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
                if connection.requesting_manager.as_deref() == Some(manager_name.as_str()) =>
            {
                known.insert(connection.id.clone());
                facing_connection(&connection).map(ConnectionEvent::update)
            }
            ModelEvent::ClientConnectionDeleted { id } if known.remove(&id) => {
                Some(ConnectionEvent::delete(Connection {
                    id,
                    state: ConnectionState::Down,
                    ..Connection::default()
                }))
            }
            _ => None,
        };

        if let Some(event) = out {
            write_message(&mut writer, &PeerResponse::Event { event }, ctx.ipc_timeout).await?;
        }
    }
    Ok(())
}
