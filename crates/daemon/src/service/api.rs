// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! NSMD allocation API: workspace lifecycle and dataplane registration.

use std::sync::Arc;
use std::time::Duration;

use nsm_wire::{read_message, write_message, NsmdRequest, NsmdResponse};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::ConnectionError;
use crate::dataplane::DataplaneCoordinator;
use crate::restore::Restorer;
use crate::workspace::WorkspaceManager;

/// Dependencies of the allocation API handlers.
pub(crate) struct ApiCtx {
    pub workspaces: Arc<WorkspaceManager>,
    pub dataplanes: Arc<DataplaneCoordinator>,
    pub restorer: Arc<Restorer>,
    pub cancel: CancellationToken,
    pub ipc_timeout: Duration,
}

pub(crate) async fn handle_connection(
    ctx: Arc<ApiCtx>,
    stream: TcpStream,
) -> Result<(), ConnectionError> {
    let (mut reader, mut writer) = stream.into_split();
    let request: NsmdRequest = read_message(&mut reader, ctx.ipc_timeout).await?;
    info!(request = ?request, "nsmd api request");

    let response = match request {
        NsmdRequest::RequestClientConnection { workspace } => {
            match ctx.workspaces.create(&workspace, false).await {
                Ok(reply) => NsmdResponse::ClientConnection { reply },
                Err(e) => NsmdResponse::Error { message: e.to_string() },
            }
        }

        NsmdRequest::DeleteClientConnection { workspace } => {
            match ctx.workspaces.close(&workspace) {
                Ok(()) => NsmdResponse::Ok,
                Err(e) => NsmdResponse::Error { message: e.to_string() },
            }
        }

        NsmdRequest::EnumClientConnections => {
            NsmdResponse::Workspaces { names: ctx.workspaces.names() }
        }

        NsmdRequest::RegisterDataplane { name, socket_location } => {
            match ctx.dataplanes.register(&name, &socket_location, ctx.cancel.clone()).await {
                Ok(survivors) => {
                    // The agent's surviving cross-connects drive restore.
                    let restored = ctx.restorer.restore_connections(&survivors, &name).await;
                    restore_workspaces(&ctx, &restored).await;
                    NsmdResponse::Ok
                }
                Err(e) => NsmdResponse::Error { message: e.to_string() },
            }
        }
    };

    write_message(&mut writer, &response, ctx.ipc_timeout).await?;
    Ok(())
}

/// Bring back the workspaces of restored connections in restore mode, so
/// their sockets and monitor streams return without clearing whatever the
/// client left in the directory.
async fn restore_workspaces(ctx: &Arc<ApiCtx>, restored: &[nsm_core::ClientConnection]) {
    for cc in restored {
        if cc.workspace.is_empty() || ctx.workspaces.get(&cc.workspace).is_some() {
            continue;
        }
        if let Err(e) = ctx.workspaces.create(&cc.workspace, true).await {
            warn!(workspace = %cc.workspace, error = %e, "failed to restore workspace");
        }
    }
}
