// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-client workspaces.
//!
//! A workspace is one client's scoped slice of the NSM: a directory, a
//! unix-socket listener, and a serving task exposing the local request,
//! endpoint-registration, and connection-monitor surfaces. Cleanup runs
//! exactly once on every exit path; a failed mid-construction workspace
//! leaves no artifacts behind.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use nsm_wire::ClientConnectionReply;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::net::UnixListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::service::{self, ServiceCtx};

/// Socket served by the NSM inside the workspace directory.
pub const NSM_SERVER_SOCKET: &str = "nsm.server.io.sock";
/// Socket an in-workspace endpoint serves, as advertised on registration.
pub const NSM_CLIENT_SOCKET: &str = "nsm.client.io.sock";

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("workspace {0} already exists")]
    AlreadyExists(String),

    #[error("workspace {0} not found")]
    NotFound(String),

    #[error("workspace io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkspaceState {
    New,
    Running,
    Closed,
}

nsm_core::simple_display! {
    WorkspaceState {
        New => "new",
        Running => "running",
        Closed => "closed",
    }
}

pub struct Workspace {
    name: String,
    dir: PathBuf,
    state: Mutex<WorkspaceState>,
    cancel: CancellationToken,
}

impl Workspace {
    /// Build the directory, bind the listener, and start serving. On any
    /// failure the partially built workspace is cleaned up before the
    /// error is returned.
    pub(crate) async fn start(
        ctx: Arc<ServiceCtx>,
        base_dir: &Path,
        name: &str,
        restore: bool,
    ) -> Result<Arc<Self>, WorkspaceError> {
        info!(workspace = name, "creating workspace");
        let workspace = Arc::new(Self {
            name: name.to_string(),
            dir: base_dir.join(name),
            state: Mutex::new(WorkspaceState::New),
            cancel: CancellationToken::new(),
        });

        match workspace.build(ctx, restore).await {
            Ok(()) => {
                *workspace.state.lock() = WorkspaceState::Running;
                Ok(workspace)
            }
            Err(e) => {
                workspace.close();
                Err(e)
            }
        }
    }

    async fn build(self: &Arc<Self>, ctx: Arc<ServiceCtx>, restore: bool) -> Result<(), WorkspaceError> {
        if !restore && self.dir.exists() {
            debug!(workspace = %self.name, "clearing existing workspace contents");
            std::fs::remove_dir_all(&self.dir)?;
        }
        std::fs::create_dir_all(&self.dir)?;

        let socket = self.server_socket();
        // A stale socket file from a previous run would fail the bind.
        if socket.exists() {
            std::fs::remove_file(&socket)?;
        }
        let listener = UnixListener::bind(&socket)?;
        info!(workspace = %self.name, socket = %socket.display(), "workspace listening");

        let workspace = Arc::clone(self);
        tokio::spawn(async move {
            workspace.serve(ctx, listener).await;
        });
        Ok(())
    }

    async fn serve(self: Arc<Self>, ctx: Arc<ServiceCtx>, listener: UnixListener) {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, _)) => {
                        let ctx = Arc::clone(&ctx);
                        let name = self.name.clone();
                        tokio::spawn(async move {
                            if let Err(e) = service::local::handle_connection(ctx, name, stream).await {
                                service::log_connection_error(e);
                            }
                        });
                    }
                    Err(e) => {
                        error!(workspace = %self.name, error = %e, "workspace accept error");
                        break;
                    }
                },
            }
        }
        // Listener error or shutdown: release everything exactly once.
        self.close();
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn server_socket(&self) -> PathBuf {
        self.dir.join(NSM_SERVER_SOCKET)
    }

    /// Socket path an in-workspace endpoint is expected to serve on,
    /// relative to the base dir (the form stored in endpoint records).
    pub fn client_socket_location(&self) -> String {
        format!("{}/{}", self.name, NSM_CLIENT_SOCKET)
    }

    pub fn state(&self) -> WorkspaceState {
        *self.state.lock()
    }

    /// Stop serving and remove the directory. Safe to call from any exit
    /// path; only the first call does work.
    pub fn close(&self) {
        {
            let mut state = self.state.lock();
            if *state == WorkspaceState::Closed {
                return;
            }
            *state = WorkspaceState::Closed;
        }
        info!(workspace = %self.name, "closing workspace");
        self.cancel.cancel();
        if self.dir.exists() {
            if let Err(e) = std::fs::remove_dir_all(&self.dir) {
                error!(workspace = %self.name, error = %e, "failed to remove workspace dir");
            }
        }
    }
}

/// Owns every live workspace and answers the allocation API.
pub struct WorkspaceManager {
    base_dir: PathBuf,
    client_base_dir: String,
    ctx: Arc<ServiceCtx>,
    workspaces: Mutex<HashMap<String, Arc<Workspace>>>,
}

impl WorkspaceManager {
    pub(crate) fn new(base_dir: PathBuf, client_base_dir: String, ctx: Arc<ServiceCtx>) -> Self {
        Self { base_dir, client_base_dir, ctx, workspaces: Mutex::new(HashMap::new()) }
    }

    /// Allocate a workspace and report where the client finds it.
    pub async fn create(
        &self,
        name: &str,
        restore: bool,
    ) -> Result<ClientConnectionReply, WorkspaceError> {
        if self.workspaces.lock().contains_key(name) {
            return Err(WorkspaceError::AlreadyExists(name.to_string()));
        }
        let workspace =
            Workspace::start(Arc::clone(&self.ctx), &self.base_dir, name, restore).await?;
        self.workspaces.lock().insert(name.to_string(), Arc::clone(&workspace));

        Ok(ClientConnectionReply {
            workspace: name.to_string(),
            host_base_dir: self.base_dir.to_string_lossy().to_string(),
            nsm_server_socket: NSM_SERVER_SOCKET.to_string(),
            client_base_dir: self.client_base_dir.clone(),
            nsm_client_socket: NSM_CLIENT_SOCKET.to_string(),
        })
    }

    pub fn get(&self, name: &str) -> Option<Arc<Workspace>> {
        self.workspaces.lock().get(name).cloned()
    }

    pub fn close(&self, name: &str) -> Result<(), WorkspaceError> {
        let removed = self.workspaces.lock().remove(name);
        match removed {
            Some(workspace) => {
                workspace.close();
                Ok(())
            }
            None => Err(WorkspaceError::NotFound(name.to_string())),
        }
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.workspaces.lock().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn close_all(&self) {
        let all: Vec<Arc<Workspace>> = self.workspaces.lock().drain().map(|(_, w)| w).collect();
        for workspace in all {
            workspace.close();
        }
    }
}

#[cfg(test)]
#[path = "workspace_tests.rs"]
mod tests;
