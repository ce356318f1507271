// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon startup, assembly, and shutdown.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use fs2::FileExt;
use nsm_core::NsmManager;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::dataplane::{DataplaneAdapter, DataplaneCoordinator, WireDataplane};
use crate::endpoints::{EndpointConnector, WorkspaceEndpointConnector};
use crate::env;
use crate::heal::{HealTimeouts, Healer};
use crate::manager::{ConnectionManager, ManagerDeps};
use crate::model::Model;
use crate::peers::PeerPool;
use crate::prefixes::ExcludedPrefixes;
use crate::registry::{RegistryClient, RegistryError, RemoteRegistry, SharedRegistry, SharedStorage};
use crate::restore::Restorer;
use crate::service::{self, api::ApiCtx, ServiceCtx};
use crate::workspace::WorkspaceManager;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("NODE_NAME is not set")]
    MissingNodeName,

    #[error("failed to lock {0}: another nsmd owns this base dir")]
    LockFailed(PathBuf),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Everything read once from the environment.
pub struct Config {
    pub node_name: String,
    pub base_dir: PathBuf,
    pub client_base_dir: String,
    pub api_bind: String,
    pub public_bind: String,
    /// Host advertised to peers; defaults to 127.0.0.1 for loopback binds.
    pub advertise_host: Option<String>,
    pub registry_address: Option<String>,
    pub excluded_prefixes: Vec<String>,
    pub dataplane_wait: Duration,
    pub ipc_timeout: Duration,
    /// Grace period client requests give a startup restore.
    pub restore_wait: Duration,
    pub heal_dst_nse_wait: Duration,
    pub heal_dst_manager_wait: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, LifecycleError> {
        let node_name =
            std::env::var(env::NODE_NAME).map_err(|_| LifecycleError::MissingNodeName)?;
        Ok(Self {
            node_name,
            base_dir: env::base_dir(),
            client_base_dir: env::client_base_dir(),
            api_bind: env::api_bind(),
            public_bind: env::public_bind(),
            advertise_host: std::env::var(env::IP_ADDRESS).ok().filter(|s| !s.is_empty()),
            registry_address: std::env::var(env::REGISTRY_ADDRESS)
                .ok()
                .filter(|s| !s.is_empty()),
            excluded_prefixes: std::env::var(env::EXCLUDED_PREFIXES)
                .map(|raw| {
                    raw.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            dataplane_wait: env::dataplane_timeout(),
            ipc_timeout: env::ipc_timeout(),
            restore_wait: env::restore_timeout(),
            heal_dst_nse_wait: env::heal_dst_nse_wait(),
            heal_dst_manager_wait: env::heal_dst_manager_wait(),
        })
    }

    /// Loopback configuration rooted at `base_dir`, with ephemeral ports.
    /// What tests and single-node sandboxes use.
    pub fn for_node(node_name: impl Into<String>, base_dir: PathBuf) -> Self {
        Self {
            node_name: node_name.into(),
            client_base_dir: base_dir.to_string_lossy().to_string(),
            base_dir,
            api_bind: "127.0.0.1:0".to_string(),
            public_bind: "127.0.0.1:0".to_string(),
            advertise_host: None,
            registry_address: None,
            excluded_prefixes: Vec::new(),
            dataplane_wait: Duration::from_secs(15),
            ipc_timeout: Duration::from_secs(5),
            // Loopback nodes restore instantly or not at all.
            restore_wait: Duration::from_millis(100),
            heal_dst_nse_wait: Duration::from_secs(5),
            heal_dst_manager_wait: Duration::from_secs(30),
        }
    }
}

/// External collaborators injected into the daemon; production wiring
/// speaks the framed protocol, tests swap in fakes.
pub struct Collaborators {
    pub registry: Arc<dyn RegistryClient>,
    pub dataplane: Arc<dyn DataplaneAdapter>,
    pub endpoints: Arc<dyn EndpointConnector>,
}

impl Collaborators {
    pub fn wire(config: &Config) -> Self {
        let registry: Arc<dyn RegistryClient> = match &config.registry_address {
            Some(address) => Arc::new(RemoteRegistry::new(address.clone())),
            // Single-node mode: a process-local registry.
            None => Arc::new(SharedRegistry::new(
                SharedStorage::new(None),
                config.node_name.clone(),
            )),
        };
        Self {
            registry,
            dataplane: Arc::new(WireDataplane::new(config.ipc_timeout)),
            endpoints: Arc::new(WorkspaceEndpointConnector::new(
                config.base_dir.clone(),
                config.ipc_timeout,
            )),
        }
    }
}

/// A running NSM node.
pub struct NsmServer {
    model: Arc<Model>,
    manager: Arc<ConnectionManager>,
    healer: Arc<Healer>,
    restorer: Arc<Restorer>,
    dataplanes: Arc<DataplaneCoordinator>,
    workspaces: Arc<WorkspaceManager>,
    api_address: std::net::SocketAddr,
    public_url: String,
    cancel: CancellationToken,
    // Held for the daemon's lifetime; unlocks on drop.
    _lock_file: std::fs::File,
}

/// Start the daemon: lock the base dir, assemble the components, bind the
/// listeners, and register this manager with the cluster registry.
pub async fn startup(
    config: Config,
    collaborators: Collaborators,
) -> Result<NsmServer, LifecycleError> {
    std::fs::create_dir_all(&config.base_dir)?;

    // Lock first so two daemons never share a base dir. Opened without
    // truncation: the file may belong to a running daemon.
    let lock_path = config.base_dir.join("nsmd.lock");
    let mut lock_file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(&lock_path)?;
    lock_file
        .try_lock_exclusive()
        .map_err(|_| LifecycleError::LockFailed(lock_path.clone()))?;
    lock_file.set_len(0)?;
    writeln!(lock_file, "{}", std::process::id())?;

    let cancel = CancellationToken::new();
    let model = Model::new();
    let dataplanes = DataplaneCoordinator::new(Arc::clone(&model), collaborators.dataplane);
    let restorer = Restorer::new(Arc::clone(&model), Arc::clone(&dataplanes));

    // Bind before registering so the advertised URL carries a real port.
    let api_listener = TcpListener::bind(&config.api_bind).await?;
    let api_address = api_listener.local_addr()?;
    let public_listener = TcpListener::bind(&config.public_bind).await?;
    let public_port = public_listener.local_addr()?.port();
    let advertise_host =
        config.advertise_host.clone().unwrap_or_else(|| "127.0.0.1".to_string());
    let public_url = format!("{advertise_host}:{public_port}");

    let identity = collaborators
        .registry
        .register_nsm(NsmManager { name: config.node_name.clone(), url: public_url.clone() })
        .await?;
    info!(manager = %identity.name, url = %identity.url, "manager registered");

    let excluded = ExcludedPrefixes::new(config.excluded_prefixes.clone());
    excluded.spawn_refresh(Arc::clone(&collaborators.registry), cancel.clone());

    let healer = Healer::new(
        Arc::clone(&model),
        HealTimeouts::new(config.heal_dst_nse_wait, config.heal_dst_manager_wait),
        cancel.clone(),
    );
    let manager = ConnectionManager::new(
        ManagerDeps {
            model: Arc::clone(&model),
            registry: Arc::clone(&collaborators.registry),
            dataplanes: Arc::clone(&dataplanes),
            endpoints: collaborators.endpoints,
            peers: Arc::new(PeerPool::new(config.ipc_timeout)),
            excluded,
        },
        identity,
        config.dataplane_wait,
    );
    manager.bind_healer(Arc::clone(&healer));
    healer.bind_manager(Arc::clone(&manager));
    healer.spawn_event_loop();

    let ctx = Arc::new(ServiceCtx {
        model: Arc::clone(&model),
        manager: Arc::clone(&manager),
        registry: collaborators.registry,
        restorer: Arc::clone(&restorer),
        ipc_timeout: config.ipc_timeout,
        restore_wait: config.restore_wait,
    });
    let workspaces = Arc::new(WorkspaceManager::new(
        config.base_dir.clone(),
        config.client_base_dir.clone(),
        Arc::clone(&ctx),
    ));

    spawn_api_loop(
        api_listener,
        Arc::new(ApiCtx {
            workspaces: Arc::clone(&workspaces),
            dataplanes: Arc::clone(&dataplanes),
            restorer: Arc::clone(&restorer),
            cancel: cancel.clone(),
            ipc_timeout: config.ipc_timeout,
        }),
        cancel.clone(),
    );
    spawn_public_loop(public_listener, Arc::clone(&ctx), cancel.clone());

    info!(api = %api_address, public = %public_url, "nsmd listening");
    Ok(NsmServer {
        model,
        manager,
        healer,
        restorer,
        dataplanes,
        workspaces,
        api_address,
        public_url,
        cancel,
        _lock_file: lock_file,
    })
}

fn spawn_api_loop(listener: TcpListener, ctx: Arc<ApiCtx>, cancel: CancellationToken) {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, _)) => {
                        let ctx = Arc::clone(&ctx);
                        tokio::spawn(async move {
                            if let Err(e) = service::api::handle_connection(ctx, stream).await {
                                service::log_connection_error(e);
                            }
                        });
                    }
                    Err(e) => error!("api accept error: {}", e),
                },
            }
        }
    });
}

fn spawn_public_loop(listener: TcpListener, ctx: Arc<ServiceCtx>, cancel: CancellationToken) {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, _)) => {
                        let ctx = Arc::clone(&ctx);
                        tokio::spawn(async move {
                            if let Err(e) = service::peer::handle_connection(ctx, stream).await {
                                service::log_connection_error(e);
                            }
                        });
                    }
                    Err(e) => error!("public accept error: {}", e),
                },
            }
        }
    });
}

impl NsmServer {
    pub fn model(&self) -> &Arc<Model> {
        &self.model
    }

    pub fn manager(&self) -> &Arc<ConnectionManager> {
        &self.manager
    }

    pub fn healer(&self) -> &Arc<Healer> {
        &self.healer
    }

    pub fn restorer(&self) -> &Arc<Restorer> {
        &self.restorer
    }

    pub fn dataplanes(&self) -> &Arc<DataplaneCoordinator> {
        &self.dataplanes
    }

    pub fn workspaces(&self) -> &Arc<WorkspaceManager> {
        &self.workspaces
    }

    pub fn api_address(&self) -> std::net::SocketAddr {
        self.api_address
    }

    pub fn public_url(&self) -> &str {
        &self.public_url
    }

    pub fn identity(&self) -> &NsmManager {
        self.manager.identity()
    }

    /// Stop serving and release every workspace.
    pub fn stop(&self) {
        info!(manager = %self.identity().name, "stopping nsmd");
        self.cancel.cancel();
        self.workspaces.close_all();
    }
}

impl Drop for NsmServer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
