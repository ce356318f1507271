// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures: complete in-process NSM nodes over test doubles.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use nsm_core::{
    mechanism, Connection, ConnectionContext, ConnectionState, CrossConnect, Dataplane, Endpoint,
    EndpointRegistration, Mechanism, MechanismKind, ModelEvent, NetworkService,
    NetworkServiceEndpoint, PrefixPool,
};
use nsm_daemon::dataplane::{DataplaneAdapter, DataplaneError};
use nsm_daemon::endpoints::{EndpointConnector, EndpointError};
use nsm_daemon::registry::{RegistryClient, SharedRegistry, SharedStorage};
use nsm_daemon::{startup, Collaborators, Config, NsmServer};
use nsm_wire::{
    read_message, write_message, LocalRequest, LocalResponse, MechanismsUpdate,
    NetworkServiceRequest, NsmdRequest, NsmdResponse,
};
use parking_lot::Mutex;
use tokio::net::{TcpStream, UnixStream};
use tokio::sync::mpsc;

pub const MASTER: &str = "master";
pub const WORKER: &str = "worker";

const IPC: Duration = Duration::from_secs(5);

// ── dataplane double ─────────────────────────────────────────────────

/// Records programmed cross-connects like the agent would hold them.
#[derive(Default)]
pub struct TestDataplane {
    pub programmed: Mutex<Vec<CrossConnect>>,
    pub unprogrammed: Mutex<Vec<CrossConnect>>,
}

impl TestDataplane {
    pub fn installed(&self) -> usize {
        self.programmed.lock().len() - self.unprogrammed.lock().len()
    }
}

#[async_trait]
impl DataplaneAdapter for TestDataplane {
    async fn program(
        &self,
        _dataplane: &Dataplane,
        xcon: CrossConnect,
    ) -> Result<CrossConnect, DataplaneError> {
        self.programmed.lock().push(xcon.clone());
        Ok(xcon)
    }

    async fn unprogram(
        &self,
        _dataplane: &Dataplane,
        xcon: CrossConnect,
    ) -> Result<(), DataplaneError> {
        self.unprogrammed.lock().push(xcon);
        Ok(())
    }

    async fn monitor_mechanisms(
        &self,
        _dataplane: &Dataplane,
    ) -> Result<mpsc::Receiver<MechanismsUpdate>, DataplaneError> {
        let (tx, rx) = mpsc::channel(4);
        // Keep the stream open; specs configure mechanisms via the model.
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(300)).await;
            drop(tx);
        });
        Ok(rx)
    }

    async fn existing_cross_connects(
        &self,
        _dataplane: &Dataplane,
    ) -> Result<Vec<CrossConnect>, DataplaneError> {
        Ok(Vec::new())
    }
}

// ── endpoint double ──────────────────────────────────────────────────

/// Answers like a kernel-interface NSE with a pool on `10.20.1.0/24`.
pub struct TestNse {
    pool: PrefixPool,
}

impl TestNse {
    pub fn new() -> Self {
        Self { pool: PrefixPool::new("10.20.1.0/24").expect("valid pool cidr") }
    }
}

#[async_trait]
impl EndpointConnector for TestNse {
    async fn request(
        &self,
        _endpoint: &Endpoint,
        request: NetworkServiceRequest,
    ) -> Result<Connection, EndpointError> {
        let conn = request.connection;
        let extraction = self
            .pool
            .extract(conn.id.as_str(), &conn.context.extra_prefix_request)
            .map_err(|e| EndpointError::Refused(e.to_string()))?;

        let mech = Mechanism::new(MechanismKind::KernelInterface)
            .with_parameter(mechanism::NETNS_INODE, "12")
            .with_parameter(mechanism::INTERFACE_NAME, format!("nsm{}", conn.id));

        let mut context = conn.context.clone();
        context.src_ip_addr = Some(extraction.src_ip);
        context.dst_ip_addr = Some(extraction.dst_ip);
        context.extra_prefixes = extraction.extra_prefixes;

        Ok(Connection {
            id: conn.id,
            network_service: conn.network_service,
            mechanism: Some(mech),
            context,
            labels: conn.labels,
            state: ConnectionState::Up,
        })
    }

    async fn close(
        &self,
        _endpoint: &Endpoint,
        connection: Connection,
    ) -> Result<(), EndpointError> {
        self.pool.release(connection.id.as_str());
        Ok(())
    }
}

// ── node fixture ─────────────────────────────────────────────────────

pub struct TestNode {
    pub server: NsmServer,
    pub dataplane: Arc<TestDataplane>,
    pub registry: Arc<SharedRegistry>,
    _root: tempfile::TempDir,
}

/// Stand up one complete NSM over the shared registry storage.
pub async fn new_nsm_server(name: &str, storage: &Arc<SharedStorage>) -> TestNode {
    let root = tempfile::tempdir().expect("tempdir");
    let config = Config::for_node(name, root.path().to_path_buf());

    let dataplane = Arc::new(TestDataplane::default());
    let registry = Arc::new(SharedRegistry::new(Arc::clone(storage), name));
    let collaborators = Collaborators {
        registry: Arc::clone(&registry) as Arc<dyn RegistryClient>,
        dataplane: Arc::clone(&dataplane) as Arc<dyn DataplaneAdapter>,
        endpoints: Arc::new(TestNse::new()),
    };

    let server = startup(config, collaborators).await.expect("nsmd startup");
    TestNode { server, dataplane, registry, _root: root }
}

impl TestNode {
    /// A dataplane record with kernel + vxlan already configured, the way
    /// a fully announced agent would look.
    pub fn add_test_dataplane(&self, name: &str, vxlan_src: &str) {
        self.server.model().add_dataplane(Dataplane {
            registered_name: name.to_string(),
            socket_location: "tcp:some_addr".to_string(),
            local_mechanisms: vec![Mechanism::new(MechanismKind::KernelInterface)],
            remote_mechanisms: vec![Mechanism::new(MechanismKind::Vxlan)
                .with_parameter(mechanism::VXLAN_SRC_IP, vxlan_src)],
            mechanisms_configured: true,
        });
    }

    /// Register an endpoint in the cluster registry and the local model.
    pub async fn register_fake_endpoint(&self, service: &str, endpoint_name: &str) -> Endpoint {
        let registration = EndpointRegistration {
            service: NetworkService { name: service.to_string(), payload: "test".to_string() },
            endpoint: NetworkServiceEndpoint {
                name: endpoint_name.to_string(),
                network_service: service.to_string(),
                payload: "test".to_string(),
                manager_name: String::new(),
                labels: Default::default(),
            },
            manager: Some(self.server.identity().clone()),
        };
        let registered = self.registry.register_nse(registration).await.expect("register nse");

        let endpoint = Endpoint {
            registration: registered,
            workspace: "nsm-1".to_string(),
            socket_location: "nsm-1/client".to_string(),
        };
        self.server.model().add_endpoint(endpoint.clone());
        endpoint
    }

    /// Allocate a workspace over the NSMD API and return a client bound
    /// to its unix socket.
    pub async fn request_nsm_connection(&self, workspace: &str) -> LocalClient {
        let mut stream =
            TcpStream::connect(self.server.api_address()).await.expect("api reachable");
        write_message(
            &mut stream,
            &NsmdRequest::RequestClientConnection { workspace: workspace.to_string() },
            IPC,
        )
        .await
        .expect("api write");
        let response: NsmdResponse = read_message(&mut stream, IPC).await.expect("api read");

        match response {
            NsmdResponse::ClientConnection { reply } => {
                assert_eq!(reply.workspace, workspace);
                LocalClient {
                    socket: PathBuf::from(reply.host_base_dir)
                        .join(&reply.workspace)
                        .join(&reply.nsm_server_socket),
                }
            }
            other => panic!("unexpected api response: {other:?}"),
        }
    }
}

// ── local client ─────────────────────────────────────────────────────

pub struct LocalClient {
    socket: PathBuf,
}

impl LocalClient {
    async fn exchange(&self, request: &LocalRequest) -> LocalResponse {
        let mut stream = UnixStream::connect(&self.socket).await.expect("workspace socket");
        write_message(&mut stream, request, IPC).await.expect("client write");
        read_message(&mut stream, IPC).await.expect("client read")
    }

    pub async fn request(&self, request: NetworkServiceRequest) -> Result<Connection, String> {
        match self.exchange(&LocalRequest::Request { request }).await {
            LocalResponse::Connection { connection } => Ok(connection),
            LocalResponse::Error { message } => Err(message),
            other => panic!("unexpected response: {other:?}"),
        }
    }

    pub async fn close(&self, connection: Connection) -> Result<(), String> {
        match self.exchange(&LocalRequest::Close { connection }).await {
            LocalResponse::Ok => Ok(()),
            LocalResponse::Error { message } => Err(message),
            other => panic!("unexpected response: {other:?}"),
        }
    }
}

// ── model listener ───────────────────────────────────────────────────

/// Counts model events the way the original connection listeners did.
pub struct TestListener {
    adds: Arc<AtomicUsize>,
    updates: Arc<AtomicUsize>,
    deletes: Arc<AtomicUsize>,
}

pub fn listen(server: &NsmServer) -> TestListener {
    let adds = Arc::new(AtomicUsize::new(0));
    let updates = Arc::new(AtomicUsize::new(0));
    let deletes = Arc::new(AtomicUsize::new(0));
    let mut events = server.model().subscribe();

    let (a, u, d) = (Arc::clone(&adds), Arc::clone(&updates), Arc::clone(&deletes));
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                ModelEvent::ClientConnectionAdded { .. } => a.fetch_add(1, Ordering::SeqCst),
                ModelEvent::ClientConnectionUpdated { .. } => u.fetch_add(1, Ordering::SeqCst),
                ModelEvent::ClientConnectionDeleted { .. } => d.fetch_add(1, Ordering::SeqCst),
                _ => 0,
            };
        }
    });
    TestListener { adds, updates, deletes }
}

impl TestListener {
    pub async fn wait_adds(&self, n: usize, limit: Duration) {
        wait_count(&self.adds, n, limit, "adds").await;
    }

    pub async fn wait_updates(&self, n: usize, limit: Duration) {
        wait_count(&self.updates, n, limit, "updates").await;
    }

    pub async fn wait_deletes(&self, n: usize, limit: Duration) {
        wait_count(&self.deletes, n, limit, "deletes").await;
    }
}

async fn wait_count(counter: &AtomicUsize, n: usize, limit: Duration, what: &str) {
    let started = tokio::time::Instant::now();
    loop {
        let seen = counter.load(Ordering::SeqCst);
        if seen >= n {
            return;
        }
        assert!(
            started.elapsed() < limit,
            "timed out waiting for {n} {what}, saw {seen}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

// ── request helpers ──────────────────────────────────────────────────

/// The standard client request: kernel interface, both IPs required.
pub fn kernel_request(service: &str) -> NetworkServiceRequest {
    NetworkServiceRequest {
        connection: Connection {
            network_service: service.to_string(),
            context: ConnectionContext {
                src_ip_required: true,
                dst_ip_required: true,
                ..ConnectionContext::default()
            },
            ..Connection::default()
        },
        mechanism_preferences: vec![Mechanism::new(MechanismKind::KernelInterface)
            .with_parameter(mechanism::NETNS_INODE, "10")
            .with_parameter(mechanism::INTERFACE_NAME, "icmp-responder1")],
    }
}
