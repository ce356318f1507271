// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! NSMD allocation surface: workspace lifecycle and dataplane registration.

use serde::{Deserialize, Serialize};

/// Where an allocated workspace lives, from both the host's and the
/// client's mount point of view.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConnectionReply {
    pub workspace: String,
    pub host_base_dir: String,
    pub nsm_server_socket: String,
    pub client_base_dir: String,
    pub nsm_client_socket: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum NsmdRequest {
    /// Allocate (or look up) a per-client workspace.
    #[serde(rename = "nsmd:request_client_connection")]
    RequestClientConnection { workspace: String },

    /// Close a workspace and remove its artifacts.
    #[serde(rename = "nsmd:delete_client_connection")]
    DeleteClientConnection { workspace: String },

    #[serde(rename = "nsmd:enum_client_connections")]
    EnumClientConnections,

    /// A dataplane agent announcing itself and its socket.
    #[serde(rename = "nsmd:register_dataplane")]
    RegisterDataplane { name: String, socket_location: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum NsmdResponse {
    #[serde(rename = "nsmd:client_connection")]
    ClientConnection { reply: ClientConnectionReply },

    #[serde(rename = "nsmd:workspaces")]
    Workspaces { names: Vec<String> },

    #[serde(rename = "nsmd:ok")]
    Ok,

    #[serde(rename = "nsmd:error")]
    Error { message: String },
}
