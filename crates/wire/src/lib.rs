// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! IPC protocol for every NSM surface.
//!
//! Wire format: 4-byte length prefix (big-endian) + JSON payload. The same
//! framing carries five surfaces, each with its own tagged request/response
//! pair: the per-workspace local client surface, the public peer surface,
//! the NSMD allocation API, the dataplane agent surface, and the cluster
//! registry surface. Streams are requests that upgrade the connection: the
//! server keeps writing event frames until either side hangs up.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod dataplane;
mod local;
mod nsmdapi;
mod peer;
mod registry;
mod types;
mod wire;

pub use dataplane::{DataplaneRequest, DataplaneResponse, MechanismsUpdate};
pub use local::{LocalRequest, LocalResponse};
pub use nsmdapi::{ClientConnectionReply, NsmdRequest, NsmdResponse};
pub use peer::{PeerRequest, PeerResponse, RemoteServiceRequest};
pub use registry::{
    ClusterConfiguration, FindReply, RegistryRequest, RegistryResponse, SubnetExtensionEvent,
    SubnetScope,
};
pub use types::{ConnectionEvent, ConnectionEventKind, NetworkServiceRequest};
pub use wire::{decode, encode, next_frame, read_message, write_message, ProtocolError};
