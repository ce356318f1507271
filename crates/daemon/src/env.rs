// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the daemon crate.
//!
//! Everything is read once at startup into [`crate::lifecycle::Config`];
//! nothing else in the daemon touches the environment.

use std::path::PathBuf;
use std::time::Duration;

/// Name this manager registers under; also the node identity used to
/// decide whether an endpoint is local. Required.
pub const NODE_NAME: &str = "NODE_NAME";
/// Address of the cluster registry service. When unset, the daemon runs
/// with a process-local registry (single-node mode).
pub const REGISTRY_ADDRESS: &str = "NSMD_REGISTRY_ADDRESS";
/// Host advertised to peers in the manager URL; defaults to the bind host.
pub const IP_ADDRESS: &str = "IP_ADDRESS";
/// Comma-separated prefixes every endpoint allocator must avoid.
pub const EXCLUDED_PREFIXES: &str = "EXCLUDED_PREFIXES";
/// Seconds to wait for a replacement endpoint during a destination heal.
pub const HEAL_DST_NSE_WAIT_TIMEOUT: &str = "HEAL_DST_NSE_WAIT_TIMEOUT";
/// Seconds to wait for a lost peer manager to re-register before giving up.
pub const HEAL_DST_WAIT_TIMEOUT: &str = "NSMD_HEAL_DST_WAIT_TIMEOUT";

/// Workspace base directory: NSM_BASE_DIR > /var/lib/networkservicemesh
pub fn base_dir() -> PathBuf {
    std::env::var("NSM_BASE_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/var/lib/networkservicemesh"))
}

/// Base directory as mounted inside client containers.
pub fn client_base_dir() -> String {
    std::env::var("NSM_CLIENT_BASE_DIR")
        .unwrap_or_else(|_| "/var/lib/networkservicemesh".to_string())
}

/// Bind address for the NSMD allocation API.
pub fn api_bind() -> String {
    std::env::var("NSMD_API_ADDRESS").unwrap_or_else(|_| "127.0.0.1:5001".to_string())
}

/// Bind address for the public peer surface.
pub fn public_bind() -> String {
    std::env::var("NSMD_PUBLIC_ADDRESS").unwrap_or_else(|_| "0.0.0.0:5007".to_string())
}

/// Default IPC timeout for one framed exchange.
pub fn ipc_timeout() -> Duration {
    std::env::var("NSMD_IPC_TIMEOUT_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(5))
}

/// How long a request waits for a ready dataplane.
pub fn dataplane_timeout() -> Duration {
    secs_env("NSMD_DATAPLANE_TIMEOUT", 15)
}

/// Grace period client requests give a startup state restore before
/// proceeding anyway.
pub fn restore_timeout() -> Duration {
    secs_env("NSMD_RESTORE_TIMEOUT", 5)
}

pub fn heal_dst_nse_wait() -> Duration {
    secs_env(HEAL_DST_NSE_WAIT_TIMEOUT, 5)
}

pub fn heal_dst_manager_wait() -> Duration {
    secs_env(HEAL_DST_WAIT_TIMEOUT, 30)
}

fn secs_env(name: &str, default: u64) -> Duration {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(Duration::from_secs(default))
}
