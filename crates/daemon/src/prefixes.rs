// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Excluded-prefix tracking.
//!
//! Endpoint allocators must not hand out addresses from cluster-owned
//! ranges. The set starts from `EXCLUDED_PREFIXES`, grows with the pod and
//! service subnets from the registry's cluster configuration, and follows
//! subnet extensions for the lifetime of the process. The manager injects
//! the current snapshot into every outgoing request context.

use std::sync::Arc;

use nsm_core::ConnectionContext;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::registry::RegistryClient;

#[derive(Clone, Default)]
pub struct ExcludedPrefixes {
    inner: Arc<Mutex<Vec<String>>>,
}

impl ExcludedPrefixes {
    pub fn new(initial: Vec<String>) -> Self {
        Self { inner: Arc::new(Mutex::new(initial)) }
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.inner.lock().clone()
    }

    pub fn add(&self, prefix: impl Into<String>) {
        let prefix = prefix.into();
        if prefix.is_empty() {
            return;
        }
        let mut inner = self.inner.lock();
        if !inner.contains(&prefix) {
            debug!(%prefix, "excluding prefix");
            inner.push(prefix);
        }
    }

    /// Merge the current set into a request context, preserving whatever
    /// the requester already excluded.
    pub fn inject(&self, context: &mut ConnectionContext) {
        for prefix in self.snapshot() {
            if !context.excluded_prefixes.contains(&prefix) {
                context.excluded_prefixes.push(prefix);
            }
        }
    }

    /// Seed from the cluster configuration and follow subnet extensions
    /// until cancelled. Registry outages degrade to the static set.
    pub fn spawn_refresh(&self, registry: Arc<dyn RegistryClient>, cancel: CancellationToken) {
        let prefixes = self.clone();
        tokio::spawn(async move {
            match registry.get_cluster_configuration().await {
                Ok(cfg) => {
                    info!(pod = %cfg.pod_subnet, service = %cfg.service_subnet, "cluster subnets excluded");
                    prefixes.add(cfg.pod_subnet);
                    prefixes.add(cfg.service_subnet);
                }
                Err(e) => warn!(error = %e, "cluster configuration unavailable"),
            }

            let mut stream = match registry.monitor_subnets().await {
                Ok(stream) => stream,
                Err(e) => {
                    warn!(error = %e, "subnet monitor unavailable");
                    return;
                }
            };
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    event = stream.recv() => match event {
                        Some(event) => prefixes.add(event.prefix),
                        None => break,
                    },
                }
            }
        });
    }
}

#[cfg(test)]
#[path = "prefixes_tests.rs"]
mod tests;
