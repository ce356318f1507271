// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reference prefix-pool allocator.
//!
//! Endpoints own IPAM; the manager only forwards excluded prefixes. This
//! pool is the reference implementation used by in-process endpoints and
//! tests: it carves point-to-point blocks (/30 for IPv4, /126 for IPv6)
//! out of one configured CIDR and hands back a source/destination address
//! pair per connection id.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use parking_lot::Mutex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PrefixError {
    #[error("invalid prefix {0:?}")]
    InvalidPrefix(String),
    #[error("the available address pool is empty")]
    PoolExhausted,
    #[error("the available address pool is empty, probably intersected by excludedPrefix")]
    PoolExcluded,
}

/// Addresses carved out for one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    pub src_ip: String,
    pub dst_ip: String,
    pub extra_prefixes: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Prefix {
    base: u128,
    len: u8,
    v6: bool,
}

impl Prefix {
    fn bits(&self) -> u8 {
        if self.v6 {
            128
        } else {
            32
        }
    }

    fn overlaps(&self, other: &Prefix) -> bool {
        if self.v6 != other.v6 {
            return false;
        }
        let len = self.len.min(other.len);
        let shift = u32::from(self.bits() - len);
        // shift == bits means a zero-length prefix: everything overlaps.
        if shift >= 128 {
            return true;
        }
        (self.base >> shift) == (other.base >> shift)
    }
}

fn parse_prefix(raw: &str) -> Result<Prefix, PrefixError> {
    let invalid = || PrefixError::InvalidPrefix(raw.to_string());
    let (addr, len) = raw.split_once('/').ok_or_else(invalid)?;
    let addr: IpAddr = addr.parse().map_err(|_| invalid())?;
    let len: u8 = len.parse().map_err(|_| invalid())?;
    let (base, v6, bits) = match addr {
        IpAddr::V4(v4) => (u128::from(u32::from(v4)), false, 32u8),
        IpAddr::V6(v6) => (u128::from(v6), true, 128u8),
    };
    if len > bits {
        return Err(invalid());
    }
    // Mask off host bits so the base is canonical.
    let host = u32::from(bits - len);
    let base = if host >= 128 { 0 } else { (base >> host) << host };
    Ok(Prefix { base, len, v6 })
}

fn format_addr(v6: bool, addr: u128) -> String {
    if v6 {
        Ipv6Addr::from(addr).to_string()
    } else {
        Ipv4Addr::from(addr as u32).to_string()
    }
}

struct PoolState {
    pool: Prefix,
    next_block: u128,
    free: Vec<u128>,
    assigned: HashMap<String, u128>,
    excluded: Vec<Prefix>,
}

/// Carves one point-to-point block per connection id out of a CIDR.
pub struct PrefixPool {
    inner: Mutex<PoolState>,
}

impl PrefixPool {
    pub fn new(cidr: &str) -> Result<Self, PrefixError> {
        let pool = parse_prefix(cidr)?;
        Ok(Self {
            inner: Mutex::new(PoolState {
                pool,
                next_block: 0,
                free: Vec::new(),
                assigned: HashMap::new(),
                excluded: Vec::new(),
            }),
        })
    }

    /// Replace the excluded-prefix set. Prefixes of the other address
    /// family are ignored.
    pub fn set_excluded(&self, prefixes: &[String]) -> Result<(), PrefixError> {
        let parsed =
            prefixes.iter().map(|p| parse_prefix(p)).collect::<Result<Vec<_>, _>>()?;
        self.inner.lock().excluded = parsed;
        Ok(())
    }

    /// Allocate (or re-return) the address pair for `conn_id`.
    ///
    /// Extra prefix requests are granted verbatim after validation.
    pub fn extract(
        &self,
        conn_id: &str,
        extra_request: &[String],
    ) -> Result<Extraction, PrefixError> {
        for prefix in extra_request {
            parse_prefix(prefix)?;
        }

        let mut state = self.inner.lock();
        let block = match state.assigned.get(conn_id) {
            Some(block) => *block,
            None => {
                let block = Self::carve(&mut state)?;
                state.assigned.insert(conn_id.to_string(), block);
                block
            }
        };

        // Point-to-point block: .1 for the client side, .2 for the
        // endpoint side, both addressed within the carved block.
        let block_len = state.pool.bits() - 2;
        let v6 = state.pool.v6;
        Ok(Extraction {
            src_ip: format!("{}/{}", format_addr(v6, block + 1), block_len),
            dst_ip: format!("{}/{}", format_addr(v6, block + 2), block_len),
            extra_prefixes: extra_request.to_vec(),
        })
    }

    /// Return the block for `conn_id` to the free list.
    pub fn release(&self, conn_id: &str) {
        let mut state = self.inner.lock();
        if let Some(block) = state.assigned.remove(conn_id) {
            state.free.push(block);
        }
    }

    fn carve(state: &mut PoolState) -> Result<u128, PrefixError> {
        let host_bits = u32::from(state.pool.bits() - state.pool.len);
        let capacity: u128 = if host_bits >= 2 { 1u128 << (host_bits - 2) } else { 0 };
        let block_len = state.pool.bits() - 2;
        let mut skipped_excluded = false;

        if let Some(block) = state.free.pop() {
            return Ok(block);
        }
        while state.next_block < capacity {
            let block = state.pool.base + (state.next_block << 2);
            state.next_block += 1;
            let candidate = Prefix { base: block, len: block_len, v6: state.pool.v6 };
            if state.excluded.iter().any(|e| e.overlaps(&candidate)) {
                skipped_excluded = true;
                continue;
            }
            return Ok(block);
        }
        if skipped_excluded || state.excluded.iter().any(|e| e.overlaps(&state.pool)) {
            Err(PrefixError::PoolExcluded)
        } else {
            Err(PrefixError::PoolExhausted)
        }
    }
}

#[cfg(test)]
#[path = "prefix_pool_tests.rs"]
mod tests;
