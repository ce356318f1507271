// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn extract_carves_point_to_point_pairs() {
    let pool = PrefixPool::new("10.20.1.0/24").unwrap();

    let first = pool.extract("1", &[]).unwrap();
    assert_eq!(first.src_ip, "10.20.1.1/30");
    assert_eq!(first.dst_ip, "10.20.1.2/30");

    let second = pool.extract("2", &[]).unwrap();
    assert_eq!(second.src_ip, "10.20.1.5/30");
    assert_eq!(second.dst_ip, "10.20.1.6/30");
}

#[test]
fn extract_is_stable_per_connection_id() {
    let pool = PrefixPool::new("10.20.1.0/24").unwrap();
    let a = pool.extract("1", &[]).unwrap();
    let b = pool.extract("1", &[]).unwrap();
    assert_eq!(a, b);
}

#[test]
fn release_recycles_block() {
    let pool = PrefixPool::new("10.20.1.0/24").unwrap();
    let first = pool.extract("1", &[]).unwrap();
    pool.release("1");
    let again = pool.extract("2", &[]).unwrap();
    assert_eq!(first.src_ip, again.src_ip);
}

#[test]
fn extra_prefix_requests_granted_verbatim() {
    let pool = PrefixPool::new("10.20.1.0/24").unwrap();
    let out = pool.extract("1", &["172.16.0.0/16".to_string()]).unwrap();
    assert_eq!(out.extra_prefixes, vec!["172.16.0.0/16".to_string()]);
}

#[test]
fn invalid_extra_prefix_rejected() {
    let pool = PrefixPool::new("10.20.1.0/24").unwrap();
    let err = pool.extract("1", &["not-a-prefix".to_string()]).unwrap_err();
    assert!(matches!(err, PrefixError::InvalidPrefix(_)));
}

#[test]
fn fully_excluded_pool_reports_excluded_prefix() {
    let pool = PrefixPool::new("10.20.1.0/24").unwrap();
    pool.set_excluded(&["10.20.1.0/24".to_string()]).unwrap();

    let err = pool.extract("1", &[]).unwrap_err();
    assert!(err.to_string().contains("intersected by excludedPrefix"));
}

#[test]
fn partial_exclusion_skips_overlapping_blocks() {
    let pool = PrefixPool::new("10.20.1.0/28").unwrap();
    // Exclude the first half of the /28; the first usable block starts at .8.
    pool.set_excluded(&["10.20.1.0/29".to_string()]).unwrap();

    let out = pool.extract("1", &[]).unwrap();
    assert_eq!(out.src_ip, "10.20.1.9/30");
}

#[test]
fn tiny_pool_exhausts() {
    let pool = PrefixPool::new("10.20.1.0/30").unwrap();
    pool.extract("1", &[]).unwrap();
    let err = pool.extract("2", &[]).unwrap_err();
    assert!(matches!(err, PrefixError::PoolExhausted));
}

#[test]
fn ipv6_pool_carves_slash_126() {
    let pool = PrefixPool::new("100::/64").unwrap();
    let out = pool.extract("1", &[]).unwrap();
    assert_eq!(out.src_ip, "100::1/126");
    assert_eq!(out.dst_ip, "100::2/126");
}

#[test]
fn other_family_exclusions_ignored() {
    let pool = PrefixPool::new("10.20.1.0/24").unwrap();
    pool.set_excluded(&["100::/64".to_string()]).unwrap();
    pool.extract("1", &[]).unwrap();
}
