//! C1 — Port Predictor.
//!
//! Pure, deterministic functions mapping a measured port-allocation step to
//! a bounded set of candidate NAT source ports worth probing. See
//! SPEC_FULL.md §4.1. Iteration order is a sorted `BTreeSet` throughout so
//! results are reproducible across runs, matching the determinism law in
//! spec.md §8.

use std::collections::BTreeSet;

/// Every positive divisor of `n` (not just those `<= sqrt(n)`): the
/// canonical semantics per spec.md §4.1 — `count_combinations` already sums
/// over the full divisor set, so a half-enumeration would desynchronize the
/// scale factor from the candidate count it claims to model.
pub fn get_factors(n: u32) -> BTreeSet<u32> {
    let mut factors = BTreeSet::new();
    if n == 0 {
        return factors;
    }
    for i in 1..=n {
        if n % i == 0 {
            factors.insert(i);
        }
    }
    factors
}

/// `Σ (n / f)` for `f` in `factors`: total count of `(factor, multiplier)`
/// products `<= n`.
pub fn count_combinations(factors: &BTreeSet<u32>, n: u32) -> u32 {
    factors.iter().map(|f| n / f).sum()
}

/// Candidate port-diffs for a peer arriving behind a NAT with measured
/// `port_diff`. `port_diff <= 0` means a cone NAT (constant source port):
/// no prediction is needed or possible.
pub fn get_probable_port_diffs(
    port_diff: i32,
    peer_number: u16,
    max_predicted_ports: u16,
) -> BTreeSet<i64> {
    let mut port_diffs = BTreeSet::new();
    if port_diff <= 0 {
        return port_diffs;
    }
    let n = port_diff as u32;
    let factors = get_factors(n);
    let num_combinations = count_combinations(&factors, n);
    if num_combinations == 0 {
        return port_diffs;
    }
    let scale = max_predicted_ports as f64 / num_combinations as f64;

    for &step in &factors {
        let upper = ((n as f64 / step as f64) * scale).ceil() as i64 + 1;
        let mut s = upper;
        while s >= 0 {
            port_diffs.insert(step as i64 * (peer_number as i64 + s));
            s -= 1;
        }
    }
    port_diffs
}

/// Probable source ports an arriving peer will use to reach this one,
/// derived from the port it used toward the splitter (`source_port`), the
/// measured `port_diff`, and the peer's ordinal (`peer_number`). Every
/// output port lies in `[1, 65535]`; out-of-range candidates are dropped.
pub fn get_probable_source_ports(
    source_port: u16,
    port_diff: i32,
    peer_number: u16,
    max_predicted_ports: u16,
) -> Vec<u16> {
    if port_diff <= 0 {
        return Vec::new();
    }
    get_probable_port_diffs(port_diff, peer_number, max_predicted_ports)
        .into_iter()
        .filter_map(|diff| {
            let candidate = source_port as i64 + diff;
            if (1..65536).contains(&candidate) {
                Some(candidate as u16)
            } else {
                None
            }
        })
        .collect()
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Predictor bound: |result| <= K * |factors(port_diff)|.
        #[test]
        fn bound_law(port_diff in 1u32..5000, peer_number in 0u16..1000, k in 1u16..32) {
            let factors = get_factors(port_diff);
            let diffs = get_probable_port_diffs(port_diff as i32, peer_number, k);
            prop_assert!(diffs.len() as u64 <= k as u64 * factors.len() as u64);
        }

        /// Every output port lies in [1, 65535].
        #[test]
        fn port_range_law(
            src_port in 1u16..65_000,
            port_diff in 1u32..5000,
            peer_number in 0u16..1000,
            k in 1u16..32,
        ) {
            for port in get_probable_source_ports(src_port, port_diff as i32, peer_number, k) {
                prop_assert!(port >= 1);
            }
        }

        /// Determinism: same inputs, same output set, every call.
        #[test]
        fn determinism_law(
            src_port in 1u16..65_000,
            port_diff in -10i32..5000,
            peer_number in 0u16..1000,
            k in 1u16..32,
        ) {
            let a = get_probable_source_ports(src_port, port_diff, peer_number, k);
            let b = get_probable_source_ports(src_port, port_diff, peer_number, k);
            prop_assert_eq!(a, b);
        }

        /// Cone-NAT case: non-positive port_diff always yields an empty set.
        #[test]
        fn cone_nat_law(src_port in 1u16..65_000, port_diff in -1000i32..=0, peer_number in 0u16..1000, k in 1u16..32) {
            prop_assert!(get_probable_source_ports(src_port, port_diff, peer_number, k).is_empty());
        }
    }
}
