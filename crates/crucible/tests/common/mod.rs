//! Shared pieces for the integration suites: deterministic input
//! generation and the sample algorithms driven through the harness.
//!
//! The algorithms are deliberately implemented differently from the serial
//! oracles (boundary scan plus per-segment work, optionally parallel over
//! segments) so that matrix runs are a genuine cross-check rather than the
//! same loop compared against itself.

#![allow(dead_code)]

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

/// Segmented input with random run lengths between 1 and 5.
pub fn segment_input(n: usize, seed: u64) -> (Vec<u64>, Vec<u64>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut keys = Vec::with_capacity(n);
    let mut values = Vec::with_capacity(n);

    let mut key = 0u64;
    let mut remaining = 0usize;
    for _ in 0..n {
        if remaining == 0 {
            key += 1 + rng.gen_range(0..3) as u64;
            remaining = rng.gen_range(1..=5);
        }
        keys.push(key);
        values.push(rng.gen_range(0..100));
        remaining -= 1;
    }
    (keys, values)
}

/// Half-open `(start, end)` bounds of each maximal run of equal keys.
pub fn segment_bounds(keys: &[u64]) -> Vec<(usize, usize)> {
    let mut bounds = Vec::new();
    let mut start = 0;
    for i in 1..keys.len() {
        if keys[i] != keys[i - 1] {
            bounds.push((start, i));
            start = i;
        }
    }
    if !keys.is_empty() {
        bounds.push((start, keys.len()));
    }
    bounds
}

/// Segmented reduction under test: boundary scan, then one fold per
/// segment, optionally parallel over segments.
pub fn reduce_by_segment_under_test(
    keys: &[u64],
    values: &[u64],
    parallel: bool,
) -> (Vec<u64>, Vec<u64>) {
    let bounds = segment_bounds(keys);
    let fold = |&(start, end): &(usize, usize)| -> (u64, u64) {
        (keys[start], values[start..end].iter().sum())
    };

    let pairs: Vec<(u64, u64)> = if parallel {
        bounds.par_iter().map(fold).collect()
    } else {
        bounds.iter().map(fold).collect()
    };
    pairs.into_iter().unzip()
}

/// Segmented inclusive scan under test: independent prefix sums per
/// segment, optionally parallel over segments.
pub fn inclusive_scan_under_test(keys: &[u64], values: &[u64], parallel: bool) -> Vec<u64> {
    let bounds = segment_bounds(keys);
    let scan = |&(start, end): &(usize, usize)| -> Vec<u64> {
        let mut acc = 0u64;
        values[start..end]
            .iter()
            .map(|v| {
                acc += v;
                acc
            })
            .collect()
    };

    let chunks: Vec<Vec<u64>> = if parallel {
        bounds.par_iter().map(scan).collect()
    } else {
        bounds.iter().map(scan).collect()
    };
    chunks.into_iter().flatten().collect()
}

/// Segmented exclusive scan under test, seeded with `init` per segment.
pub fn exclusive_scan_under_test(
    keys: &[u64],
    values: &[u64],
    init: u64,
    parallel: bool,
) -> Vec<u64> {
    let bounds = segment_bounds(keys);
    let scan = |&(start, end): &(usize, usize)| -> Vec<u64> {
        let mut acc = init;
        values[start..end]
            .iter()
            .map(|v| {
                let out = acc;
                acc += v;
                out
            })
            .collect()
    };

    let chunks: Vec<Vec<u64>> = if parallel {
        bounds.par_iter().map(scan).collect()
    } else {
        bounds.iter().map(scan).collect()
    };
    chunks.into_iter().flatten().collect()
}
