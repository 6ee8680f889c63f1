//! Worklist partitioning and stride ownership for the worker pool.

use std::ops::Range;

/// Split `0..len` into `size` contiguous chunks whose lengths differ by at
/// most one, with the excess going to the earliest chunks. Deterministic for
/// a given `(len, size)`.
pub fn split_evenly(len: usize, size: usize) -> Vec<Range<usize>> {
    assert!(size > 0, "worker count must be positive");
    let base = len / size;
    let excess = len % size;
    let mut chunks = Vec::with_capacity(size);
    let mut start = 0;
    for rank in 0..size {
        let chunk_len = base + usize::from(rank < excess);
        chunks.push(start..start + chunk_len);
        start += chunk_len;
    }
    chunks
}

/// Global indices owned by `rank` under the stride partition:
/// `{rank, rank + size, rank + 2*size, ...} < n`.
pub fn strided_indices(rank: usize, size: usize, n: usize) -> impl Iterator<Item = usize> {
    (rank..n).step_by(size)
}

/// Sort key for receiver filenames: the first two dotted integer fields
/// (`"{x}.{y}.rest"`). `None` for names that do not match.
pub fn numeric_sort_key(name: &str) -> Option<(u64, u64)> {
    let mut parts = name.split('.');
    let first = parts.next()?.parse::<u64>().ok()?;
    let second = parts.next()?.parse::<u64>().ok()?;
    Some((first, second))
}

/// Sort filenames by their dotted-numeric key. Names without a valid key are
/// warned about and collected after all keyed names, in their original order.
pub fn sort_by_numeric_key(mut names: Vec<String>) -> Vec<String> {
    for name in &names {
        if numeric_sort_key(name).is_none() {
            log::warn!("Unexpected filename format: {}", name);
        }
    }
    names.sort_by_key(|name| match numeric_sort_key(name) {
        Some(key) => (0u8, key),
        None => (1u8, (u64::MAX, u64::MAX)),
    });
    names
}
