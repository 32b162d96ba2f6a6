//! Serial reference oracles for the segmented operations.
//!
//! These walk plain host slices once and are the ground truth the parallel
//! implementation under test must match exactly. A segment is a maximal
//! contiguous run of keys equal under the supplied predicate. Inputs are
//! snapshots of the same logical data the algorithm consumed; nothing is
//! cached between calls.

/// Segmented reduction.
///
/// Writes one `(key, value)` pair per segment into the output slices and
/// returns the number of segments produced. Each segment's value starts
/// from `init` and folds `op` over the segment's input values; its key is
/// the key at the segment start. For empty input nothing is written and 0
/// is returned.
///
/// # Panics
///
/// Panics if the outputs are shorter than the number of segments.
pub fn reduce_by_segment<K, V, P, Op>(
    keys: &[K],
    values: &[V],
    out_keys: &mut [K],
    out_values: &mut [V],
    init: V,
    mut pred: P,
    mut op: Op,
) -> usize
where
    K: Clone,
    V: Clone,
    P: FnMut(&K, &K) -> bool,
    Op: FnMut(V, V) -> V,
{
    let n = keys.len().min(values.len());
    if n < 1 {
        return 0;
    }

    let mut segment = 0;
    let mut segment_start = 0;
    let mut acc = op(init.clone(), values[0].clone());
    for i in 1..n {
        if pred(&keys[i - 1], &keys[i]) {
            acc = op(acc, values[i].clone());
        } else {
            out_keys[segment] = keys[segment_start].clone();
            out_values[segment] = acc;
            segment += 1;
            segment_start = i;
            acc = op(init.clone(), values[i].clone());
        }
    }
    out_keys[segment] = keys[segment_start].clone();
    out_values[segment] = acc;
    segment + 1
}

/// Segmented inclusive scan.
///
/// `out[i]` is `values[i]` at a segment restart (position 0 or a key change
/// under `pred`), otherwise `op(out[i - 1], values[i])`. For empty input
/// nothing is written.
pub fn inclusive_scan_by_segment<K, V, P, Op>(
    keys: &[K],
    values: &[V],
    out: &mut [V],
    mut pred: P,
    mut op: Op,
) where
    V: Clone,
    P: FnMut(&K, &K) -> bool,
    Op: FnMut(V, V) -> V,
{
    let n = keys.len().min(values.len());
    for i in 0..n {
        out[i] = if i == 0 || !pred(&keys[i - 1], &keys[i]) {
            values[i].clone()
        } else {
            op(out[i - 1].clone(), values[i].clone())
        };
    }
}

/// Segmented exclusive scan.
///
/// Each segment's first output element is `init`; subsequent elements
/// accumulate `op` over the preceding values of the segment, so the
/// segment's own first input lands in the next output slot, not its own.
/// For empty input nothing is written.
pub fn exclusive_scan_by_segment<K, V, P, Op>(
    keys: &[K],
    values: &[V],
    out: &mut [V],
    init: V,
    mut pred: P,
    mut op: Op,
) where
    V: Clone,
    P: FnMut(&K, &K) -> bool,
    Op: FnMut(V, V) -> V,
{
    let n = keys.len().min(values.len());
    for i in 0..n {
        out[i] = if i == 0 || !pred(&keys[i - 1], &keys[i]) {
            init.clone()
        } else {
            op(out[i - 1].clone(), values[i - 1].clone())
        };
    }
}
