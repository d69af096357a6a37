//! Sort/prepare stage: decomposition, point expansion, window slicing and
//! the three-pass counting sort.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use super::{MsmRun, Plan};
use crate::arena::PointPtr;
use crate::field::FieldKernel;
use crate::pool::Worker;
use crate::scalar::{signed_slices, HalfScalar, SLICE_CARRY};

/// Phase 1, parallel over input index `i`: write the four point variants
/// `{G, −G, ψG, −ψG}` at `expanded + 4i`, decompose the scalar into its two
/// signed halves, cut every window's signed digit, and count bucket
/// occupancy. Identity inputs keep their slice rows at zero and are never
/// counted.
pub(crate) fn decompose_and_slice<K: FieldKernel>(run: &MsmRun<'_, K>, w: &Worker) {
    let curve = &run.engine.curve;
    let arena = &run.engine.arena;
    let two_n = 2 * run.n;
    let mut local_max = 0u32;
    let mut digits = vec![0u32; run.windows];

    for i in w.range(run.n) {
        let point = run.points[i];
        // SAFETY: this worker owns rows 4i..4i+4 of the expansion in this
        // phase.
        unsafe {
            let base = PointPtr(run.expanded.0 + 4 * i as u32);
            let neg = curve.negate_affine(&point);
            let endo = curve.endo(&point);
            let endo_neg = curve.negate_affine(&endo);
            arena.write(base, point);
            arena.write(PointPtr(base.0 + 1), neg);
            arena.write(PointPtr(base.0 + 2), endo);
            arena.write(PointPtr(base.0 + 3), endo_neg);
        }

        let (s0, s1) = run.engine.glv.decompose(&run.scalars[i]);
        // SAFETY: disjoint by i.
        unsafe {
            run.halves.set(2 * i, s0);
            run.halves.set(2 * i + 1, s1);
        }
        if !point.nonzero {
            continue;
        }
        for (j, half) in [(2 * i, s0), (2 * i + 1, s1)] {
            if half.mag == 0 {
                continue;
            }
            signed_slices(half.mag, run.c, &mut digits);
            for (k, &digit) in digits.iter().enumerate() {
                let label = digit & !SLICE_CARRY;
                // SAFETY: disjoint by j.
                unsafe { run.slices.set(k * two_n + j, digit) };
                if label != 0 {
                    let kl = k * run.l_max + label as usize - 1;
                    let seen = run.counts[kl].fetch_add(1, Ordering::SeqCst) + 1;
                    local_max = local_max.max(seen);
                }
            }
        }
    }
    run.max_bucket.fetch_max(local_max, Ordering::SeqCst);
}

/// Pass 2, main worker only (runs inside the broadcast): prefix-sum bucket
/// counts into flat offsets, seed the scatter cursors, allocate the bucket
/// region and cut the label space into `workers` chunks balanced by point
/// count. Chunk boundaries double as the ownership map for the scatter and
/// accumulation phases.
pub(crate) fn build_plan<K: FieldKernel>(run: &MsmRun<'_, K>, workers: usize) -> Plan {
    let kl_total = run.windows * run.l_max;
    let mut offsets = Vec::with_capacity(kl_total + 1);
    let mut acc = 0u32;
    offsets.push(0);
    for (kl, count) in run.counts.iter().enumerate() {
        let count = count.load(Ordering::SeqCst);
        // SAFETY: main worker exclusively between barriers.
        unsafe { run.fill.set(kl, acc) };
        acc += count;
        offsets.push(acc);
    }
    let total = acc;

    let mut chunks = Vec::with_capacity(workers + 1);
    chunks.push(0);
    for t in 1..workers {
        let target = (total as u64 * t as u64 / workers as u64) as u32;
        // first label boundary at or past the target share
        let kl = offsets.partition_point(|&o| o < target).min(kl_total);
        chunks.push(kl.max(chunks[t - 1]));
    }
    chunks.push(kl_total);

    let bucket_base = run.engine.arena.alloc(total as usize);
    Plan {
        offsets,
        chunks,
        bucket_base: bucket_base.0,
        max_bucket: run.max_bucket.load(Ordering::SeqCst),
    }
}

/// Pass 3, parallel over label-space chunks: each worker re-scans the slice
/// rows of the windows its chunk touches and copies the selected point
/// variant of every matching entry into its bucket. Cursor writes stay
/// inside the chunk, so no atomics are needed here.
pub(crate) fn scatter<K: FieldKernel>(run: &MsmRun<'_, K>, w: &Worker, plan: &Arc<Plan>) {
    let arena = &run.engine.arena;
    let two_n = 2 * run.n;
    let chunk = plan.chunks[w.index.min(plan.chunks.len() - 1)]
        ..plan.chunks[(w.index + 1).min(plan.chunks.len() - 1)];
    if chunk.is_empty() {
        return;
    }
    let k_first = chunk.start / run.l_max;
    let k_last = (chunk.end - 1) / run.l_max;

    for k in k_first..=k_last {
        for j in 0..two_n {
            // SAFETY: slice rows are read-only in this phase.
            let digit = unsafe { run.slices.get(k * two_n + j) };
            let label = digit & !SLICE_CARRY;
            if label == 0 {
                continue;
            }
            let kl = k * run.l_max + label as usize - 1;
            if !chunk.contains(&kl) {
                continue;
            }
            // SAFETY: halves are read-only now; the cursor and the target
            // bucket slot belong to this chunk.
            unsafe {
                let half: HalfScalar = run.halves.get(j);
                let flip = (digit & SLICE_CARRY != 0) ^ half.neg;
                let variant = 2 * (j & 1) as u32 + flip as u32;
                let src = PointPtr(run.expanded.0 + 4 * (j / 2) as u32 + variant);
                let cursor = run.fill.get(kl);
                run.fill.set(kl, cursor + 1);
                let dst = PointPtr(plan.bucket_base + cursor);
                arena.write(dst, arena.read(src));
            }
        }
    }
}
