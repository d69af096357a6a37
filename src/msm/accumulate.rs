//! Bucket accumulation: collapse every bucket to one sum with a pair tree.
//!
//! Level `m` pairs entries `(ptr, ptr + m)` stepping `2m`, so each level
//! halves the live entries and every pairing in a level is independent,
//! exactly the parallelism one shared batch inversion amortises. A straight
//! running sum would serialise the whole bucket behind one inversion chain.
//!
//! Workers never synchronise inside this phase: each owns a contiguous span
//! of the bucket region (the label-space chunks from the sort plan) and runs
//! its own tree to completion. Bucket sums land on each bucket's first slot.

use std::sync::Arc;

use super::{MsmRun, Plan};
use crate::arena::PointPtr;
use crate::curve::batch::{batch_add, batch_add_unsafe, BatchScratch};
use crate::field::FieldKernel;
use crate::pool::Worker;

pub(crate) fn bucket_trees<K: FieldKernel>(run: &MsmRun<'_, K>, w: &Worker, plan: &Arc<Plan>) {
    let chunk = plan.chunks[w.index]..plan.chunks[w.index + 1];
    if chunk.is_empty() {
        return;
    }
    let span_start = plan.offsets[chunk.start] as usize;
    let span_end = plan.offsets[chunk.end] as usize;
    if span_start == span_end {
        return;
    }
    // SAFETY: chunk point spans are disjoint across workers and stable for
    // the whole phase.
    let points = unsafe {
        run.engine.arena.slice_mut(
            PointPtr(plan.bucket_base + span_start as u32),
            span_end - span_start,
        )
    };

    let curve = &run.engine.curve;
    let mut scratch = BatchScratch::new();
    let mut g: Vec<u32> = Vec::new();
    let mut h: Vec<u32> = Vec::new();
    let mut s: Vec<u32> = Vec::new();

    let mut m = 1usize;
    let mut first_level = true;
    while m < plan.max_bucket as usize {
        g.clear();
        h.clear();
        s.clear();
        for kl in chunk.clone() {
            let start = plan.offsets[kl] as usize - span_start;
            let end = plan.offsets[kl + 1] as usize - span_start;
            let mut ptr = start;
            while ptr + m < end {
                g.push(ptr as u32);
                h.push((ptr + m) as u32);
                s.push(ptr as u32);
                ptr += 2 * m;
            }
        }
        if !g.is_empty() {
            // First level: pairs are distinct input points, statistically
            // independent, so the classification-free path is sound for
            // random inputs. Later levels see partial sums, where equal-x
            // collisions stop being negligible.
            if first_level && !run.use_safe {
                batch_add_unsafe(curve, points, &g, &h, &s, &mut scratch);
            } else {
                batch_add(curve, points, &g, &h, &s, &mut scratch);
            }
        }
        first_level = false;
        m *= 2;
    }
}
