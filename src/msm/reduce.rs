//! Bucket reduction and the final combiner.
//!
//! A window's partition sum is `P_k = Σ l·bucket[k][l]`. Each worker takes
//! whole columns of `2^c0` consecutive labels and computes the column's
//! weighted sum with the triangle/row recurrence:
//!
//! ```text
//! for l from high to low:  row += bucket[l]; triangle += row
//! column = triangle + (lstart − 1)·row
//! ```
//!
//! All arithmetic here is projective: per column the point count is small,
//! so batched-inverse amortisation no longer pays. The main worker then sums
//! each window's columns and folds the windows Horner-style with `c`
//! doublings per step.

use std::sync::Arc;

use super::{MsmRun, Plan};
use crate::arena::PointPtr;
use crate::curve::Projective;
use crate::field::FieldKernel;
use crate::pool::Worker;

pub(crate) fn column_sums<K: FieldKernel>(run: &MsmRun<'_, K>, w: &Worker, plan: &Arc<Plan>) {
    let curve = &run.engine.curve;
    let arena = &run.engine.arena;
    let col_len = 1usize << run.c0;
    let total_cols = run.windows * run.cols_per_window;

    for ci in w.range(total_cols) {
        let k = ci / run.cols_per_window;
        let jcol = ci % run.cols_per_window;
        let lstart = 1 + jcol * col_len;
        let len = col_len.min(run.l_max + 1 - lstart);

        let mut row = curve.identity_projective();
        let mut triangle = curve.identity_projective();
        for l in (lstart..lstart + len).rev() {
            let kl = k * run.l_max + (l - 1);
            let b_start = plan.offsets[kl];
            let b_end = plan.offsets[kl + 1];
            if b_start < b_end {
                // the accumulation tree left the bucket sum on its first slot
                let sum = unsafe { arena.read(PointPtr(plan.bucket_base + b_start)) };
                row = curve.add_mixed(&row, &sum);
            }
            triangle = curve.add(&triangle, &row);
        }

        let mut column = triangle;
        if lstart > 1 {
            let weighted = curve.mul_small(&row, &[(lstart - 1) as u64]);
            column = curve.add(&column, &weighted);
        }
        // SAFETY: column indices are partitioned by worker range.
        unsafe { run.columns.set(ci, column) };
    }
}

/// Serial tail on the main worker: window partition sums, then the Horner
/// fold `S ← 2^c·S + P_k` from the top window down.
pub(crate) fn combine<K: FieldKernel>(run: &MsmRun<'_, K>, _plan: &Arc<Plan>) -> Projective<K::Elem> {
    let curve = &run.engine.curve;
    let mut partitions = Vec::with_capacity(run.windows);
    for k in 0..run.windows {
        let mut pk = curve.identity_projective();
        for j in 0..run.cols_per_window {
            // SAFETY: columns are read-only after the reduce barrier.
            let col = unsafe { run.columns.get(k * run.cols_per_window + j) };
            pk = curve.add(&pk, &col);
        }
        partitions.push(pk);
    }

    let mut acc = partitions[run.windows - 1];
    for k in (0..run.windows - 1).rev() {
        for _ in 0..run.c {
            acc = curve.double(&acc);
        }
        acc = curve.add(&acc, &partitions[k]);
    }
    acc
}
