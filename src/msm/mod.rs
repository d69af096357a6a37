//! The multi-scalar multiplication engine.
//!
//! `S = Σ sᵢ·Gᵢ` by the bucket method, staged as barrier-separated phases
//! over the worker pool:
//!
//! 1. **prepare**: GLV-decompose every scalar, expand every point into its
//!    four variants `{G, −G, ψG, −ψG}`, cut signed `c`-bit window slices and
//!    count bucket occupancy (atomic).
//! 2. **sort**: prefix-sum the counts into a flat bucket layout, partition
//!    the label space across workers, then scatter each point variant into
//!    its bucket (counting sort, three passes).
//! 3. **accumulate**: collapse each bucket to a single sum by a tree of
//!    batched affine additions, one shared inversion per batch level.
//! 4. **reduce**: column-wise weighted sums of the bucket sums, projective.
//! 5. **combine**: Horner walk over the window partition sums.
//!
//! The window width `c` and the column width exponent `c0` come from a small
//! table tuned for `N = 2^14 … 2^18`; outside it, `c = log₂N − 1`.

pub(crate) mod accumulate;
pub(crate) mod prepare;
pub(crate) mod reduce;

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use crate::arena::{Arena, PointPtr, SharedSlice};
use crate::bigint;
use crate::curve::{Affine, Curve, Projective};
use crate::errors::{MsmError, Result};
use crate::field::{Field, FieldKernel, KernelInit};
use crate::params::CurveParams;
use crate::pool::{ThreadPool, Worker};
use crate::scalar::{window_count, GlvDecomposer, HalfScalar};

/// Per-call knobs. `None` window parameters defer to the tuning table.
#[derive(Clone, Copy, Debug)]
pub struct MsmOptions {
    pub c: Option<u32>,
    pub c0: Option<u32>,
    /// When `false`, the first accumulation tree level uses the
    /// classification-free batch addition (sound for statistically
    /// independent inputs, silently wrong for adversarial ones); later
    /// levels always classify.
    pub use_safe_additions: bool,
}

impl Default for MsmOptions {
    fn default() -> Self {
        MsmOptions {
            c: None,
            c0: None,
            use_safe_additions: true,
        }
    }
}

/// The `log` half of an MSM result: chosen parameters and per-phase wall
/// times, in phase order.
#[derive(Clone, Debug, Default)]
pub struct MsmStats {
    pub c: u32,
    pub c0: u32,
    pub windows: usize,
    pub bucket_entries: usize,
    pub max_bucket: usize,
    pub phases: Vec<(&'static str, Duration)>,
}

pub struct Engine<K: FieldKernel> {
    curve: Curve<K>,
    glv: GlvDecomposer,
    pool: ThreadPool,
    arena: Arena<Affine<K::Elem>>,
    /// One MSM at a time: the arena and the pool are engine-wide resources.
    msm_guard: Mutex<()>,
}

/// Little-endian 32-byte scalar into limbs.
pub fn parse_scalar(bytes: &[u8; 32]) -> [u64; 4] {
    let mut out = [0u64; 4];
    for (i, chunk) in bytes.chunks_exact(8).enumerate() {
        out[i] = u64::from_le_bytes(chunk.try_into().unwrap());
    }
    out
}

fn pick_windows(n: usize, opts: &MsmOptions) -> (u32, u32) {
    let log_n = usize::BITS - 1 - n.max(2).leading_zeros();
    let (mut c, mut c0) = match log_n {
        14 => (13, 7),
        15 => (14, 8),
        16 => (15, 8),
        17 => (16, 8),
        18 => (16, 9),
        _ => {
            let c = log_n.saturating_sub(1).clamp(2, 16);
            (c, (c / 2).max(1))
        }
    };
    if let Some(forced) = opts.c {
        c = forced.clamp(2, 20);
        c0 = (c / 2).max(1);
    }
    if let Some(forced) = opts.c0 {
        c0 = forced;
    }
    c0 = c0.clamp(1, c - 1);
    (c, c0)
}

impl<K: KernelInit> Engine<K> {
    /// Build the arithmetic stack for one curve: kernel, Montgomery and
    /// Tonelli constants, endomorphism/GLV tables. Fails when the modulus
    /// does not fit the kernel or the parameters are inconsistent.
    pub fn create(params: &CurveParams) -> Result<Self> {
        Self::from_kernel(K::from_modulus(params.modulus)?, params)
    }
}

impl Engine<crate::field::fp51::Fp51> {
    /// [`Engine::create`] with an explicit multiply backend; the property
    /// tests use this to run the FMA and integer paths side by side.
    pub fn create_with_backend(
        params: &CurveParams,
        backend: crate::field::fp51::Backend,
    ) -> Result<Self> {
        Self::from_kernel(crate::field::fp51::Fp51::new(params.modulus, backend)?, params)
    }
}

impl<K: FieldKernel> Engine<K> {
    fn from_kernel(kernel: K, params: &CurveParams) -> Result<Self> {
        let field = Field::new(kernel)?;
        let curve = Curve::new(field, params)?;
        let glv = GlvDecomposer::new(&params.order, &params.endo);
        Ok(Engine {
            curve,
            glv,
            pool: ThreadPool::new(),
            arena: Arena::new(),
            msm_guard: Mutex::new(()),
        })
    }

    pub fn curve(&self) -> &Curve<K> {
        &self.curve
    }

    pub fn start_threads(&mut self, threads: usize) -> Result<()> {
        self.pool.start(threads)
    }

    pub fn stop_threads(&mut self) -> Result<()> {
        self.pool.stop()
    }

    /// `Σ sᵢ·Gᵢ`. Scalars are little-endian 32-byte integers below the group
    /// order; points are internal affine form (see
    /// [`Curve::point_from_bytes`]) and must lie in the prime-order
    /// subgroup, or the endomorphism split is unsound.
    #[tracing::instrument(skip_all, fields(n = scalars.len()))]
    pub fn msm(
        &self,
        scalars: &[[u8; 32]],
        points: &[Affine<K::Elem>],
        opts: &MsmOptions,
    ) -> Result<(Projective<K::Elem>, MsmStats)> {
        if scalars.len() != points.len() {
            return Err(MsmError::LengthMismatch {
                scalars: scalars.len(),
                points: points.len(),
            });
        }
        let n = points.len();
        if n == 0 {
            return Ok((self.curve.identity_projective(), MsmStats::default()));
        }

        let order = self.glv.order();
        let mut parsed = Vec::with_capacity(n);
        for (i, bytes) in scalars.iter().enumerate() {
            let s = parse_scalar(bytes);
            if bigint::cmp(&s, order) != std::cmp::Ordering::Less {
                return Err(MsmError::ScalarOutOfRange(i));
            }
            parsed.push(s);
        }

        let (c, c0) = pick_windows(n, opts);
        let windows = window_count(self.glv.half_bits(), c);
        let l_max = 1usize << (c - 1);
        let cols_per_window = l_max.div_ceil(1usize << c0);

        let _exclusive = self.msm_guard.lock().unwrap();
        self.arena.ensure_capacity(4 * n + 2 * n * windows);
        let mark = self.arena.save();
        let expanded = self.arena.alloc(4 * n);

        let mut halves = vec![HalfScalar::default(); 2 * n];
        let mut slices = vec![0u32; windows * 2 * n];
        let counts: Vec<AtomicU32> = (0..windows * l_max).map(|_| AtomicU32::new(0)).collect();
        let mut fill = vec![0u32; windows * l_max];
        let identity = self.curve.identity_projective();
        let mut columns = vec![identity; windows * cols_per_window];
        let max_bucket = AtomicU32::new(0);
        let result = ResultCell(UnsafeCell::new(identity));
        let timings: Mutex<Vec<(&'static str, Duration)>> = Mutex::new(Vec::new());

        let run = MsmRun {
            engine: self,
            n,
            c,
            c0,
            windows,
            l_max,
            scalars: &parsed,
            points,
            expanded,
            halves: SharedSlice::new(&mut halves),
            slices: SharedSlice::new(&mut slices),
            counts: &counts,
            fill: SharedSlice::new(&mut fill),
            columns: SharedSlice::new(&mut columns),
            cols_per_window,
            max_bucket: &max_bucket,
            result: &result,
            use_safe: opts.use_safe_additions,
            timings: &timings,
        };
        self.pool.run(&|w| run.execute(w));

        self.arena.restore(mark);
        let stats = MsmStats {
            c,
            c0,
            windows,
            bucket_entries: counts.iter().map(|c| c.load(Ordering::Relaxed) as usize).sum(),
            max_bucket: max_bucket.load(Ordering::Relaxed) as usize,
            phases: timings.into_inner().unwrap(),
        };
        tracing::debug!(
            c = stats.c,
            windows = stats.windows,
            entries = stats.bucket_entries,
            "msm done"
        );
        Ok((result.0.into_inner(), stats))
    }

    /// [`Engine::msm`] with `use_safe_additions = false`.
    pub fn msm_unsafe(
        &self,
        scalars: &[[u8; 32]],
        points: &[Affine<K::Elem>],
        opts: &MsmOptions,
    ) -> Result<(Projective<K::Elem>, MsmStats)> {
        let opts = MsmOptions {
            use_safe_additions: false,
            ..*opts
        };
        self.msm(scalars, points, &opts)
    }

    pub fn to_affine(&self, p: &Projective<K::Elem>) -> Affine<K::Elem> {
        self.curve.to_affine(p)
    }

    /// Uniform scalars below the group order, as little-endian bytes.
    pub fn random_scalars<R: Rng>(&self, n: usize, rng: &mut R) -> Vec<[u8; 32]> {
        let order = self.glv.order();
        (0..n)
            .map(|_| loop {
                let limbs: [u64; 4] = rng.gen();
                if bigint::cmp(&limbs, order) == std::cmp::Ordering::Less {
                    let mut bytes = [0u8; 32];
                    for (chunk, limb) in bytes.chunks_exact_mut(8).zip(limbs.iter()) {
                        chunk.copy_from_slice(&limb.to_le_bytes());
                    }
                    break bytes;
                }
            })
            .collect()
    }

    /// Pseudorandom subgroup points: sample x until x³ + b is square, take a
    /// root, clear the cofactor. Deterministic in `seed`.
    pub fn random_points_fast(&self, n: usize, seed: u64) -> Vec<Affine<K::Elem>> {
        let cofactor = self.curve.cofactor();
        let clear_cofactor = cofactor != [1, 0];
        (0..n)
            .into_par_iter()
            .map(|i| {
                let mut rng = rand::rngs::StdRng::seed_from_u64(seed ^ (i as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15));
                let point = self.sample_curve_point(&mut rng);
                if clear_cofactor {
                    let cleared = self
                        .curve
                        .mul_small(&self.curve.from_affine(&point), &cofactor);
                    self.curve.to_affine(&cleared)
                } else {
                    point
                }
            })
            .collect()
    }

    fn sample_curve_point<R: Rng>(&self, rng: &mut R) -> Affine<K::Elem> {
        let field = &self.curve.field;
        let k = &field.kernel;
        let p = k.modulus_u64();
        loop {
            let limbs: Vec<u64> = (0..p.len()).map(|_| rng.gen()).collect();
            if bigint::cmp(&limbs, p) != std::cmp::Ordering::Less {
                continue;
            }
            let x = field.to_mont(&k.from_int(&limbs));
            let candidate = Affine {
                x,
                y: k.zero(),
                nonzero: true,
            };
            // rhs = x³ + b, reusing the curve check's arithmetic
            let rhs = {
                let x3 = k.mul(&k.square(&x), &x);
                k.add(&x3, self.curve.b_mont())
            };
            if let Some(y) = field.sqrt(&rhs) {
                let mut point = candidate;
                point.y = y;
                debug_assert!(self.curve.is_on_curve(&point));
                return point;
            }
        }
    }
}

pub(crate) struct ResultCell<E>(UnsafeCell<Projective<E>>);
// SAFETY: written only by the main worker in the final phase, read after the
// pool job completes.
unsafe impl<E: Send> Sync for ResultCell<E> {}

/// Everything one MSM call shares across workers. All interior mutability is
/// phase-disciplined; see `arena`.
pub(crate) struct MsmRun<'a, K: FieldKernel> {
    pub engine: &'a Engine<K>,
    pub n: usize,
    pub c: u32,
    pub c0: u32,
    pub windows: usize,
    /// Bucket labels run `1..=l_max`, `l_max = 2^(c−1)`.
    pub l_max: usize,
    pub scalars: &'a [[u64; 4]],
    pub points: &'a [Affine<K::Elem>],
    /// Arena range of the 4-variant point expansion.
    pub expanded: PointPtr,
    pub halves: SharedSlice<'a, HalfScalar>,
    /// `slices[k·2n + j]`: packed signed digit of half-scalar `j`, window `k`.
    pub slices: SharedSlice<'a, u32>,
    /// `counts[k·l_max + (l−1)]`: occupancy of bucket `(k, l)`.
    pub counts: &'a [AtomicU32],
    /// Scatter cursors, same indexing as `counts`.
    pub fill: SharedSlice<'a, u32>,
    pub columns: SharedSlice<'a, Projective<K::Elem>>,
    pub cols_per_window: usize,
    pub max_bucket: &'a AtomicU32,
    pub result: &'a ResultCell<K::Elem>,
    pub use_safe: bool,
    pub timings: &'a Mutex<Vec<(&'static str, Duration)>>,
}

/// The sort layout every worker needs after the counting pass: flat bucket
/// offsets, the balanced label-space partition, and the bucket region base.
pub(crate) struct Plan {
    /// `offsets[kl]..offsets[kl + 1]` is bucket `kl`'s point range,
    /// `kl = k·l_max + (l − 1)`.
    pub offsets: Vec<u32>,
    /// `chunks[t]..chunks[t + 1]` is worker `t`'s slice of the label space.
    pub chunks: Vec<usize>,
    pub bucket_base: u32,
    pub max_bucket: u32,
}

impl<K: FieldKernel> MsmRun<'_, K> {
    fn execute(&self, w: &Worker) {
        let mut mark = Instant::now();
        prepare::decompose_and_slice(self, w);
        w.barrier();
        self.lap(w, "prepare", &mut mark);

        let plan: Arc<Plan> = w.broadcast(|| prepare::build_plan(self, w.count));
        prepare::scatter(self, w, &plan);
        w.barrier();
        self.lap(w, "sort", &mut mark);

        accumulate::bucket_trees(self, w, &plan);
        w.barrier();
        self.lap(w, "accumulate", &mut mark);

        reduce::column_sums(self, w, &plan);
        w.barrier();
        self.lap(w, "reduce", &mut mark);

        if w.is_main() {
            let total = reduce::combine(self, &plan);
            // SAFETY: main worker exclusively, after the last barrier.
            unsafe { *self.result.0.get() = total };
            self.lap(w, "combine", &mut mark);
        }
    }

    fn lap(&self, w: &Worker, name: &'static str, mark: &mut Instant) {
        if w.is_main() {
            self.timings.lock().unwrap().push((name, mark.elapsed()));
            *mark = Instant::now();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::fp51::Fp51;

    fn engine() -> Engine<Fp51> {
        Engine::<Fp51>::create(&CurveParams::bn254()).unwrap()
    }

    fn scalar_bytes(v: u64) -> [u8; 32] {
        let mut b = [0u8; 32];
        b[..8].copy_from_slice(&v.to_le_bytes());
        b
    }

    #[test]
    fn window_table_and_defaults() {
        let opts = MsmOptions::default();
        assert_eq!(pick_windows(1 << 14, &opts), (13, 7));
        assert_eq!(pick_windows(1 << 18, &opts), (16, 9));
        let (c, c0) = pick_windows(1 << 10, &opts);
        assert_eq!(c, 9);
        assert_eq!(c0, 4);
        let forced = MsmOptions {
            c: Some(6),
            c0: Some(9),
            ..MsmOptions::default()
        };
        // c0 is clamped below c
        assert_eq!(pick_windows(1 << 14, &forced), (6, 5));
    }

    #[test]
    fn empty_and_mismatched_inputs() {
        let e = engine();
        let (zero, _) = e.msm(&[], &[], &MsmOptions::default()).unwrap();
        assert!(e.curve.is_identity(&zero));
        let g = e.curve.generator();
        assert!(matches!(
            e.msm(&[], &[g], &MsmOptions::default()),
            Err(MsmError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn scalar_at_or_above_order_is_rejected() {
        let e = engine();
        let g = e.curve.generator();
        let mut q_bytes = [0u8; 32];
        for (chunk, limb) in q_bytes.chunks_exact_mut(8).zip(e.glv.order().iter()) {
            chunk.copy_from_slice(&limb.to_le_bytes());
        }
        assert!(matches!(
            e.msm(&[q_bytes], &[g], &MsmOptions::default()),
            Err(MsmError::ScalarOutOfRange(0))
        ));
    }

    #[test]
    fn single_pair_matches_double_and_add() {
        let e = engine();
        let g = e.curve.generator();
        for v in [0u64, 1, 2, 5, 1023, u64::MAX] {
            let (acc, _) = e.msm(&[scalar_bytes(v)], &[g], &MsmOptions::default()).unwrap();
            let reference = e.curve.mul_small(&e.curve.from_affine(&g), &[v]);
            assert!(e.curve.equal_projective(&acc, &reference), "scalar {v}");
        }
    }

    #[test]
    fn identity_points_are_skipped() {
        let e = engine();
        let g = e.curve.generator();
        let id = e.curve.identity_affine();
        let scalars = [scalar_bytes(7), scalar_bytes(9), scalar_bytes(11)];
        let (with_id, _) = e
            .msm(&scalars, &[g, id, g], &MsmOptions::default())
            .unwrap();
        let (without, _) = e
            .msm(
                &[scalar_bytes(7), scalar_bytes(11)],
                &[g, g],
                &MsmOptions::default(),
            )
            .unwrap();
        assert!(e.curve.equal_projective(&with_id, &without));
    }
}
