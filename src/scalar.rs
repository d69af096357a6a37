//! Scalar decomposition and windowing.
//!
//! Full scalars are split by the curve endomorphism: `s ≡ s0 + λ·s1 (mod q)`
//! with `|s0|, |s1| < 2^128`, so the bucket pipeline only ever walks
//! half-length scalars. Decomposition is Babai rounding against the curve's
//! reduced lattice basis, with the two divisions replaced by multiplications
//! by Barrett constants fixed at engine init.
//!
//! Windowing uses signed `c`-bit digits: a slice value above `2^(c−1)` is
//! replaced by its complement and a carry into the next window, which keeps
//! every bucket label in `[1, 2^(c−1)]` at the cost of a point negation.

use crate::bigint;
use crate::params::{EndoParams, Signed128};

/// One GLV half: a magnitude below `2^128` plus a sign.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HalfScalar {
    pub mag: u128,
    pub neg: bool,
}

/// Signed Barrett constant `round(2^384·x / det)`.
struct BarrettConst {
    mag: Vec<u64>,
    neg: bool,
}

/// Lattice row as two's-complement 256-bit values, ready for the residual
/// computation.
struct RowTc {
    a: [u64; 4],
    b: [u64; 4],
}

pub struct GlvDecomposer {
    order: [u64; 4],
    g1: BarrettConst,
    g2: BarrettConst,
    v1: RowTc,
    v2: RowTc,
}

const SHIFT: usize = 384;

fn signed_to_tc(s: &Signed128) -> [u64; 4] {
    let mut t = [s.mag[0], s.mag[1], 0, 0];
    if s.neg {
        bigint::neg_assign(&mut t);
    }
    t
}

fn barrett(x: &Signed128, det_mag: &[u64; 4], det_neg: bool) -> BarrettConst {
    // numerator = |x| · 2^384
    let mut num = vec![0u64; SHIFT / 64 + 2];
    num[SHIFT / 64] = x.mag[0];
    num[SHIFT / 64 + 1] = x.mag[1];
    let (mut quot, rem) = bigint::div_rem(&num, det_mag);
    // round to nearest (ties away from zero; the half-integer case cannot
    // occur for odd `det`)
    let mut twice = rem.clone();
    twice.push(0);
    bigint::shl1(&mut twice);
    let det_ext: Vec<u64> = det_mag.iter().copied().chain(std::iter::once(0)).collect();
    if bigint::cmp(&twice, &det_ext) != std::cmp::Ordering::Less {
        bigint::add_assign(&mut quot, &[1]);
    }
    BarrettConst {
        mag: quot,
        neg: x.neg != det_neg,
    }
}

impl GlvDecomposer {
    pub fn new(order: &[u64; 4], endo: &EndoParams) -> Self {
        GlvDecomposer {
            order: *order,
            g1: barrett(&endo.v2.b, order, endo.neg_det),
            g2: barrett(
                &Signed128 {
                    neg: !endo.v1.b.neg,
                    mag: endo.v1.b.mag,
                },
                order,
                endo.neg_det,
            ),
            v1: RowTc {
                a: signed_to_tc(&endo.v1.a),
                b: signed_to_tc(&endo.v1.b),
            },
            v2: RowTc {
                a: signed_to_tc(&endo.v2.a),
                b: signed_to_tc(&endo.v2.b),
            },
        }
    }

    pub fn order(&self) -> &[u64; 4] {
        &self.order
    }

    /// `⌈bitlen(q)/2⌉`: the bit budget of one half-scalar.
    pub fn half_bits(&self) -> usize {
        (bigint::bit_len(&self.order) + 1) / 2
    }

    /// `round(s · g / 2^384)` as a two's-complement 256-bit value.
    fn rounded_product(s: &[u64; 4], g: &BarrettConst) -> [u64; 4] {
        let mut prod = vec![0u64; 4 + g.mag.len()];
        bigint::mul_wide(&mut prod, s, &g.mag);
        // add 2^383 for rounding, then take limbs above the shift
        let mut half = vec![0u64; SHIFT / 64];
        half[SHIFT / 64 - 1] = 1 << 63;
        bigint::add_assign(&mut prod, &half);
        let mut c = [0u64; 4];
        for (i, limb) in c.iter_mut().enumerate() {
            *limb = prod.get(SHIFT / 64 + i).copied().unwrap_or(0);
        }
        if g.neg {
            bigint::neg_assign(&mut c);
        }
        c
    }

    /// Decompose a full scalar (`< q`, little-endian limbs) into its two
    /// signed halves. `s ≡ s0 + λ·s1 (mod q)` and both magnitudes stay below
    /// `2^128`.
    pub fn decompose(&self, s: &[u64; 4]) -> (HalfScalar, HalfScalar) {
        let c1 = Self::rounded_product(s, &self.g1);
        let c2 = Self::rounded_product(s, &self.g2);

        // s0 = s − c1·a1 − c2·a2, s1 = −(c1·b1 + c2·b2), all mod 2^256
        let mut t = [0u64; 4];
        let mut s0 = *s;
        bigint::mul_lo(&mut t, &c1, &self.v1.a);
        bigint::sub_assign(&mut s0, &t);
        bigint::mul_lo(&mut t, &c2, &self.v2.a);
        bigint::sub_assign(&mut s0, &t);

        let mut s1 = [0u64; 4];
        bigint::mul_lo(&mut t, &c1, &self.v1.b);
        bigint::add_assign(&mut s1, &t);
        bigint::mul_lo(&mut t, &c2, &self.v2.b);
        bigint::add_assign(&mut s1, &t);
        bigint::neg_assign(&mut s1);

        (tc_to_half(s0), tc_to_half(s1))
    }
}

fn tc_to_half(mut v: [u64; 4]) -> HalfScalar {
    let neg = v[3] >> 63 == 1;
    if neg {
        bigint::neg_assign(&mut v);
    }
    debug_assert_eq!(v[2], 0);
    debug_assert_eq!(v[3], 0);
    HalfScalar {
        mag: v[0] as u128 | (v[1] as u128) << 64,
        neg,
    }
}

/// The unsigned `width`-bit window of `s` starting at bit `offset`;
/// out-of-range bits read as zero.
#[inline]
pub fn extract_bit_slice(s: u128, offset: u32, width: u32) -> u32 {
    debug_assert!(width >= 1 && width <= 31);
    if offset >= 128 {
        return 0;
    }
    (s >> offset) as u32 & ((1u32 << width) - 1)
}

/// Bit 31 of a packed slice marks the carry (sign flip).
pub const SLICE_CARRY: u32 = 1 << 31;

/// Write the `n_windows` signed `c`-bit digits of `mag` into `out`, packed as
/// `label | (carry << 31)`. Labels land in `[0, 2^(c−1)]`; the final carry is
/// absorbed by the top window.
pub fn signed_slices(mag: u128, c: u32, out: &mut [u32]) {
    let top = 1u32 << (c - 1);
    let mut carry = 0u32;
    for (k, slot) in out.iter_mut().enumerate() {
        let raw = extract_bit_slice(mag, k as u32 * c, c) + carry;
        if raw > top {
            *slot = ((1u32 << c) - raw) | SLICE_CARRY;
            carry = 1;
        } else {
            *slot = raw;
            carry = 0;
        }
    }
    debug_assert_eq!(carry, 0, "window count too small for the digit carry");
}

/// Number of windows needed for one half-scalar plus its carry bit.
pub fn window_count(half_bits: usize, c: u32) -> usize {
    (half_bits + 1).div_ceil(c as usize)
}
