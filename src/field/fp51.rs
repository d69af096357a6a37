//! 5×51-bit Montgomery multiplication kernel.
//!
//! A field element is five 64-bit limbs, each holding a value below `2^51`
//! in canonical form (intermediates may reach `2^52`). Multiplication runs
//! an Emmart-style inner loop: each 51×51-bit partial product is split into
//! a high and a low part by a pair of fused multiply-adds against the
//! constants `C103 = 2^103` and `C2 = C103 + 3·2^51`, whose IEEE-754 bit
//! patterns are accumulated directly into wrapping `i64` lanes. The
//! systematic exponent bias those bit patterns carry is cancelled by
//! per-iteration offset constants, so the accumulation stays exact.
//!
//! The integer backend reproduces the FMA path bit for bit: it forms the
//! 102-bit product from a `(lo26, hi25)` split of each limb and applies
//! round-to-nearest-even at bit 51, which is precisely what the FMA pair
//! computes on this operand range. Property tests assert the bit identity.
//!
//! Montgomery radix `R = 2^255`. Weak reduction bound: `p + 2^204` (one
//! conditional `−p` after the inner loop, gated on the top limb). The kernel
//! requires `p + 2^206 < 2^255`.

use super::FieldKernel;
use crate::bigint;
use crate::errors::{MsmError, Result};

pub const LIMBS: usize = 5;
pub const LIMB_BITS: u32 = 51;
const MASK51: u64 = (1 << 51) - 1;
const MASK26: u64 = (1 << 26) - 1;
const MASK25: u64 = (1 << 25) - 1;

/// Which inner loop the kernel runs. Outputs are bit-identical; `Fma` is the
/// fast path on hardware with fused multiply-add.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Backend {
    Fma,
    Integer,
}

impl Backend {
    /// Pick the FMA path where the target compiles `f64::mul_add` to a fused
    /// instruction; fall back to the integer path elsewhere (a libm fma call
    /// per partial product would dominate the multiply).
    pub fn detect() -> Backend {
        if cfg!(any(target_feature = "fma", target_arch = "aarch64")) {
            Backend::Fma
        } else {
            Backend::Integer
        }
    }
}

pub struct Fp51 {
    backend: Backend,
    /// Modulus in 51-bit limbs, and as doubles for the FMA passes.
    p: [u64; LIMBS],
    p_f: [f64; LIMBS],
    /// `(−p)^{−1} mod 2^51`.
    np_inv: u64,
    /// Weak-reduction gate: values with top limb above `p[4]` get one `−p`.
    p_top: u64,
    p_u64: Vec<u64>,
    modulus_bits: usize,
    /// FMA split constants and the per-iteration accumulator offsets that
    /// cancel the exponent bias of the accumulated bit patterns.
    c103: f64,
    c2: f64,
    z_iter: [i64; LIMBS + 1],
}

impl Fp51 {
    pub fn new(modulus: &[u64], backend: Backend) -> Result<Self> {
        if modulus.len() != 4 {
            return Err(MsmError::InvalidParameters(
                "fp51 kernel expects a four-limb modulus".into(),
            ));
        }
        if !bigint::bit(modulus, 0) {
            return Err(MsmError::InvalidParameters("modulus must be odd".into()));
        }
        // p + 2^206 < 2^255
        let mut probe = [modulus[0], modulus[1], modulus[2], modulus[3], 0];
        let mut shift = [0u64; 5];
        shift[3] = 1 << (206 - 192);
        bigint::add_assign(&mut probe, &shift);
        if bigint::bit_len(&probe) > 255 {
            return Err(MsmError::InvalidParameters(
                "modulus too large for the 5x51 kernel".into(),
            ));
        }

        let p = unpack(modulus);
        // Newton iteration for p^{−1} mod 2^51, then negate.
        let mut inv = 1u64;
        for _ in 0..6 {
            inv = inv
                .wrapping_mul(2u64.wrapping_sub(pack_low(&p).wrapping_mul(inv)))
                & MASK51;
        }
        debug_assert_eq!(pack_low(&p).wrapping_mul(inv) & MASK51, 1);
        let np_inv = inv.wrapping_neg() & MASK51;

        let c103 = (2.0f64).powi(103);
        let c51 = (2.0f64).powi(51);
        let c2 = c103 + 3.0 * c51;
        // bits(hi) = BIAS_HI + h, bits(lo) = BIAS_LO + l (see module docs)
        let bias_hi = ((1023u64 + 103) << 52) as i64;
        let bias_lo = (((1023u64 + 52) << 52) + (1u64 << 51)) as i64;
        // Per outer iteration: lane 0 takes two low adds, lanes 1..=4 two of
        // each, lane 5 two high adds.
        let mut z_iter = [0i64; LIMBS + 1];
        z_iter[0] = bias_lo.wrapping_mul(2).wrapping_neg();
        for lane in z_iter.iter_mut().take(LIMBS).skip(1) {
            *lane = bias_lo.wrapping_add(bias_hi).wrapping_mul(2).wrapping_neg();
        }
        z_iter[LIMBS] = bias_hi.wrapping_mul(2).wrapping_neg();

        let mut p_f = [0.0f64; LIMBS];
        for (dst, &limb) in p_f.iter_mut().zip(p.iter()) {
            *dst = limb as f64;
        }

        Ok(Fp51 {
            backend,
            p,
            p_f,
            np_inv,
            p_top: p[LIMBS - 1],
            p_u64: modulus.to_vec(),
            modulus_bits: bigint::bit_len(modulus),
            c103,
            c2,
            z_iter,
        })
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    fn mont_mul<const REDUCE: bool>(&self, x: &[u64; LIMBS], y: &[u64; LIMBS]) -> [u64; LIMBS] {
        debug_assert!(x.iter().all(|&l| l < (1 << 51)));
        debug_assert!(y.iter().all(|&l| l < (1 << 51)));
        let z = match self.backend {
            Backend::Fma => self.accumulate_fma(x, y),
            Backend::Integer => self.accumulate_int(x, y),
        };
        // Signed carry propagation to canonical non-negative limbs.
        let mut out = [0u64; LIMBS];
        let mut carry = 0i64;
        for j in 0..LIMBS - 1 {
            let t = z[j] + carry;
            carry = t >> 51;
            out[j] = (t & MASK51 as i64) as u64;
        }
        let top = z[LIMBS - 1] + carry;
        debug_assert!(top >= 0);
        out[LIMBS - 1] = top as u64;
        if REDUCE {
            self.reduce_in_place(&mut out);
        }
        out
    }

    fn accumulate_fma(&self, x: &[u64; LIMBS], y: &[u64; LIMBS]) -> [i64; LIMBS] {
        let mut yf = [0.0f64; LIMBS];
        for (dst, &limb) in yf.iter_mut().zip(y.iter()) {
            *dst = limb as f64;
        }
        let mut z = [0i64; LIMBS + 1];
        for i in 0..LIMBS {
            for (lane, bias) in z.iter_mut().zip(self.z_iter.iter()) {
                *lane = lane.wrapping_add(*bias);
            }
            let xi = x[i] as f64;
            for j in 0..LIMBS {
                let hi = xi.mul_add(yf[j], self.c103);
                let lo = xi.mul_add(yf[j], self.c2 - hi);
                z[j + 1] = z[j + 1].wrapping_add(hi.to_bits() as i64);
                z[j] = z[j].wrapping_add(lo.to_bits() as i64);
            }
            let q = ((z[0] as u64).wrapping_mul(self.np_inv) & MASK51) as f64;
            for j in 0..LIMBS {
                let hi = q.mul_add(self.p_f[j], self.c103);
                let lo = q.mul_add(self.p_f[j], self.c2 - hi);
                z[j + 1] = z[j + 1].wrapping_add(hi.to_bits() as i64);
                z[j] = z[j].wrapping_add(lo.to_bits() as i64);
            }
            debug_assert_eq!(z[0] as u64 & MASK51, 0);
            let carry = z[0] >> 51;
            z = [z[1].wrapping_add(carry), z[2], z[3], z[4], z[5], 0];
        }
        [z[0], z[1], z[2], z[3], z[4]]
    }

    fn accumulate_int(&self, x: &[u64; LIMBS], y: &[u64; LIMBS]) -> [i64; LIMBS] {
        let mut z = [0i64; LIMBS + 1];
        for i in 0..LIMBS {
            let xi = x[i];
            for j in 0..LIMBS {
                let (h, l) = split_51(xi, y[j]);
                z[j + 1] += h;
                z[j] += l;
            }
            let q = (z[0] as u64).wrapping_mul(self.np_inv) & MASK51;
            for j in 0..LIMBS {
                let (h, l) = split_51(q, self.p[j]);
                z[j + 1] += h;
                z[j] += l;
            }
            debug_assert_eq!(z[0] as u64 & MASK51, 0);
            let carry = z[0] >> 51;
            z = [z[1] + carry, z[2], z[3], z[4], z[5], 0];
        }
        [z[0], z[1], z[2], z[3], z[4]]
    }

    /// Conditional `−p`, keyed on the top limb. Subtracting while the limb
    /// sits above `p`'s leaves the value below `(p_top + 1)·2^204 ≤
    /// p + 2^204`; a multiply needs one pass, an addition at most two.
    fn reduce_in_place(&self, x: &mut [u64; LIMBS]) {
        while x[LIMBS - 1] > self.p_top {
            let mut carry = 0i64;
            for j in 0..LIMBS {
                let t = x[j] as i64 - self.p[j] as i64 + carry;
                carry = t >> 51;
                x[j] = (t & MASK51 as i64) as u64;
            }
            debug_assert_eq!(carry, 0);
        }
    }
}

/// High/low split of `x·y` at bit 51 with round-to-nearest-even, matching
/// the FMA pair exactly: `h = RN(x·y / 2^51)`, `l = x·y − h·2^51`.
#[inline]
fn split_51(x: u64, y: u64) -> (i64, i64) {
    let (xl, xh) = (x & MASK26, x >> 26);
    let (yl, yh) = (y & MASK26, y >> 26);
    let ll = xl * yl;
    let mid = xl * yh + xh * yl;
    let hh = xh * yh;
    let t0 = ll + ((mid & MASK25) << 26);
    let low = t0 & MASK51;
    let mut h = (hh << 1) + (mid >> 25) + (t0 >> 51);
    let mut l = low as i64;
    let half = 1u64 << 50;
    if low > half || (low == half && h & 1 == 1) {
        h += 1;
        l -= 1 << 51;
    }
    (h as i64, l)
}

fn unpack(a: &[u64]) -> [u64; LIMBS] {
    [
        a[0] & MASK51,
        (a[0] >> 51 | a[1] << 13) & MASK51,
        (a[1] >> 38 | a[2] << 26) & MASK51,
        (a[2] >> 25 | a[3] << 39) & MASK51,
        a[3] >> 12,
    ]
}

fn pack(l: &[u64; LIMBS]) -> [u64; 4] {
    [
        l[0] | l[1] << 51,
        l[1] >> 13 | l[2] << 38,
        l[2] >> 26 | l[3] << 25,
        l[3] >> 39 | l[4] << 12,
    ]
}

fn pack_low(l: &[u64; LIMBS]) -> u64 {
    l[0] | l[1] << 51
}

impl FieldKernel for Fp51 {
    type Elem = [u64; LIMBS];

    fn modulus_bits(&self) -> usize {
        self.modulus_bits
    }

    fn radix_bits(&self) -> usize {
        LIMBS * LIMB_BITS as usize
    }

    fn encoded_len(&self) -> usize {
        (self.modulus_bits + 7) / 8
    }

    fn modulus_u64(&self) -> &[u64] {
        &self.p_u64
    }

    fn zero(&self) -> Self::Elem {
        [0; LIMBS]
    }

    fn mul(&self, x: &Self::Elem, y: &Self::Elem) -> Self::Elem {
        self.mont_mul::<true>(x, y)
    }

    fn mul_raw(&self, x: &Self::Elem, y: &Self::Elem) -> Self::Elem {
        self.mont_mul::<false>(x, y)
    }

    fn add(&self, x: &Self::Elem, y: &Self::Elem) -> Self::Elem {
        let mut t = [0u64; LIMBS];
        let mut carry = 0u64;
        for j in 0..LIMBS {
            let s = x[j] + y[j] + carry;
            carry = s >> 51;
            t[j] = s & MASK51;
        }
        t[LIMBS - 1] |= carry << 51;
        self.reduce_in_place(&mut t);
        t
    }

    fn sub(&self, x: &Self::Elem, y: &Self::Elem) -> Self::Elem {
        let mut t = [0i64; LIMBS];
        for j in 0..LIMBS {
            t[j] = x[j] as i64 - y[j] as i64;
        }
        // Up to two corrective `+p` passes keep the result non-negative; loop
        // until the propagated carry clears.
        loop {
            let mut carry = 0i64;
            for limb in t.iter_mut() {
                let s = *limb + carry;
                carry = s >> 51;
                *limb = s & MASK51 as i64;
            }
            if carry == 0 {
                break;
            }
            debug_assert_eq!(carry, -1);
            for (limb, &p_limb) in t.iter_mut().zip(self.p.iter()) {
                *limb += p_limb as i64;
            }
        }
        let mut out = [0u64; LIMBS];
        for (dst, &limb) in out.iter_mut().zip(t.iter()) {
            *dst = limb as u64;
        }
        out
    }

    fn neg(&self, x: &Self::Elem) -> Self::Elem {
        self.sub(&self.zero(), x)
    }

    fn reduce(&self, x: &mut Self::Elem) {
        self.reduce_in_place(x);
    }

    fn fully_reduce(&self, x: &mut Self::Elem) {
        self.reduce_in_place(x);
        // now < p + 2^204 < 2p: at most one more subtraction, decided by a
        // lexicographic compare
        let ge = x
            .iter()
            .zip(self.p.iter())
            .rev()
            .find(|(a, b)| a != b)
            .map_or(true, |(a, b)| a > b);
        if ge {
            let mut carry = 0i64;
            for j in 0..LIMBS {
                let t = x[j] as i64 - self.p[j] as i64 + carry;
                carry = t >> 51;
                x[j] = (t & MASK51 as i64) as u64;
            }
            debug_assert_eq!(carry, 0);
        }
    }

    fn equals(&self, x: &Self::Elem, y: &Self::Elem) -> bool {
        let mut a = *x;
        let mut b = *y;
        self.fully_reduce(&mut a);
        self.fully_reduce(&mut b);
        a == b
    }

    fn is_zero(&self, x: &Self::Elem) -> bool {
        let mut a = *x;
        self.fully_reduce(&mut a);
        a == [0; LIMBS]
    }

    fn is_greater(&self, x: &Self::Elem, y: &Self::Elem) -> bool {
        let mut a = *x;
        let mut b = *y;
        self.fully_reduce(&mut a);
        self.fully_reduce(&mut b);
        for j in (0..LIMBS).rev() {
            if a[j] != b[j] {
                return a[j] > b[j];
            }
        }
        false
    }

    fn to_int(&self, x: &Self::Elem) -> Vec<u64> {
        let mut a = *x;
        self.fully_reduce(&mut a);
        pack(&a).to_vec()
    }

    fn from_int(&self, limbs: &[u64]) -> Self::Elem {
        let mut a = [0u64; 4];
        a[..limbs.len().min(4)].copy_from_slice(&limbs[..limbs.len().min(4)]);
        unpack(&a)
    }
}
