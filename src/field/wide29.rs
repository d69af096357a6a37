//! 16×29-bit Montgomery multiplication kernel for moduli past the 255-bit
//! bound of `fp51` (the BLS12-381 base field in particular).
//!
//! Limbs are 29-bit values in `u32` lanes; the inner loop is operand
//! scanning with `u64` accumulators. With 16 limbs the peak accumulator
//! magnitude stays below `2^63.2`, so no mid-loop spills are needed.
//! Montgomery radix `R = 2^464`. The weak reduction bound for this kernel is
//! `2p` (a multiply lands below `p` plus a few hundred bits of slack, so no
//! trailing conditional subtraction exists on the multiply path at all).

use super::FieldKernel;
use crate::bigint;
use crate::errors::{MsmError, Result};

pub const LIMBS: usize = 16;
pub const LIMB_BITS: u32 = 29;
const MASK29: u32 = (1 << 29) - 1;

/// Largest supported modulus width; leaves 16 bits of headroom under the
/// 464-bit radix so `2p` and carry slack stay representable.
const MAX_MODULUS_BITS: usize = 448;

pub struct Wide29 {
    p: [u32; LIMBS],
    two_p: [u32; LIMBS],
    /// `(−p)^{−1} mod 2^29`.
    np_inv: u32,
    p_u64: Vec<u64>,
    modulus_bits: usize,
}

impl Wide29 {
    pub fn new(modulus: &[u64]) -> Result<Self> {
        if !bigint::bit(modulus, 0) {
            return Err(MsmError::InvalidParameters("modulus must be odd".into()));
        }
        let modulus_bits = bigint::bit_len(modulus);
        if modulus_bits > MAX_MODULUS_BITS {
            return Err(MsmError::InvalidParameters(
                "modulus too large for the 16x29 kernel".into(),
            ));
        }

        let p = unpack(modulus);
        let mut two_p = [0u32; LIMBS];
        let mut carry = 0u32;
        for j in 0..LIMBS {
            let t = (p[j] << 1) | carry;
            two_p[j] = t & MASK29;
            carry = t >> 29;
        }
        debug_assert_eq!(carry, 0);

        // Newton iteration for p^{−1} mod 2^29.
        let p0 = p[0];
        let mut inv = 1u32;
        for _ in 0..5 {
            inv = inv.wrapping_mul(2u32.wrapping_sub(p0.wrapping_mul(inv))) & MASK29;
        }
        debug_assert_eq!(p0.wrapping_mul(inv) & MASK29, 1);
        let np_inv = inv.wrapping_neg() & MASK29;

        Ok(Wide29 {
            p,
            two_p,
            np_inv,
            p_u64: modulus.to_vec(),
            modulus_bits,
        })
    }

    fn mont_mul(&self, x: &[u32; LIMBS], y: &[u32; LIMBS]) -> [u32; LIMBS] {
        let mut z = [0u64; LIMBS + 1];
        for i in 0..LIMBS {
            let xi = x[i] as u64;
            for j in 0..LIMBS {
                z[j] += xi * y[j] as u64;
            }
            let q = (z[0] as u32).wrapping_mul(self.np_inv) & MASK29;
            let q64 = q as u64;
            for j in 0..LIMBS {
                z[j] += q64 * self.p[j] as u64;
            }
            debug_assert_eq!(z[0] as u32 & MASK29, 0);
            let carry = z[0] >> 29;
            for j in 0..LIMBS {
                z[j] = z[j + 1];
            }
            z[LIMBS] = 0;
            z[0] += carry;
        }
        let mut out = [0u32; LIMBS];
        let mut carry = 0u64;
        for j in 0..LIMBS {
            let t = z[j] + carry;
            out[j] = t as u32 & MASK29;
            carry = t >> 29;
        }
        debug_assert_eq!(carry, 0);
        out
    }

    /// Conditional subtraction keyed on a full compare; used with `m = 2p`
    /// after add/sub and with `m = p` for canonicalisation.
    fn cond_sub(x: &mut [u32; LIMBS], m: &[u32; LIMBS]) {
        for j in (0..LIMBS).rev() {
            if x[j] != m[j] {
                if x[j] < m[j] {
                    return;
                }
                break;
            }
        }
        let mut carry = 0i64;
        for j in 0..LIMBS {
            let t = x[j] as i64 - m[j] as i64 + carry;
            carry = t >> 29;
            x[j] = (t & MASK29 as i64) as u32;
        }
        debug_assert_eq!(carry, 0);
    }
}

fn unpack(a: &[u64]) -> [u32; LIMBS] {
    let mut out = [0u32; LIMBS];
    for (i, limb) in out.iter_mut().enumerate() {
        let bitpos = 29 * i;
        let word = bitpos / 64;
        let off = bitpos % 64;
        let mut v = a.get(word).copied().unwrap_or(0) >> off;
        if off + 29 > 64 {
            v |= a.get(word + 1).copied().unwrap_or(0) << (64 - off);
        }
        *limb = v as u32 & MASK29;
    }
    out
}

fn pack(l: &[u32; LIMBS], width: usize) -> Vec<u64> {
    let mut out = vec![0u64; width];
    for (i, &limb) in l.iter().enumerate() {
        let bitpos = 29 * i;
        let word = bitpos / 64;
        let off = bitpos % 64;
        if word < width {
            out[word] |= (limb as u64) << off;
        }
        if off + 29 > 64 && word + 1 < width {
            out[word + 1] |= (limb as u64) >> (64 - off);
        }
    }
    out
}

impl FieldKernel for Wide29 {
    type Elem = [u32; LIMBS];

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
        self.mont_mul(x, y)
    }

    // A multiply already lands far below the `2p` weak bound, so raw and
    // reduced coincide for this kernel.
    fn mul_raw(&self, x: &Self::Elem, y: &Self::Elem) -> Self::Elem {
        self.mont_mul(x, y)
    }

    fn add(&self, x: &Self::Elem, y: &Self::Elem) -> Self::Elem {
        let mut t = [0u32; LIMBS];
        let mut carry = 0u32;
        for j in 0..LIMBS {
            let s = x[j] + y[j] + carry;
            t[j] = s & MASK29;
            carry = s >> 29;
        }
        debug_assert_eq!(carry, 0);
        Self::cond_sub(&mut t, &self.two_p);
        t
    }

    fn sub(&self, x: &Self::Elem, y: &Self::Elem) -> Self::Elem {
        // x + 2p − y, then one conditional −2p
        let mut t = [0i64; LIMBS];
        for j in 0..LIMBS {
            t[j] = x[j] as i64 + self.two_p[j] as i64 - y[j] as i64;
        }
        let mut out = [0u32; LIMBS];
        let mut carry = 0i64;
        for j in 0..LIMBS {
            let s = t[j] + carry;
            carry = s >> 29;
            out[j] = (s & MASK29 as i64) as u32;
        }
        debug_assert_eq!(carry, 0);
        Self::cond_sub(&mut out, &self.two_p);
        out
    }

    fn neg(&self, x: &Self::Elem) -> Self::Elem {
        self.sub(&self.zero(), x)
    }

    fn reduce(&self, _x: &mut Self::Elem) {
        // weak bound for this kernel is 2p; nothing to do
    }

    fn fully_reduce(&self, x: &mut Self::Elem) {
        Self::cond_sub(x, &self.p);
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
        pack(&a, self.p_u64.len())
    }

    fn from_int(&self, limbs: &[u64]) -> Self::Elem {
        unpack(limbs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::CurveParams;
    use rand::{Rng, SeedableRng};

    fn kernel() -> Wide29 {
        Wide29::new(CurveParams::bls12_381().modulus).unwrap()
    }

    fn random_canonical<R: Rng>(k: &Wide29, rng: &mut R) -> [u32; LIMBS] {
        let p = k.modulus_u64();
        loop {
            let mut limbs: Vec<u64> = (0..p.len()).map(|_| rng.gen()).collect();
            // trim to the modulus width to keep the rejection rate sane
            if let Some(top) = limbs.last_mut() {
                *top &= (1 << (k.modulus_bits % 64)) - 1;
            }
            if bigint::cmp(&limbs, p) == std::cmp::Ordering::Less {
                return k.from_int(&limbs);
            }
        }
    }

    #[test]
    fn mul_matches_bigint_reference() {
        let k = kernel();
        let p = k.modulus_u64().to_vec();
        let mut rng = rand::rngs::StdRng::seed_from_u64(31);
        for _ in 0..300 {
            let x = random_canonical(&k, &mut rng);
            let y = random_canonical(&k, &mut rng);
            let z = k.mul(&x, &y);

            // x·y ≡ z·R (mod p)
            let mut lhs = vec![0u64; 2 * p.len()];
            bigint::mul_wide(&mut lhs, &k.to_int(&x), &k.to_int(&y));
            let (_, lhs_mod) = bigint::div_rem(&lhs, &p);

            let r_mod_p = bigint::pow2_mod(k.radix_bits(), &p);
            let mut rhs = vec![0u64; 2 * p.len()];
            bigint::mul_wide(&mut rhs, &k.to_int(&z), &r_mod_p);
            let (_, rhs_mod) = bigint::div_rem(&rhs, &p);

            assert_eq!(lhs_mod, rhs_mod);
        }
    }

    #[test]
    fn add_sub_round_trip() {
        let k = kernel();
        let mut rng = rand::rngs::StdRng::seed_from_u64(32);
        for _ in 0..300 {
            let x = random_canonical(&k, &mut rng);
            let y = random_canonical(&k, &mut rng);
            let s = k.add(&x, &y);
            let d = k.sub(&s, &y);
            assert!(k.equals(&d, &x));
        }
    }

    #[test]
    fn unpack_pack_round_trip() {
        let k = kernel();
        let mut rng = rand::rngs::StdRng::seed_from_u64(33);
        for _ in 0..200 {
            let x = random_canonical(&k, &mut rng);
            assert_eq!(k.from_int(&k.to_int(&x)), x);
        }
    }

    #[test]
    fn rejects_even_and_oversized_moduli() {
        assert!(Wide29::new(&[4, 0, 0, 0]).is_err());
        let mut huge = vec![u64::MAX; 8];
        huge[0] |= 1;
        assert!(Wide29::new(&huge).is_err());
    }
}
