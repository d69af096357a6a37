//! Finite field arithmetic
//!
//! Two-layer design: a [`FieldKernel`] implements the representation-bound
//! Montgomery primitives (multiply, add/sub, reduction, carries) for one limb
//! scheme, and [`Field`] builds the representation-independent operations on
//! top of any kernel: exponentiation, Kaliski inversion, batched inversion,
//! Tonelli–Shanks square roots, and the canonical byte codec.
//!
//! Kernels:
//! - `fp51`: 5×51-bit unsaturated limbs, fused-multiply-add inner loop with a
//!   bit-identical integer fallback. Moduli up to `2^255 − 2^206`.
//! - `wide29`: 16×29-bit unsaturated limbs, integer inner loop. Moduli up to
//!   448 bits (the BLS12-381 base field lands here).

pub mod fp51;
pub mod kernel;
pub mod wide29;

pub use kernel::{FieldKernel, KernelInit};

use crate::bigint;
use crate::errors::{MsmError, Result};

/// Kernel-independent field layer: a kernel plus the derived constants for
/// exponentiation, inversion and square roots.
pub struct Field<K: FieldKernel> {
    pub kernel: K,
    /// Montgomery one, `R mod p`.
    one: K::Elem,
    /// `R² mod p` as a plain value; `mul(x, r2)` converts `x` into
    /// Montgomery form.
    r2: K::Elem,
    /// Plain one; `mul(x̃, mont_lower)` converts out of Montgomery form.
    mont_lower: K::Elem,
    /// `(p − 1)/2`, the Euler criterion exponent.
    euler_exp: Vec<u64>,
    /// Odd part `Q` of `p − 1 = Q·2^S` and `(Q + 1)/2`.
    tonelli_q: Vec<u64>,
    tonelli_q1_half: Vec<u64>,
    two_adicity: u32,
    /// `c = z^Q` for a non-residue `z`, in Montgomery form.
    tonelli_c: K::Elem,
    /// Kaliski post-correction table: entry `k` is `2^(3m − k) mod p`
    /// (`m = radix_bits`), plain value, for `k ∈ [0, 2m]`.
    kaliski: Vec<K::Elem>,
}

impl<K: FieldKernel> Field<K> {
    pub fn new(kernel: K) -> Result<Self> {
        let p = kernel.modulus_u64().to_vec();
        let m = kernel.radix_bits();

        let one = kernel.from_int(&bigint::pow2_mod(m, &p));
        let r2 = kernel.from_int(&bigint::pow2_mod(2 * m, &p));
        let mut one_int = vec![0u64; p.len()];
        one_int[0] = 1;
        let mont_lower = kernel.from_int(&one_int);

        // p − 1 = Q · 2^S
        let mut p_minus_1 = p.clone();
        bigint::sub_assign(&mut p_minus_1, &[1]);
        let mut euler_exp = p_minus_1.clone();
        bigint::shr1(&mut euler_exp);
        let mut tonelli_q = p_minus_1.clone();
        let mut two_adicity = 0u32;
        while !bigint::bit(&tonelli_q, 0) {
            bigint::shr1(&mut tonelli_q);
            two_adicity += 1;
        }
        let mut tonelli_q1_half = tonelli_q.clone();
        bigint::add_assign(&mut tonelli_q1_half, &[1]);
        bigint::shr1(&mut tonelli_q1_half);

        // Kaliski corrections by successive halving from 2^(3m).
        let mut kaliski = vec![kernel.zero(); 2 * m + 1];
        let mut acc = bigint::pow2_mod(m, &p); // 2^(3m − 2m)
        kaliski[2 * m] = kernel.from_int(&acc);
        for k in (0..2 * m).rev() {
            // double: 2^(3m − (k+1)) → 2^(3m − k)
            let carry = bigint::shl1(&mut acc);
            debug_assert!(!carry);
            if bigint::cmp(&acc, &p) != std::cmp::Ordering::Less {
                bigint::sub_assign(&mut acc, &p);
            }
            kaliski[k] = kernel.from_int(&acc);
        }

        let mut field = Field {
            kernel,
            one,
            r2,
            mont_lower,
            euler_exp,
            tonelli_q,
            tonelli_q1_half,
            two_adicity,
            tonelli_c: one,
            kaliski,
        };

        // Find a quadratic non-residue by Euler's criterion and fix the
        // Tonelli root-of-unity seed.
        let mut z_int = vec![0u64; p.len()];
        let mut found = false;
        for candidate in 2u64..64 {
            z_int[0] = candidate;
            if bigint::cmp(&z_int, &p) != std::cmp::Ordering::Less {
                break;
            }
            let z = field.to_mont(&field.kernel.from_int(&z_int));
            if !field.is_euler_square(&z) {
                field.tonelli_c = field.pow(&z, &field.tonelli_q.clone());
                found = true;
                break;
            }
        }
        if !found {
            return Err(MsmError::InvalidParameters(
                "no small quadratic non-residue found".into(),
            ));
        }
        Ok(field)
    }

    #[inline]
    pub fn one(&self) -> K::Elem {
        self.one
    }

    /// Convert a plain value into Montgomery form.
    pub fn to_mont(&self, x: &K::Elem) -> K::Elem {
        self.kernel.mul(x, &self.r2)
    }

    /// Convert a Montgomery-form value back to a plain value.
    pub fn from_mont(&self, x: &K::Elem) -> K::Elem {
        self.kernel.mul(x, &self.mont_lower)
    }

    /// Left-to-right binary exponentiation; `exp` is a little-endian plain
    /// integer. Exactly `bitlen(exp)` squarings plus one multiply per set bit.
    pub fn pow(&self, x: &K::Elem, exp: &[u64]) -> K::Elem {
        let bits = bigint::bit_len(exp);
        let mut acc = self.one;
        for i in (0..bits).rev() {
            acc = self.kernel.square(&acc);
            if bigint::bit(exp, i) {
                acc = self.kernel.mul(&acc, x);
            }
        }
        acc
    }

    fn is_euler_square(&self, x: &K::Elem) -> bool {
        let e = self.pow(x, &self.euler_exp);
        self.kernel.equals(&e, &self.one)
    }

    /// Kaliski "almost inverse": binary extended GCD returning
    /// `(x^{−1}·2^k mod p, k)` on plain integers, followed here by the
    /// power-of-two correction that lands back on the Montgomery inverse.
    ///
    /// `inverse(0)` returns zero: callers guarantee non-zero inputs, and the
    /// zero convention keeps the unsafe batched paths non-fatal on contract
    /// violations.
    pub fn inverse(&self, x: &K::Elem) -> K::Elem {
        let a = self.kernel.to_int(x);
        if bigint::is_zero(&a) {
            return self.kernel.zero();
        }
        let p = self.kernel.modulus_u64();
        let w = p.len() + 1;
        let mut u = vec![0u64; w];
        let mut v = vec![0u64; w];
        let mut r = vec![0u64; w];
        let mut s = vec![0u64; w];
        u[..p.len()].copy_from_slice(p);
        v[..a.len()].copy_from_slice(&a);
        s[0] = 1;
        let mut k = 0usize;
        while !bigint::is_zero(&v) {
            if !bigint::bit(&u, 0) {
                bigint::shr1(&mut u);
                bigint::shl1(&mut s);
            } else if !bigint::bit(&v, 0) {
                bigint::shr1(&mut v);
                bigint::shl1(&mut r);
            } else if bigint::cmp(&u, &v) == std::cmp::Ordering::Greater {
                bigint::sub_assign(&mut u, &v);
                bigint::shr1(&mut u);
                bigint::add_assign(&mut r, &s);
                bigint::shl1(&mut s);
            } else {
                bigint::sub_assign(&mut v, &u);
                bigint::shr1(&mut v);
                bigint::add_assign(&mut s, &r);
                bigint::shl1(&mut r);
            }
            k += 1;
        }
        let p_ext: Vec<u64> = p.iter().copied().chain(std::iter::once(0)).collect();
        if bigint::cmp(&r, &p_ext) != std::cmp::Ordering::Less {
            bigint::sub_assign(&mut r, &p_ext);
        }
        // p − r = x̃^{−1}·2^k
        let mut w_int = p_ext;
        bigint::sub_assign(&mut w_int, &r);
        let almost = self.kernel.from_int(&w_int[..p.len()]);
        self.kernel.mul(&almost, &self.kaliski[k])
    }

    /// Montgomery's trick: `dst[i] = src[i]^{−1}` with one inversion and
    /// `3(n − 1)` multiplies. Zero entries must be filtered by the caller.
    pub fn batch_inverse(&self, dst: &mut [K::Elem], src: &[K::Elem]) {
        debug_assert_eq!(dst.len(), src.len());
        let n = src.len();
        if n == 0 {
            return;
        }
        // dst doubles as the prefix-product scratch.
        dst[0] = src[0];
        for i in 1..n {
            dst[i] = self.kernel.mul(&dst[i - 1], &src[i]);
        }
        let mut acc = self.inverse(&dst[n - 1]);
        for i in (1..n).rev() {
            dst[i] = self.kernel.mul(&acc, &dst[i - 1]);
            acc = self.kernel.mul(&acc, &src[i]);
        }
        dst[0] = acc;
    }

    /// Tonelli–Shanks square root. Returns `None` on quadratic non-residues.
    /// For squares, the returned root is one of the two; the caller picks a
    /// sign.
    pub fn sqrt(&self, x: &K::Elem) -> Option<K::Elem> {
        if self.kernel.is_zero(x) {
            return Some(self.kernel.zero());
        }
        if !self.is_euler_square(x) {
            return None;
        }
        let mut m = self.two_adicity;
        let mut c = self.tonelli_c;
        let mut t = self.pow(x, &self.tonelli_q);
        let mut r = self.pow(x, &self.tonelli_q1_half);
        while !self.kernel.equals(&t, &self.one) {
            // least i with t^(2^i) = 1
            let mut i = 0u32;
            let mut probe = t;
            while !self.kernel.equals(&probe, &self.one) {
                probe = self.kernel.square(&probe);
                i += 1;
            }
            debug_assert!(i < m);
            let mut b = c;
            for _ in 0..(m - i - 1) {
                b = self.kernel.square(&b);
            }
            m = i;
            c = self.kernel.square(&b);
            t = self.kernel.mul(&t, &c);
            r = self.kernel.mul(&r, &b);
        }
        Some(r)
    }

    /// Decode a canonical big-endian byte string into Montgomery form.
    pub fn from_bytes_be(&self, bytes: &[u8]) -> Result<K::Elem> {
        let expected = self.kernel.encoded_len();
        if bytes.len() != expected {
            return Err(MsmError::EncodingLength {
                expected,
                got: bytes.len(),
            });
        }
        let p = self.kernel.modulus_u64();
        let limbs = bigint::from_bytes_be(bytes, p.len());
        if bigint::cmp(&limbs, p) != std::cmp::Ordering::Less {
            return Err(MsmError::EncodingOutOfRange);
        }
        Ok(self.to_mont(&self.kernel.from_int(&limbs)))
    }

    /// Canonical big-endian encoding of a Montgomery-form value.
    pub fn to_bytes_be(&self, x: &K::Elem) -> Vec<u8> {
        let plain = self.from_mont(x);
        bigint::to_bytes_be(&self.kernel.to_int(&plain), self.kernel.encoded_len())
    }
}

#[cfg(test)]
mod tests {
    use super::fp51::{Backend, Fp51};
    use super::wide29::Wide29;
    use super::*;
    use crate::params::CurveParams;
    use rand::{Rng, SeedableRng};

    fn bn254_field() -> Field<Fp51> {
        Field::new(Fp51::new(CurveParams::bn254().modulus, Backend::Fma).unwrap()).unwrap()
    }

    fn bls_field() -> Field<Wide29> {
        Field::new(Wide29::new(CurveParams::bls12_381().modulus).unwrap()).unwrap()
    }

    fn random_elem<K: FieldKernel, R: Rng>(field: &Field<K>, rng: &mut R) -> K::Elem {
        let p = field.kernel.modulus_u64();
        loop {
            let limbs: Vec<u64> = (0..p.len()).map(|_| rng.gen()).collect();
            if bigint::cmp(&limbs, p) == std::cmp::Ordering::Less {
                return field.to_mont(&field.kernel.from_int(&limbs));
            }
        }
    }

    #[test]
    fn mont_one_round_trip() {
        let f = bn254_field();
        let one = f.one();
        let plain = f.from_mont(&one);
        assert_eq!(f.kernel.to_int(&plain), vec![1, 0, 0, 0]);
    }

    #[test]
    fn inverse_times_self_is_one() {
        let f = bn254_field();
        let mut rng = rand::rngs::StdRng::seed_from_u64(11);
        for _ in 0..200 {
            let x = random_elem(&f, &mut rng);
            if f.kernel.is_zero(&x) {
                continue;
            }
            let inv = f.inverse(&x);
            let prod = f.kernel.mul(&x, &inv);
            assert!(f.kernel.equals(&prod, &f.one()));
        }
    }

    #[test]
    fn inverse_times_self_is_one_wide() {
        let f = bls_field();
        let mut rng = rand::rngs::StdRng::seed_from_u64(12);
        for _ in 0..50 {
            let x = random_elem(&f, &mut rng);
            if f.kernel.is_zero(&x) {
                continue;
            }
            let inv = f.inverse(&x);
            let prod = f.kernel.mul(&x, &inv);
            assert!(f.kernel.equals(&prod, &f.one()));
        }
    }

    #[test]
    fn batch_inverse_matches_pointwise() {
        let f = bn254_field();
        let mut rng = rand::rngs::StdRng::seed_from_u64(13);
        let xs: Vec<_> = (0..64).map(|_| random_elem(&f, &mut rng)).collect();
        let mut batch = vec![f.kernel.zero(); xs.len()];
        f.batch_inverse(&mut batch, &xs);
        for (x, b) in xs.iter().zip(batch.iter()) {
            assert!(f.kernel.equals(b, &f.inverse(x)));
        }
    }

    #[test]
    fn sqrt_of_square_is_plus_minus_root() {
        let f = bn254_field();
        let mut rng = rand::rngs::StdRng::seed_from_u64(14);
        for _ in 0..100 {
            let x = random_elem(&f, &mut rng);
            let sq = f.kernel.square(&x);
            let root = f.sqrt(&sq).expect("square must have a root");
            let neg = f.kernel.neg(&x);
            assert!(f.kernel.equals(&root, &x) || f.kernel.equals(&root, &neg));
        }
    }

    #[test]
    fn squares_are_half_of_units() {
        let f = bn254_field();
        let mut rng = rand::rngs::StdRng::seed_from_u64(15);
        let mut squares = 0usize;
        let samples = 400;
        for _ in 0..samples {
            let x = random_elem(&f, &mut rng);
            if f.kernel.is_zero(&x) {
                continue;
            }
            if f.sqrt(&x).is_some() {
                squares += 1;
            }
        }
        // binomial(400, 1/2): allow a generous window
        assert!(squares > samples / 2 - 60 && squares < samples / 2 + 60);
    }

    #[test]
    fn pow_matches_repeated_multiplication() {
        let f = bls_field();
        let mut rng = rand::rngs::StdRng::seed_from_u64(16);
        let x = random_elem(&f, &mut rng);
        let mut expect = f.one();
        for e in 0u64..20 {
            assert!(f.kernel.equals(&f.pow(&x, &[e]), &expect));
            expect = f.kernel.mul(&expect, &x);
        }
    }

    #[test]
    fn byte_codec_round_trip_and_range_check() {
        let f = bls_field();
        let mut rng = rand::rngs::StdRng::seed_from_u64(17);
        for _ in 0..50 {
            let x = random_elem(&f, &mut rng);
            let bytes = f.to_bytes_be(&x);
            assert_eq!(bytes.len(), 48);
            let back = f.from_bytes_be(&bytes).unwrap();
            assert!(f.kernel.equals(&back, &x));
        }
        let p_bytes = bigint::to_bytes_be(f.kernel.modulus_u64(), 48);
        assert!(matches!(
            f.from_bytes_be(&p_bytes),
            Err(MsmError::EncodingOutOfRange)
        ));
    }
}
