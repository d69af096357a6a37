//! Fixed-width unsigned big-integer helpers on little-endian `u64` limbs.
//!
//! This is not a general bignum library: it covers exactly what the engine
//! needs outside the hot path: init-time Montgomery/Barrett constants, the
//! Kaliski inverse, and GLV scalar decomposition. All functions operate on
//! caller-provided limb slices so the same code serves 256-, 384- and
//! 512-bit working widths.

/// `a += b`, returning the outgoing carry. `b` may be shorter than `a`.
pub fn add_assign(a: &mut [u64], b: &[u64]) -> bool {
    debug_assert!(b.len() <= a.len());
    let mut carry = 0u64;
    for (i, limb) in a.iter_mut().enumerate() {
        let rhs = b.get(i).copied().unwrap_or(0);
        let (t, c1) = limb.overflowing_add(rhs);
        let (t, c2) = t.overflowing_add(carry);
        *limb = t;
        carry = (c1 | c2) as u64;
    }
    carry != 0
}

/// `a -= b`, returning the outgoing borrow. `b` may be shorter than `a`.
pub fn sub_assign(a: &mut [u64], b: &[u64]) -> bool {
    debug_assert!(b.len() <= a.len());
    let mut borrow = 0u64;
    for (i, limb) in a.iter_mut().enumerate() {
        let rhs = b.get(i).copied().unwrap_or(0);
        let (t, b1) = limb.overflowing_sub(rhs);
        let (t, b2) = t.overflowing_sub(borrow);
        *limb = t;
        borrow = (b1 | b2) as u64;
    }
    borrow != 0
}

pub fn cmp(a: &[u64], b: &[u64]) -> std::cmp::Ordering {
    debug_assert_eq!(a.len(), b.len());
    for i in (0..a.len()).rev() {
        match a[i].cmp(&b[i]) {
            std::cmp::Ordering::Equal => continue,
            ord => return ord,
        }
    }
    std::cmp::Ordering::Equal
}

pub fn is_zero(a: &[u64]) -> bool {
    a.iter().all(|&l| l == 0)
}

pub fn bit(a: &[u64], i: usize) -> bool {
    let limb = i / 64;
    limb < a.len() && (a[limb] >> (i % 64)) & 1 == 1
}

pub fn bit_len(a: &[u64]) -> usize {
    for i in (0..a.len()).rev() {
        if a[i] != 0 {
            return 64 * i + (64 - a[i].leading_zeros() as usize);
        }
    }
    0
}

/// Shift left by one bit in place; returns the bit shifted out.
pub fn shl1(a: &mut [u64]) -> bool {
    let mut carry = 0u64;
    for limb in a.iter_mut() {
        let next = *limb >> 63;
        *limb = (*limb << 1) | carry;
        carry = next;
    }
    carry != 0
}

/// Shift right by one bit in place.
pub fn shr1(a: &mut [u64]) {
    let mut carry = 0u64;
    for limb in a.iter_mut().rev() {
        let next = *limb & 1;
        *limb = (*limb >> 1) | (carry << 63);
        carry = next;
    }
}

/// Schoolbook widening multiply: `out = a * b`. `out.len()` must be at least
/// `a.len() + b.len()`; it is fully overwritten.
pub fn mul_wide(out: &mut [u64], a: &[u64], b: &[u64]) {
    debug_assert!(out.len() >= a.len() + b.len());
    out.fill(0);
    for (i, &ai) in a.iter().enumerate() {
        if ai == 0 {
            continue;
        }
        let mut carry = 0u128;
        for (j, &bj) in b.iter().enumerate() {
            let t = out[i + j] as u128 + ai as u128 * bj as u128 + carry;
            out[i + j] = t as u64;
            carry = t >> 64;
        }
        let mut k = i + b.len();
        while carry != 0 {
            let t = out[k] as u128 + carry;
            out[k] = t as u64;
            carry = t >> 64;
            k += 1;
        }
    }
}

/// Low half of a widening multiply, wrapping at `out.len()` limbs. Used for
/// the two's-complement arithmetic in the GLV residual computation.
pub fn mul_lo(out: &mut [u64], a: &[u64], b: &[u64]) {
    out.fill(0);
    let n = out.len();
    for (i, &ai) in a.iter().enumerate() {
        if ai == 0 || i >= n {
            continue;
        }
        let mut carry = 0u128;
        for (j, &bj) in b.iter().enumerate() {
            if i + j >= n {
                break;
            }
            let t = out[i + j] as u128 + ai as u128 * bj as u128 + carry;
            out[i + j] = t as u64;
            carry = t >> 64;
        }
        let mut k = i + b.len();
        while carry != 0 && k < n {
            let t = out[k] as u128 + carry;
            out[k] = t as u64;
            carry = t >> 64;
            k += 1;
        }
    }
}

/// Two's-complement negation in place.
pub fn neg_assign(a: &mut [u64]) {
    for limb in a.iter_mut() {
        *limb = !*limb;
    }
    add_assign(a, &[1]);
}

/// Restoring bit-by-bit division: `(quotient, remainder)` of `num / den`.
/// `den` must be nonzero. Only used at init time, so O(bits) iterations are
/// acceptable.
pub fn div_rem(num: &[u64], den: &[u64]) -> (Vec<u64>, Vec<u64>) {
    assert!(!is_zero(den), "division by zero");
    let mut quot = vec![0u64; num.len()];
    let mut rem = vec![0u64; den.len() + 1];
    let den_ext: Vec<u64> = den.iter().copied().chain(std::iter::once(0)).collect();
    for i in (0..num.len() * 64).rev() {
        shl1(&mut rem);
        if bit(num, i) {
            rem[0] |= 1;
        }
        if cmp(&rem, &den_ext) != std::cmp::Ordering::Less {
            sub_assign(&mut rem, &den_ext);
            quot[i / 64] |= 1 << (i % 64);
        }
    }
    rem.pop();
    (quot, rem)
}

/// `2^k mod m`, by repeated modular doubling. `m` must be nonzero and the
/// result width matches `m`.
pub fn pow2_mod(k: usize, m: &[u64]) -> Vec<u64> {
    let mut r = vec![0u64; m.len() + 1];
    let m_ext: Vec<u64> = m.iter().copied().chain(std::iter::once(0)).collect();
    // start from 1 mod m
    r[0] = 1;
    if cmp(&r, &m_ext) != std::cmp::Ordering::Less {
        sub_assign(&mut r, &m_ext);
    }
    for _ in 0..k {
        shl1(&mut r);
        if cmp(&r, &m_ext) != std::cmp::Ordering::Less {
            sub_assign(&mut r, &m_ext);
        }
    }
    r.pop();
    r
}

/// Interpret a little-endian byte string as limbs.
pub fn from_bytes_le(bytes: &[u8], width: usize) -> Vec<u64> {
    let mut out = vec![0u64; width];
    for (i, &b) in bytes.iter().enumerate() {
        out[i / 8] |= (b as u64) << (8 * (i % 8));
    }
    out
}

/// Canonical big-endian byte string of exactly `n_bytes` bytes.
pub fn to_bytes_be(a: &[u64], n_bytes: usize) -> Vec<u8> {
    let mut out = vec![0u8; n_bytes];
    for i in 0..n_bytes {
        let byte = (a[i / 8] >> (8 * (i % 8))) as u8;
        out[n_bytes - 1 - i] = byte;
    }
    out
}

pub fn from_bytes_be(bytes: &[u8], width: usize) -> Vec<u64> {
    let le: Vec<u8> = bytes.iter().rev().copied().collect();
    from_bytes_le(&le, width)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};

    fn rng() -> rand::rngs::StdRng {
        rand::rngs::StdRng::seed_from_u64(0x5a71_55a5)
    }

    fn to_u128(a: &[u64]) -> u128 {
        a[0] as u128 | (a.get(1).map_or(0, |&h| (h as u128) << 64))
    }

    #[test]
    fn add_sub_round_trip() {
        let mut rng = rng();
        for _ in 0..200 {
            let a: [u64; 3] = rng.gen();
            let b: [u64; 3] = rng.gen();
            let mut t = a;
            let carry = add_assign(&mut t, &b);
            let borrow = sub_assign(&mut t, &b);
            assert_eq!(carry, borrow);
            assert_eq!(t, a);
        }
    }

    #[test]
    fn mul_wide_matches_u128() {
        let mut rng = rng();
        for _ in 0..200 {
            let a = [rng.gen::<u64>()];
            let b = [rng.gen::<u64>()];
            let mut out = [0u64; 2];
            mul_wide(&mut out, &a, &b);
            assert_eq!(to_u128(&out), a[0] as u128 * b[0] as u128);
        }
    }

    #[test]
    fn div_rem_reconstructs() {
        let mut rng = rng();
        for _ in 0..50 {
            let num: [u64; 4] = rng.gen();
            let mut den: [u64; 2] = rng.gen();
            if is_zero(&den) {
                den[0] = 1;
            }
            let (q, r) = div_rem(&num, &den);
            assert!(cmp(&r, &den.to_vec()) == std::cmp::Ordering::Less);
            // q * den + r == num
            let mut back = vec![0u64; 6];
            mul_wide(&mut back, &q, &den);
            add_assign(&mut back, &r);
            assert_eq!(&back[..4], &num[..]);
            assert!(is_zero(&back[4..]));
        }
    }

    #[test]
    fn pow2_mod_small_cases() {
        let m = [97u64];
        for k in 0..200usize {
            let r = pow2_mod(k, &m);
            let expect = (0..k).fold(1u64, |acc, _| (acc * 2) % 97);
            assert_eq!(r[0], expect);
        }
    }

    #[test]
    fn byte_round_trip() {
        let a = [0x1122334455667788u64, 0x99aabbccddeeff00, 0x0000000000000042];
        let be = to_bytes_be(&a, 24);
        assert_eq!(from_bytes_be(&be, 3), a.to_vec());
    }
}
