//! Batched affine addition.
//!
//! One field inversion is amortised over a whole vector of chord additions
//! with Montgomery's trick. The safe entry point classifies every slot first
//! (identity operands, doublings, cancellations) and only feeds genuine
//! denominators to the batch inverse; the unsafe entry point skips the
//! classification and assumes all slots are generic additions, which is a
//! few percent faster and correct only when the operand pairs are
//! statistically independent (the first bucket-accumulation pass). Misuse
//! yields wrong sums, not panics.
//!
//! All indices address one shared point slice; `s[i]` may alias `g[i]` (the
//! accumulation tree overwrites its left operand), and slots are disjoint
//! across `i`.

use super::{Affine, Curve};
use crate::field::FieldKernel;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Class {
    CopyG,
    CopyH,
    Identity,
    Double,
    Add,
}

/// Reusable scratch for one batch call; lives in the per-worker local arena
/// region and never shrinks.
pub struct BatchScratch<E> {
    denoms: Vec<E>,
    invs: Vec<E>,
    classes: Vec<Class>,
}

impl<E> BatchScratch<E> {
    pub fn new() -> Self {
        BatchScratch {
            denoms: Vec::new(),
            invs: Vec::new(),
            classes: Vec::new(),
        }
    }
}

impl<E> Default for BatchScratch<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// `points[s[i]] = points[g[i]] + points[h[i]]` for every slot, with full
/// edge-case handling.
pub fn batch_add<K: FieldKernel>(
    curve: &Curve<K>,
    points: &mut [Affine<K::Elem>],
    g: &[u32],
    h: &[u32],
    s: &[u32],
    scratch: &mut BatchScratch<K::Elem>,
) {
    debug_assert!(g.len() == h.len() && h.len() == s.len());
    let k = &curve.field.kernel;
    scratch.denoms.clear();
    scratch.classes.clear();

    for i in 0..g.len() {
        let a = points[g[i] as usize];
        let b = points[h[i] as usize];
        let class = if !a.nonzero {
            Class::CopyH
        } else if !b.nonzero {
            Class::CopyG
        } else if k.equals(&a.x, &b.x) {
            if k.equals(&a.y, &b.y) && !k.is_zero(&a.y) {
                scratch.denoms.push(k.add(&a.y, &a.y));
                Class::Double
            } else {
                // y₂ = −y₁ (includes the order-2 case y = 0)
                Class::Identity
            }
        } else {
            scratch.denoms.push(k.sub(&b.x, &a.x));
            Class::Add
        };
        scratch.classes.push(class);
    }

    scratch.invs.clear();
    scratch.invs.resize(scratch.denoms.len(), k.zero());
    curve
        .field
        .batch_inverse(&mut scratch.invs, &scratch.denoms);

    let mut slot = 0usize;
    for i in 0..g.len() {
        let a = points[g[i] as usize];
        let b = points[h[i] as usize];
        points[s[i] as usize] = match scratch.classes[i] {
            Class::CopyG => a,
            Class::CopyH => b,
            Class::Identity => curve.identity_affine(),
            Class::Double => {
                let d = scratch.invs[slot];
                slot += 1;
                curve.double_affine(&a, &d)
            }
            Class::Add => {
                let d = scratch.invs[slot];
                slot += 1;
                curve.add_affine(&a, &b, &d)
            }
        };
    }
}

/// The classification-free variant: every slot is assumed to be a generic
/// chord addition (nonzero operands, distinct x coordinates).
pub fn batch_add_unsafe<K: FieldKernel>(
    curve: &Curve<K>,
    points: &mut [Affine<K::Elem>],
    g: &[u32],
    h: &[u32],
    s: &[u32],
    scratch: &mut BatchScratch<K::Elem>,
) {
    debug_assert!(g.len() == h.len() && h.len() == s.len());
    let k = &curve.field.kernel;
    scratch.denoms.clear();
    for i in 0..g.len() {
        let a = &points[g[i] as usize];
        let b = &points[h[i] as usize];
        scratch.denoms.push(k.sub(&b.x, &a.x));
    }
    scratch.invs.clear();
    scratch.invs.resize(scratch.denoms.len(), k.zero());
    curve
        .field
        .batch_inverse(&mut scratch.invs, &scratch.denoms);
    for i in 0..g.len() {
        let a = points[g[i] as usize];
        let b = points[h[i] as usize];
        points[s[i] as usize] = curve.add_affine(&a, &b, &scratch.invs[i]);
    }
}

/// `points[idx] = 2·points[idx]` for every index, one shared inversion.
pub fn batch_double_in_place<K: FieldKernel>(
    curve: &Curve<K>,
    points: &mut [Affine<K::Elem>],
    idxs: &[u32],
    scratch: &mut BatchScratch<K::Elem>,
) {
    let k = &curve.field.kernel;
    scratch.denoms.clear();
    scratch.classes.clear();
    for &i in idxs {
        let a = points[i as usize];
        let class = if !a.nonzero {
            Class::CopyG
        } else if k.is_zero(&a.y) {
            Class::Identity
        } else {
            scratch.denoms.push(k.add(&a.y, &a.y));
            Class::Double
        };
        scratch.classes.push(class);
    }
    scratch.invs.clear();
    scratch.invs.resize(scratch.denoms.len(), k.zero());
    curve
        .field
        .batch_inverse(&mut scratch.invs, &scratch.denoms);
    let mut slot = 0usize;
    for (pos, &i) in idxs.iter().enumerate() {
        match scratch.classes[pos] {
            Class::Double => {
                let d = scratch.invs[slot];
                slot += 1;
                let a = points[i as usize];
                points[i as usize] = curve.double_affine(&a, &d);
            }
            Class::Identity => points[i as usize] = curve.identity_affine(),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curve::Projective;
    use crate::field::fp51::{Backend, Fp51};
    use crate::field::Field;
    use crate::params::CurveParams;

    fn bn254() -> Curve<Fp51> {
        let params = CurveParams::bn254();
        let field =
            Field::new(Fp51::new(params.modulus, Backend::detect()).unwrap()).unwrap();
        Curve::new(field, &params).unwrap()
    }

    /// Small multiples of G as affine points, including the identity at
    /// index 0.
    fn multiples(curve: &Curve<Fp51>, n: usize) -> Vec<Affine<[u64; 5]>> {
        let g = curve.from_affine(&curve.generator());
        let mut acc: Vec<Projective<[u64; 5]>> = Vec::with_capacity(n);
        acc.push(curve.identity_projective());
        for i in 1..n {
            let prev = acc[i - 1];
            acc.push(curve.add(&prev, &g));
        }
        acc.iter().map(|p| curve.to_affine(p)).collect()
    }

    #[test]
    fn batch_add_matches_projective_reference() {
        let curve = bn254();
        let m = multiples(&curve, 16);
        // identity operand, doubling, generic additions; plus a cancellation
        // pair built from a negation below
        let cases: [(usize, usize); 4] = [(0, 5), (3, 3), (2, 14), (4, 7)];
        let mut points: Vec<Affine<[u64; 5]>> = Vec::new();
        for &(a, b) in &cases {
            points.push(m[a]);
            points.push(m[b]);
        }
        points.push(m[6]);
        points.push(curve.negate_affine(&m[6]));
        let n_pairs = cases.len() + 1;
        let base = points.len() as u32;
        points.extend(std::iter::repeat(curve.identity_affine()).take(n_pairs));

        let g: Vec<u32> = (0..n_pairs as u32).map(|i| 2 * i).collect();
        let h: Vec<u32> = (0..n_pairs as u32).map(|i| 2 * i + 1).collect();
        let s: Vec<u32> = (0..n_pairs as u32).map(|i| base + i).collect();

        let mut scratch = BatchScratch::new();
        let mut arena = points.clone();
        batch_add(&curve, &mut arena, &g, &h, &s, &mut scratch);

        for i in 0..n_pairs {
            let expect = curve.add(
                &curve.from_affine(&points[2 * i]),
                &curve.from_affine(&points[2 * i + 1]),
            );
            let got = curve.from_affine(&arena[base as usize + i]);
            assert!(curve.equal_projective(&got, &expect), "pair {i}");
        }
    }

    #[test]
    fn batch_add_unsafe_matches_safe_on_generic_pairs() {
        let curve = bn254();
        let m = multiples(&curve, 24);
        let mut points: Vec<Affine<[u64; 5]>> = m[1..21].to_vec();
        let g: Vec<u32> = (0..10).collect();
        let h: Vec<u32> = (10..20).collect();
        let s: Vec<u32> = (0..10).collect(); // overwrite the left operands

        let mut safe = points.clone();
        let mut scratch = BatchScratch::new();
        batch_add(&curve, &mut safe, &g, &h, &s, &mut scratch);
        batch_add_unsafe(&curve, &mut points, &g, &h, &s, &mut scratch);
        for i in 0..10 {
            assert_eq!(points[i], safe[i]);
        }
    }

    #[test]
    fn batch_double_matches_projective_reference() {
        let curve = bn254();
        let m = multiples(&curve, 9);
        let mut points = m.clone();
        let idxs: Vec<u32> = (0..9).collect();
        let mut scratch = BatchScratch::new();
        batch_double_in_place(&curve, &mut points, &idxs, &mut scratch);
        for i in 0..9 {
            let expect = curve.double(&curve.from_affine(&m[i]));
            assert!(curve.equal_projective(&curve.from_affine(&points[i]), &expect));
        }
    }
}
