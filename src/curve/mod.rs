//! Curve arithmetic for `y² = x³ + b` over a prime field.
//!
//! Two point shapes coexist:
//! - [`Affine`]: `(x, y)` plus an explicit `nonzero` flag. This is the shape
//!   the bucket pipeline sorts and batch-adds; identity never enters a batch
//!   denominator.
//! - [`Projective`]: homogeneous `(X : Y : Z)` with identity `Z = 0`. Used in
//!   the column/partition reductions and the final combiner, where the point
//!   count is small and inversion amortisation stops paying.
//!
//! Projective addition, mixed addition and doubling are the complete
//! formulas for `a = 0` short Weierstrass curves (Renes–Costello–Batina,
//! algorithms 7–9), so the reduction stages need no case analysis.
//!
//! Affine addition takes the denominator inverse as an argument: the batch
//! layer produces those with one shared field inversion (`curve::batch`).

pub mod batch;

use crate::bigint;
use crate::errors::{MsmError, Result};
use crate::field::{Field, FieldKernel};
use crate::params::CurveParams;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Affine<E> {
    pub x: E,
    pub y: E,
    pub nonzero: bool,
}

impl<E: Default> Default for Affine<E> {
    fn default() -> Self {
        Affine {
            x: E::default(),
            y: E::default(),
            nonzero: false,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Projective<E> {
    pub x: E,
    pub y: E,
    pub z: E,
}

pub struct Curve<K: FieldKernel> {
    pub field: Field<K>,
    /// `b` and `3b` in Montgomery form.
    b: K::Elem,
    b3: K::Elem,
    /// Endomorphism constant `β` in Montgomery form.
    beta: K::Elem,
    generator: Affine<K::Elem>,
    cofactor: [u64; 2],
    order: [u64; 4],
}

impl<K: FieldKernel> Curve<K> {
    pub fn new(field: Field<K>, params: &CurveParams) -> Result<Self> {
        if !bigint::is_zero(params.a) {
            return Err(MsmError::InvalidParameters(
                "curve layer requires a = 0".into(),
            ));
        }
        let k = &field.kernel;
        let b = field.to_mont(&k.from_int(params.b));
        let b3 = k.add(&k.add(&b, &b), &b);
        let beta = field.to_mont(&k.from_int(params.endo.beta));
        let generator = Affine {
            x: field.to_mont(&k.from_int(params.generator_x)),
            y: field.to_mont(&k.from_int(params.generator_y)),
            nonzero: true,
        };
        let curve = Curve {
            field,
            b,
            b3,
            beta,
            generator,
            cofactor: params.cofactor,
            order: params.order,
        };
        if !curve.is_on_curve(&curve.generator) {
            return Err(MsmError::InvalidParameters(
                "generator is not on the curve".into(),
            ));
        }
        Ok(curve)
    }

    #[inline]
    pub fn generator(&self) -> Affine<K::Elem> {
        self.generator
    }

    pub(crate) fn b_mont(&self) -> &K::Elem {
        &self.b
    }

    pub fn cofactor(&self) -> [u64; 2] {
        self.cofactor
    }

    pub fn order(&self) -> &[u64; 4] {
        &self.order
    }

    pub fn identity_affine(&self) -> Affine<K::Elem> {
        Affine {
            x: self.field.kernel.zero(),
            y: self.field.kernel.zero(),
            nonzero: false,
        }
    }

    pub fn identity_projective(&self) -> Projective<K::Elem> {
        Projective {
            x: self.field.kernel.zero(),
            y: self.field.one(),
            z: self.field.kernel.zero(),
        }
    }

    pub fn is_on_curve(&self, p: &Affine<K::Elem>) -> bool {
        if !p.nonzero {
            return true;
        }
        let k = &self.field.kernel;
        let y2 = k.square(&p.y);
        let x3 = k.mul(&k.square(&p.x), &p.x);
        k.equals(&y2, &k.add(&x3, &self.b))
    }

    /// Whether `q · p` is the identity. GLV decomposition is only sound on
    /// prime-order-subgroup points, so callers feeding points from untrusted
    /// encodings on a cofactor > 1 curve should gate on this.
    pub fn is_in_subgroup(&self, p: &Affine<K::Elem>) -> bool {
        let acc = self.mul_small(&self.from_affine(p), &self.order.clone());
        self.is_identity(&acc)
    }

    #[inline]
    pub fn is_identity(&self, p: &Projective<K::Elem>) -> bool {
        self.field.kernel.is_zero(&p.z)
    }

    pub fn negate_affine(&self, p: &Affine<K::Elem>) -> Affine<K::Elem> {
        Affine {
            x: p.x,
            y: self.field.kernel.neg(&p.y),
            nonzero: p.nonzero,
        }
    }

    /// `endo(x, y) = (β·x, y)`.
    pub fn endo(&self, p: &Affine<K::Elem>) -> Affine<K::Elem> {
        Affine {
            x: self.field.kernel.mul(&p.x, &self.beta),
            y: p.y,
            nonzero: p.nonzero,
        }
    }

    /// Chord addition with a precomputed `d = (x₂ − x₁)^{−1}`. Both points
    /// must be nonzero with distinct x coordinates; the batch layer routes
    /// every other case.
    #[inline]
    pub fn add_affine(
        &self,
        a: &Affine<K::Elem>,
        b: &Affine<K::Elem>,
        d: &K::Elem,
    ) -> Affine<K::Elem> {
        let k = &self.field.kernel;
        let m = k.mul(&k.sub(&b.y, &a.y), d);
        let x3 = k.sub(&k.sub(&k.square(&m), &a.x), &b.x);
        let y3 = k.sub(&k.mul(&m, &k.sub(&a.x, &x3)), &a.y);
        Affine {
            x: x3,
            y: y3,
            nonzero: true,
        }
    }

    /// Tangent doubling with a precomputed `d = (2y)^{−1}`. The point must be
    /// nonzero with `y ≠ 0`.
    #[inline]
    pub fn double_affine(&self, a: &Affine<K::Elem>, d: &K::Elem) -> Affine<K::Elem> {
        let k = &self.field.kernel;
        let x2 = k.square(&a.x);
        let m = k.mul(&k.add(&k.add(&x2, &x2), &x2), d);
        let x3 = k.sub(&k.sub(&k.square(&m), &a.x), &a.x);
        let y3 = k.sub(&k.mul(&m, &k.sub(&a.x, &x3)), &a.y);
        Affine {
            x: x3,
            y: y3,
            nonzero: true,
        }
    }

    pub fn from_affine(&self, p: &Affine<K::Elem>) -> Projective<K::Elem> {
        if !p.nonzero {
            return self.identity_projective();
        }
        Projective {
            x: p.x,
            y: p.y,
            z: self.field.one(),
        }
    }

    pub fn to_affine(&self, p: &Projective<K::Elem>) -> Affine<K::Elem> {
        if self.is_identity(p) {
            return self.identity_affine();
        }
        let k = &self.field.kernel;
        let zinv = self.field.inverse(&p.z);
        Affine {
            x: k.mul(&p.x, &zinv),
            y: k.mul(&p.y, &zinv),
            nonzero: true,
        }
    }

    /// Complete projective addition (RCB algorithm 7, `a = 0`).
    pub fn add(&self, p: &Projective<K::Elem>, q: &Projective<K::Elem>) -> Projective<K::Elem> {
        let k = &self.field.kernel;
        let t0 = k.mul(&p.x, &q.x);
        let t1 = k.mul(&p.y, &q.y);
        let t2 = k.mul(&p.z, &q.z);
        let mut t3 = k.mul(&k.add(&p.x, &p.y), &k.add(&q.x, &q.y));
        t3 = k.sub(&t3, &k.add(&t0, &t1));
        let mut t4 = k.mul(&k.add(&p.y, &p.z), &k.add(&q.y, &q.z));
        t4 = k.sub(&t4, &k.add(&t1, &t2));
        let mut y3 = k.mul(&k.add(&p.x, &p.z), &k.add(&q.x, &q.z));
        y3 = k.sub(&y3, &k.add(&t0, &t2));
        let t0_tripled = k.add(&k.add(&t0, &t0), &t0);
        let t2b = k.mul(&self.b3, &t2);
        let z3 = k.add(&t1, &t2b);
        let t1 = k.sub(&t1, &t2b);
        let y3 = k.mul(&self.b3, &y3);
        let x3 = k.sub(&k.mul(&t3, &t1), &k.mul(&t4, &y3));
        let y3_out = k.add(&k.mul(&t1, &z3), &k.mul(&y3, &t0_tripled));
        let z3_out = k.add(&k.mul(&z3, &t4), &k.mul(&t0_tripled, &t3));
        Projective {
            x: x3,
            y: y3_out,
            z: z3_out,
        }
    }

    /// Complete mixed addition (RCB algorithm 8, `a = 0`, `Z₂ = 1`). An
    /// affine identity is handled by an explicit branch.
    pub fn add_mixed(
        &self,
        p: &Projective<K::Elem>,
        q: &Affine<K::Elem>,
    ) -> Projective<K::Elem> {
        if !q.nonzero {
            return *p;
        }
        let k = &self.field.kernel;
        let t0 = k.mul(&p.x, &q.x);
        let t1 = k.mul(&p.y, &q.y);
        let mut t3 = k.mul(&k.add(&q.x, &q.y), &k.add(&p.x, &p.y));
        t3 = k.sub(&t3, &k.add(&t0, &t1));
        let t4 = k.add(&k.mul(&q.y, &p.z), &p.y);
        let y3 = k.add(&k.mul(&q.x, &p.z), &p.x);
        let t0_tripled = k.add(&k.add(&t0, &t0), &t0);
        let t2 = k.mul(&self.b3, &p.z);
        let z3 = k.add(&t1, &t2);
        let t1 = k.sub(&t1, &t2);
        let y3 = k.mul(&self.b3, &y3);
        let x3 = k.sub(&k.mul(&t3, &t1), &k.mul(&t4, &y3));
        let y3_out = k.add(&k.mul(&t1, &z3), &k.mul(&y3, &t0_tripled));
        let z3_out = k.add(&k.mul(&z3, &t4), &k.mul(&t0_tripled, &t3));
        Projective {
            x: x3,
            y: y3_out,
            z: z3_out,
        }
    }

    /// Complete projective doubling (RCB algorithm 9, `a = 0`).
    pub fn double(&self, p: &Projective<K::Elem>) -> Projective<K::Elem> {
        let k = &self.field.kernel;
        let t0 = k.square(&p.y);
        let mut z3 = k.add(&t0, &t0);
        z3 = k.add(&z3, &z3);
        z3 = k.add(&z3, &z3);
        let t1 = k.mul(&p.y, &p.z);
        let mut t2 = k.square(&p.z);
        t2 = k.mul(&self.b3, &t2);
        let x3 = k.mul(&t2, &z3);
        let y3 = k.add(&t0, &t2);
        let z3 = k.mul(&t1, &z3);
        let t2_tripled = k.add(&k.add(&t2, &t2), &t2);
        let t0 = k.sub(&t0, &t2_tripled);
        let y3 = k.add(&x3, &k.mul(&t0, &y3));
        let x3 = k.mul(&t0, &k.mul(&p.x, &p.y));
        let x3 = k.add(&x3, &x3);
        Projective {
            x: x3,
            y: y3,
            z: z3,
        }
    }

    pub fn negate(&self, p: &Projective<K::Elem>) -> Projective<K::Elem> {
        Projective {
            x: p.x,
            y: self.field.kernel.neg(&p.y),
            z: p.z,
        }
    }

    /// Double-and-add by a small plain integer (column weights, cofactor
    /// clearing, subgroup checks). Not constant time, like everything here.
    pub fn mul_small(&self, p: &Projective<K::Elem>, k: &[u64]) -> Projective<K::Elem> {
        let mut acc = self.identity_projective();
        for i in (0..bigint::bit_len(k)).rev() {
            acc = self.double(&acc);
            if bigint::bit(k, i) {
                acc = self.add(&acc, p);
            }
        }
        acc
    }

    pub fn equal_projective(&self, p: &Projective<K::Elem>, q: &Projective<K::Elem>) -> bool {
        // cross-multiply to avoid inversions: X1·Z2 = X2·Z1, Y1·Z2 = Y2·Z1
        let k = &self.field.kernel;
        let pz = self.is_identity(p);
        let qz = self.is_identity(q);
        if pz || qz {
            return pz == qz;
        }
        k.equals(&k.mul(&p.x, &q.z), &k.mul(&q.x, &p.z))
            && k.equals(&k.mul(&p.y, &q.z), &k.mul(&q.y, &p.z))
    }

    /// Decode the §6 byte triple `(x_be, y_be, infinity)`, validating curve
    /// membership.
    pub fn point_from_bytes(&self, x: &[u8], y: &[u8], infinity: bool) -> Result<Affine<K::Elem>> {
        if infinity {
            return Ok(self.identity_affine());
        }
        let p = Affine {
            x: self.field.from_bytes_be(x)?,
            y: self.field.from_bytes_be(y)?,
            nonzero: true,
        };
        if !self.is_on_curve(&p) {
            return Err(MsmError::PointNotOnCurve);
        }
        Ok(p)
    }

    /// Canonical byte triple of an affine point.
    pub fn point_to_bytes(&self, p: &Affine<K::Elem>) -> (Vec<u8>, Vec<u8>, bool) {
        if !p.nonzero {
            let w = self.field.kernel.encoded_len();
            return (vec![0; w], vec![0; w], true);
        }
        (
            self.field.to_bytes_be(&p.x),
            self.field.to_bytes_be(&p.y),
            false,
        )
    }
}
