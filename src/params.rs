//! Curve parameter sets.
//!
//! A [`CurveParams`] value is everything `Engine::create` needs to specialise
//! the arithmetic stack for one short Weierstrass curve `y² = x³ + b` over a
//! large prime field: the base-field modulus, the prime group order, a
//! generator, the cofactor, and the endomorphism data (eigenvalue `λ`, cube
//! root `β` with `[λ](x, y) = (β·x, y)`, and a reduced lattice basis for GLV
//! decomposition).
//!
//! All limb arrays are little-endian `u64`. The presets below were derived
//! from the standard parameter generation polynomials and cross-checked
//! against the eigenvalue relation and `λ² + λ + 1 ≡ 0 (mod q)`; the unit
//! tests re-verify the lattice congruences on every run.

/// A signed two-limb integer, used for the GLV lattice basis entries.
#[derive(Clone, Copy, Debug)]
pub struct Signed128 {
    pub neg: bool,
    pub mag: [u64; 2],
}

impl Signed128 {
    pub const fn pos(mag: [u64; 2]) -> Self {
        Signed128 { neg: false, mag }
    }
    pub const fn neg(mag: [u64; 2]) -> Self {
        Signed128 { neg: true, mag }
    }
}

/// One row `(a, b)` of the GLV lattice: `a + b·λ ≡ 0 (mod q)`.
#[derive(Clone, Copy, Debug)]
pub struct LatticeRow {
    pub a: Signed128,
    pub b: Signed128,
}

/// Endomorphism data for a `j = 0` curve.
#[derive(Clone, Copy, Debug)]
pub struct EndoParams {
    /// Eigenvalue of the endomorphism on the prime-order subgroup, `< q`.
    pub lambda: [u64; 4],
    /// Cube root of unity in the base field, matching `lambda`'s eigenspace.
    pub beta: &'static [u64],
    /// Reduced lattice basis rows; `det = a1·b2 − b1·a2 = ±q`.
    pub v1: LatticeRow,
    pub v2: LatticeRow,
    /// Whether the basis determinant is `−q` rather than `+q`.
    pub neg_det: bool,
}

#[derive(Clone, Copy, Debug)]
pub struct CurveParams {
    pub name: &'static str,
    /// Base-field modulus `p`.
    pub modulus: &'static [u64],
    /// Prime order `q` of the target subgroup.
    pub order: [u64; 4],
    /// Weierstrass coefficients of `y² = x³ + a·x + b`. The engine's curve
    /// layer (endomorphism, complete formulas) requires `a = 0`.
    pub a: &'static [u64],
    pub b: &'static [u64],
    pub generator_x: &'static [u64],
    pub generator_y: &'static [u64],
    /// Cofactor `#E(F_p) / q`.
    pub cofactor: [u64; 2],
    pub endo: EndoParams,
}

impl CurveParams {
    /// BLS12-381 G1. The 381-bit base field needs the wide (16×29) kernel.
    pub const fn bls12_381() -> Self {
        CurveParams {
            name: "bls12-381",
            modulus: &[
                0xb9feffffffffaaab,
                0x1eabfffeb153ffff,
                0x6730d2a0f6b0f624,
                0x64774b84f38512bf,
                0x4b1ba7b6434bacd7,
                0x1a0111ea397fe69a,
            ],
            order: [
                0xffffffff00000001,
                0x53bda402fffe5bfe,
                0x3339d80809a1d805,
                0x73eda753299d7d48,
            ],
            a: &[0, 0, 0, 0, 0, 0],
            b: &[4, 0, 0, 0, 0, 0],
            generator_x: &[
                0xfb3af00adb22c6bb,
                0x6c55e83ff97a1aef,
                0xa14e3a3f171bac58,
                0xc3688c4f9774b905,
                0x2695638c4fa9ac0f,
                0x17f1d3a73197d794,
            ],
            generator_y: &[
                0x0caa232946c5e7e1,
                0xd03cc744a2888ae4,
                0x00db18cb2c04b3ed,
                0xfcf5e095d5d00af6,
                0xa09e30ed741d8ae4,
                0x08b3f481e3aaa0f1,
            ],
            cofactor: [0x8c00aaab0000aaab, 0x396c8c005555e156],
            endo: EndoParams {
                // lambda = z² − 1 for the BLS parameter z = −0xd201000000010000
                lambda: [0x00000000ffffffff, 0xac45a4010001a402, 0, 0],
                beta: &[
                    0x8bfd00000000aaac,
                    0x409427eb4f49fffd,
                    0x897d29650fb85f9b,
                    0xaa0d857d89759ad4,
                    0xec02408663d4de85,
                    0x1a0111ea397fe699,
                ],
                // v1 = (λ, −1), v2 = (1, z²); det = λ·z² + 1 = q
                v1: LatticeRow {
                    a: Signed128::pos([0x00000000ffffffff, 0xac45a4010001a402]),
                    b: Signed128::neg([1, 0]),
                },
                v2: LatticeRow {
                    a: Signed128::pos([1, 0]),
                    b: Signed128::pos([0x0000000100000000, 0xac45a4010001a402]),
                },
                neg_det: false,
            },
        }
    }

    /// BN254 (alt_bn128) G1. The 254-bit base field fits the 5×51 kernel.
    pub const fn bn254() -> Self {
        CurveParams {
            name: "bn254",
            modulus: &[
                0x3c208c16d87cfd47,
                0x97816a916871ca8d,
                0xb85045b68181585d,
                0x30644e72e131a029,
            ],
            order: [
                0x43e1f593f0000001,
                0x2833e84879b97091,
                0xb85045b68181585d,
                0x30644e72e131a029,
            ],
            a: &[0, 0, 0, 0],
            b: &[3, 0, 0, 0],
            generator_x: &[1, 0, 0, 0],
            generator_y: &[2, 0, 0, 0],
            cofactor: [1, 0],
            endo: EndoParams {
                lambda: [
                    0x8b17ea66b99c90dd,
                    0x5bfc41088d8daaa7,
                    0xb3c4d79d41a91758,
                    0,
                ],
                beta: &[
                    0x5763473177fffffe,
                    0xd4f263f1acdb5c4f,
                    0x59e26bcea0d48bac,
                    0,
                ],
                // Gauss-reduced basis; det = −q
                v1: LatticeRow {
                    a: Signed128::neg([0x89d3256894d213e3, 0]),
                    b: Signed128::pos([0x8211bbeb7d4f1128, 0x6f4d8248eeb859fc]),
                },
                v2: LatticeRow {
                    a: Signed128::pos([0x0be4e1541221250b, 0x6f4d8248eeb859fd]),
                    b: Signed128::pos([0x89d3256894d213e3, 0]),
                },
                neg_det: true,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bigint;

    /// `a + b·λ mod q` for a signed lattice row must vanish.
    fn check_row(row: &LatticeRow, lambda: &[u64; 4], q: &[u64; 4]) {
        let mut prod = vec![0u64; 6];
        bigint::mul_wide(&mut prod, &row.b.mag, lambda);
        let (_, mut r) = bigint::div_rem(&prod, q);
        // fold in `a`
        if row.b.neg != row.a.neg {
            // signs differ: a + b·λ ≡ ±(|b·λ| − |a|)
            let borrowed = bigint::sub_assign(&mut r, &row.a.mag);
            if borrowed {
                // |a| > |b·λ| mod q: wrap by adding q back
                bigint::add_assign(&mut r, q);
            }
        } else {
            bigint::add_assign(&mut r, &row.a.mag);
        }
        let (_, rem) = bigint::div_rem(&r, q);
        assert!(bigint::is_zero(&rem), "lattice row not in the kernel");
    }

    #[test]
    fn bls12_381_lattice_rows_vanish() {
        let p = CurveParams::bls12_381();
        check_row(&p.endo.v1, &p.endo.lambda, &p.order);
        check_row(&p.endo.v2, &p.endo.lambda, &p.order);
    }

    #[test]
    fn bn254_lattice_rows_vanish() {
        let p = CurveParams::bn254();
        check_row(&p.endo.v1, &p.endo.lambda, &p.order);
        check_row(&p.endo.v2, &p.endo.lambda, &p.order);
    }

    #[test]
    fn lambda_is_cube_root_of_unity_mod_q() {
        for params in [CurveParams::bls12_381(), CurveParams::bn254()] {
            let q = params.order;
            let lam = params.endo.lambda;
            // λ² + λ + 1 ≡ 0 (mod q)
            let mut sq = vec![0u64; 8];
            bigint::mul_wide(&mut sq, &lam, &lam);
            bigint::add_assign(&mut sq, &lam);
            bigint::add_assign(&mut sq, &[1]);
            let (_, rem) = bigint::div_rem(&sq, &q);
            assert!(bigint::is_zero(&rem), "{}: λ²+λ+1 ≠ 0", params.name);
        }
    }
}
