//! End-to-end MSM tests on BN254 G1, exercising the 5×51 FMA kernel, both
//! multiply backends, and the unsafe batch-addition path, against the
//! arkworks reference.

use ark_bn254::{Fq, Fr, G1Affine, G1Projective};
use ark_ec::{AffineRepr, CurveGroup, VariableBaseMSM};
use ark_ff::PrimeField;

use sarissa::curve::Affine;
use sarissa::field::fp51::{Backend, Fp51};
use sarissa::field::FieldKernel;
use sarissa::{Bn254Engine, CurveParams, MsmOptions};

fn engine() -> Bn254Engine {
    Bn254Engine::create(&CurveParams::bn254()).unwrap()
}

fn to_ark(engine: &Bn254Engine, p: &Affine<<Fp51 as FieldKernel>::Elem>) -> G1Affine {
    let (x, y, infinity) = engine.curve().point_to_bytes(p);
    if infinity {
        return G1Affine::identity();
    }
    let point = G1Affine::new_unchecked(
        Fq::from_be_bytes_mod_order(&x),
        Fq::from_be_bytes_mod_order(&y),
    );
    assert!(point.is_on_curve());
    point
}

fn reference_msm(
    engine: &Bn254Engine,
    scalars: &[[u8; 32]],
    points: &[Affine<<Fp51 as FieldKernel>::Elem>],
) -> G1Affine {
    let ark_points: Vec<G1Affine> = points.iter().map(|p| to_ark(engine, p)).collect();
    let ark_scalars: Vec<Fr> = scalars
        .iter()
        .map(|b| Fr::from_le_bytes_mod_order(b))
        .collect();
    G1Projective::msm(&ark_points, &ark_scalars)
        .unwrap()
        .into_affine()
}

#[test]
fn pseudorandom_msm_matches_arkworks() {
    let e = engine();
    for n in [2usize, 65, 1024, 4096] {
        let points = e.random_points_fast(n, n as u64);
        let mut rng = ark_std::test_rng();
        let scalars = e.random_scalars(n, &mut rng);
        let (acc, _) = e.msm(&scalars, &points, &MsmOptions::default()).unwrap();
        assert_eq!(
            to_ark(&e, &e.to_affine(&acc)),
            reference_msm(&e, &scalars, &points),
            "n = {n}"
        );
    }
}

#[test]
fn unsafe_additions_agree_on_random_inputs() {
    let e = engine();
    let n = 2048;
    let points = e.random_points_fast(n, 0x5eed);
    let mut rng = ark_std::test_rng();
    let scalars = e.random_scalars(n, &mut rng);
    let (safe, _) = e.msm(&scalars, &points, &MsmOptions::default()).unwrap();
    let (fast, _) = e.msm_unsafe(&scalars, &points, &MsmOptions::default()).unwrap();
    assert!(e.curve().equal_projective(&safe, &fast));
}

#[test]
fn duplicated_points_need_the_safe_path() {
    // The same point under the same scalar lands twice in one bucket; the
    // safe classification must turn the first-level pair into a doubling.
    let e = engine();
    let g = e.curve().generator();
    let mut rng = ark_std::test_rng();
    let s = e.random_scalars(1, &mut rng)[0];
    let scalars = [s, s, s];
    let points = [g, g, g];
    let (acc, _) = e.msm(&scalars, &points, &MsmOptions::default()).unwrap();
    assert_eq!(
        to_ark(&e, &e.to_affine(&acc)),
        reference_msm(&e, &scalars, &points)
    );
}

#[test]
fn both_backends_produce_identical_results() {
    let params = CurveParams::bn254();
    let fma = Bn254Engine::create_with_backend(&params, Backend::Fma).unwrap();
    let int = Bn254Engine::create_with_backend(&params, Backend::Integer).unwrap();
    let n = 512;
    let points = fma.random_points_fast(n, 99);
    let mut rng = ark_std::test_rng();
    let scalars = fma.random_scalars(n, &mut rng);

    let (a, _) = fma.msm(&scalars, &points, &MsmOptions::default()).unwrap();
    // rebuild the points for the integer engine from canonical bytes
    let int_points: Vec<_> = points
        .iter()
        .map(|p| {
            let (x, y, inf) = fma.curve().point_to_bytes(p);
            int.curve().point_from_bytes(&x, &y, inf).unwrap()
        })
        .collect();
    let (b, _) = int.msm(&scalars, &int_points, &MsmOptions::default()).unwrap();
    let a_affine = fma.curve().point_to_bytes(&fma.to_affine(&a));
    let b_affine = int.curve().point_to_bytes(&int.to_affine(&b));
    assert_eq!(a_affine, b_affine);
}

#[test]
fn multi_threaded_large_msm_matches_arkworks() {
    let mut e = engine();
    e.start_threads(8).unwrap();
    let n = 1 << 12;
    let points = e.random_points_fast(n, 0xabcd);
    let mut rng = ark_std::test_rng();
    let scalars = e.random_scalars(n, &mut rng);
    let (acc, stats) = e.msm(&scalars, &points, &MsmOptions::default()).unwrap();
    e.stop_threads().unwrap();
    assert_eq!(
        to_ark(&e, &e.to_affine(&acc)),
        reference_msm(&e, &scalars, &points)
    );
    assert!(stats.max_bucket >= 1);
}
