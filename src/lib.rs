//! # Sarissa: a batched-affine multi-scalar multiplication engine
//!
//! Computes `S = Σ sᵢ·Gᵢ` over prime-field short Weierstrass curves with the
//! bucket (Pippenger) method, tuned for the `N = 2^14 … 2^18` instances that
//! dominate zero-knowledge proving workloads.
//!
//! ## Structure
//!
//! - `field`: Montgomery field arithmetic: a 5×51-bit FMA kernel for moduli
//!   below `2^255 − 2^206` (with a bit-identical integer fallback) and a
//!   16×29-bit kernel for wider moduli, under one shared field layer
//!   (inversion, batch inversion, square roots, exponentiation)
//! - `scalar`: GLV endomorphism decomposition and signed-window slicing
//! - `curve`: affine/projective point arithmetic and the batched-affine
//!   addition primitives
//! - `arena`: the flat shared point storage the sorted-bucket pipeline
//!   requires
//! - `pool`: the fixed worker pool with barrier-phase scheduling
//! - `msm`: the engine itself: counting sort, bucket accumulation trees,
//!   column reduction, final combiner
//! - `params`: curve parameter presets (BLS12-381 G1, BN254 G1)
//!
//! ## Architecture
//!
//! The engine is bulk-synchronous: every MSM is a fixed sequence of phases
//! executed by all workers with barriers in between, sharing one flat arena.
//! Batched affine addition amortises one field inversion over thousands of
//! curve additions, which is what makes the sorted-bucket layout worth its
//! memory.
//!
//! ```ignore
//! let mut engine = Bls12381Engine::create(&CurveParams::bls12_381())?;
//! engine.start_threads(8)?;
//! let (sum, stats) = engine.msm(&scalars, &points, &MsmOptions::default())?;
//! let affine = engine.to_affine(&sum);
//! ```

pub mod arena;
pub mod bigint;
pub mod curve;
pub mod errors;
pub mod field;
pub mod msm;
pub mod params;
pub mod pool;
pub mod scalar;

// Re-exports
pub use errors::{MsmError, Result};
pub use msm::{Engine, MsmOptions, MsmStats};
pub use params::CurveParams;

/// Engine over the 16×29-bit kernel (moduli up to 448 bits).
pub type Bls12381Engine = Engine<field::wide29::Wide29>;

/// Engine over the 5×51-bit FMA kernel (moduli below `2^255 − 2^206`).
pub type Bn254Engine = Engine<field::fp51::Fp51>;
