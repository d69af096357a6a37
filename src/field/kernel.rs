//! The limb-kernel contract.
//!
//! Everything above the multiplier (exponentiation, inversion, square roots,
//! byte codecs, curve and bucket arithmetic) is written once against this
//! trait; `fp51` and `wide29` each implement it for their limb scheme.

use super::{fp51, wide29};
use crate::errors::Result;

/// The contract every limb kernel implements once.
///
/// Values are elements of `F_p` in Montgomery form (`x·R mod p` with
/// `R = 2^radix_bits`). A value is *weakly reduced* when it is below the
/// kernel's weak bound (`p + 2^204` for `fp51`, `2p` for `wide29`); all
/// operations accept and produce weakly reduced values with canonical
/// (non-negative, in-range) limbs unless noted otherwise.
pub trait FieldKernel: Send + Sync + 'static {
    type Elem: Copy + Clone + Send + Sync + PartialEq + Eq + std::fmt::Debug + Default;

    fn modulus_bits(&self) -> usize;
    /// log2 of the Montgomery radix `R`.
    fn radix_bits(&self) -> usize;
    /// Canonical encoded width in bytes.
    fn encoded_len(&self) -> usize;
    /// The modulus as little-endian `u64` limbs.
    fn modulus_u64(&self) -> &[u64];

    fn zero(&self) -> Self::Elem;

    /// Montgomery product `x·y·R^{−1}`, weakly reduced.
    fn mul(&self, x: &Self::Elem, y: &Self::Elem) -> Self::Elem;
    /// Montgomery product without the trailing conditional subtraction.
    /// The result's value is below `2p + 2^204`; it must be fed back only
    /// through `reduce` or operations documented to accept it.
    fn mul_raw(&self, x: &Self::Elem, y: &Self::Elem) -> Self::Elem;
    fn square(&self, x: &Self::Elem) -> Self::Elem {
        self.mul(x, x)
    }

    fn add(&self, x: &Self::Elem, y: &Self::Elem) -> Self::Elem;
    fn sub(&self, x: &Self::Elem, y: &Self::Elem) -> Self::Elem;
    fn neg(&self, x: &Self::Elem) -> Self::Elem;

    /// One conditional `−p`, bringing a `mul_raw` result into the weak range.
    fn reduce(&self, x: &mut Self::Elem);
    /// Canonicalise a weakly reduced value to `< p`.
    fn fully_reduce(&self, x: &mut Self::Elem);

    /// Canonicalising equality.
    fn equals(&self, x: &Self::Elem, y: &Self::Elem) -> bool;
    fn is_zero(&self, x: &Self::Elem) -> bool;
    /// Canonicalising lexicographic order on the integer values.
    fn is_greater(&self, x: &Self::Elem, y: &Self::Elem) -> bool;

    /// Canonical integer value as little-endian `u64` limbs
    /// (`⌈modulus_bits/64⌉` of them). No Montgomery conversion.
    fn to_int(&self, x: &Self::Elem) -> Vec<u64>;
    /// Inverse of `to_int`; the input must be `< p`.
    fn from_int(&self, limbs: &[u64]) -> Self::Elem;
}

/// Kernel construction from a modulus, for generic engine factories. Each
/// kernel rejects moduli outside its representable range, which is how
/// `Engine::create` enforces the per-kernel bound at init time.
pub trait KernelInit: FieldKernel + Sized {
    fn from_modulus(modulus: &[u64]) -> Result<Self>;
}

impl KernelInit for fp51::Fp51 {
    fn from_modulus(modulus: &[u64]) -> Result<Self> {
        fp51::Fp51::new(modulus, fp51::Backend::detect())
    }
}

impl KernelInit for wide29::Wide29 {
    fn from_modulus(modulus: &[u64]) -> Result<Self> {
        wide29::Wide29::new(modulus)
    }
}
