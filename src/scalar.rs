//! Scalar kinds supported by the transforms.
//!
//! All operations are generic over a single [`Scalar`] parameter, which is either a real number
//! or a complex number. Transform matrices always hold real entries, i.e. entries of type
//! `T::RealField`, and norms are always real.
use nalgebra::{ComplexField, RealField};

/// A real scalar.
pub trait Real: RealField + Copy {}

impl<T: RealField + Copy> Real for T {}

/// A real or complex scalar.
///
/// Implemented for `f32`, `f64` and `nalgebra::Complex` of those.
pub trait Scalar: ComplexField<RealField: Real> + Copy {}

impl<T> Scalar for T where T: ComplexField<RealField: Real> + Copy {}

/// Converts an `f64` constant into the real field of `T`.
#[inline]
pub(crate) fn real<T: Scalar>(value: f64) -> T::RealField {
    nalgebra::convert(value)
}
