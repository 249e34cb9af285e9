//! CiA 301 Q-format fixed-point codec
//!
//! Drive profiles carry velocity, acceleration and gain values as a signed
//! integer part plus an unsigned fraction scaled to the fraction field's full
//! bit width. The pair of helpers here converts between that representation
//! and `f64`.

/// Integer-part types accepted by the codec
pub trait FixedInteger: Copy {
    /// Truncate a real value toward zero into this type
    fn truncate(value: f64) -> Self;
    /// Widen back to `f64`
    fn to_f64(self) -> f64;
    /// Sign of the combined value; `false` for zero
    fn is_negative(self) -> bool;
}

/// Fraction-part types accepted by the codec
pub trait FixedFraction: Copy {
    /// Field width in bits; the fraction is scaled by `2^BITS`
    const BITS: u32;
    /// Quantize a fraction in `[0, 1)` to this field, rounding to nearest
    fn quantize(fraction: f64) -> Self;
    /// Widen the raw field value to `f64`
    fn to_f64(self) -> f64;
}

macro_rules! impl_fixed_integer {
    ($($t:ty),*) => {
        $(
            impl FixedInteger for $t {
                fn truncate(value: f64) -> Self {
                    value.trunc() as $t
                }

                fn to_f64(self) -> f64 {
                    self as f64
                }

                fn is_negative(self) -> bool {
                    self < 0
                }
            }
        )*
    };
}

macro_rules! impl_fixed_fraction {
    ($($t:ty),*) => {
        $(
            impl FixedFraction for $t {
                const BITS: u32 = 8 * core::mem::size_of::<$t>() as u32;

                fn quantize(fraction: f64) -> Self {
                    (fraction * (1u64 << Self::BITS) as f64).round() as $t
                }

                fn to_f64(self) -> f64 {
                    self as f64
                }
            }
        )*
    };
}

impl_fixed_integer!(i8, i16, i32);
impl_fixed_fraction!(u8, u16, u32);

/// Split a real value into integer and fraction fields
///
/// The integer part truncates toward zero; the fraction is the absolute
/// remainder scaled by `2^BITS` of the fraction type, rounded to nearest.
pub fn encode_fixed_point<I: FixedInteger, F: FixedFraction>(value: f64) -> (I, F) {
    let integer = I::truncate(value);
    let fraction = F::quantize((value - value.trunc()).abs());
    (integer, fraction)
}

/// Recombine integer and fraction fields into a real value
///
/// The fraction takes the sign of the integer part. A value in `(-1, 0)`
/// therefore cannot round-trip: its integer part encodes as zero, and zero
/// carries no sign, so it decodes as positive.
pub fn decode_fixed_point<I: FixedInteger, F: FixedFraction>(integer: I, fraction: F) -> f64 {
    let frac = fraction.to_f64() / (1u64 << F::BITS) as f64;
    if integer.is_negative() {
        integer.to_f64() - frac
    } else {
        integer.to_f64() + frac
    }
}
