// Copyright 2025 Irreducible Inc.

use std::{
	fmt::{self, Debug, Display},
	hash::Hash,
};

use bytemuck::{Pod, Zeroable};

use crate::{wrap_to_bits, Wide};

/// A signed fixed-point word of `WIDTH` bits, `FRAC_BITS` of which are fractional.
///
/// Values are stored as raw two's complement integers; the real number represented by a word is
/// `raw / 2^FRAC_BITS`. Construction from a raw integer wraps around to `WIDTH` bits.
pub trait FixedPoint:
	Copy + Debug + Default + Eq + Hash + Send + Sync + Zeroable + 'static
{
	/// Total number of bits, sign bit included. At most 32.
	const WIDTH: u32;
	/// Number of fractional bits. Strictly less than [`Self::WIDTH`].
	const FRAC_BITS: u32;

	const ZERO: Self;

	/// Smallest representable raw value.
	const MIN_RAW: i64 = -(1 << (Self::WIDTH - 1));
	/// Largest representable raw value.
	const MAX_RAW: i64 = (1 << (Self::WIDTH - 1)) - 1;

	/// Builds a word from a raw integer, keeping only the low `WIDTH` bits.
	fn from_raw(raw: i64) -> Self;

	/// The raw two's complement integer, sign-extended.
	fn raw(self) -> i64;

	/// Converts into the double-width accumulator format without rescaling.
	fn widen(self) -> Wide<Self> {
		Wide::from_raw(self.raw())
	}

	/// Exact product in the double-width accumulator format.
	///
	/// The product of two `WIDTH`-bit words always fits `2 * WIDTH` bits, so this never wraps.
	fn widening_mul(self, rhs: Self) -> Wide<Self> {
		Wide::from_raw(self.raw() * rhs.raw())
	}

	/// Quantises a real number to the nearest word, wrapping on overflow.
	fn from_f64(value: f64) -> Self {
		Self::from_raw((value * (1u64 << Self::FRAC_BITS) as f64).round() as i64)
	}

	fn to_f64(self) -> f64 {
		self.raw() as f64 / (1u64 << Self::FRAC_BITS) as f64
	}
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct Fixed<const WIDTH: u32, const FRAC_BITS: u32>(i32);

/// Default working format: 16-bit words with 15 fractional bits, values in `[-1, 1)`.
pub type Word16 = Fixed<16, 15>;
/// 8-bit words with 7 fractional bits.
pub type Word8 = Fixed<8, 7>;

impl<const WIDTH: u32, const FRAC_BITS: u32> Fixed<WIDTH, FRAC_BITS> {
	const VALID_FORMAT: () = assert!(
		WIDTH >= 1 && WIDTH <= 32 && FRAC_BITS < WIDTH,
		"fixed-point width must be in 1..=32 with fewer fractional bits than total bits"
	);

	pub const fn new(raw: i64) -> Self {
		#[allow(clippy::let_unit_value)]
		let () = Self::VALID_FORMAT;
		Self(wrap_to_bits(raw, WIDTH) as i32)
	}

	pub const fn to_raw(self) -> i64 {
		self.0 as i64
	}

	/// Flips a single bit of the word, `bit` counting from the least significant bit.
	pub const fn flip_bit(self, bit: u32) -> Self {
		assert!(bit < WIDTH);
		Self::new(self.to_raw() ^ (1 << bit))
	}
}

// SAFETY: `Fixed` is a transparent wrapper around an `i32` and every bit pattern is valid.
unsafe impl<const WIDTH: u32, const FRAC_BITS: u32> Zeroable for Fixed<WIDTH, FRAC_BITS> {}
// SAFETY: see above, there is no padding and no invalid bit pattern.
unsafe impl<const WIDTH: u32, const FRAC_BITS: u32> Pod for Fixed<WIDTH, FRAC_BITS> {}

impl<const WIDTH: u32, const FRAC_BITS: u32> FixedPoint for Fixed<WIDTH, FRAC_BITS> {
	const WIDTH: u32 = WIDTH;
	const FRAC_BITS: u32 = FRAC_BITS;
	const ZERO: Self = Self(0);

	#[inline]
	fn from_raw(raw: i64) -> Self {
		Self::new(raw)
	}

	#[inline]
	fn raw(self) -> i64 {
		self.to_raw()
	}
}

impl<const WIDTH: u32, const FRAC_BITS: u32> Display for Fixed<WIDTH, FRAC_BITS> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		Display::fmt(&self.to_f64(), f)
	}
}

#[cfg(test)]
mod tests {
	use proptest::prelude::*;

	use super::*;

	#[test]
	fn test_from_raw_wraps_to_width() {
		assert_eq!(Word8::from_raw(127).raw(), 127);
		assert_eq!(Word8::from_raw(128).raw(), -128);
		assert_eq!(Word8::from_raw(-129).raw(), 127);
		assert_eq!(Word16::from_raw(0x1_2345).raw(), 0x2345);
		assert_eq!(Word16::MIN_RAW, -32768);
		assert_eq!(Word16::MAX_RAW, 32767);
	}

	#[test]
	fn test_real_value_conversion() {
		assert_eq!(Word16::from_f64(0.5).raw(), 1 << 14);
		assert_eq!(Word16::from_f64(-0.25).raw(), -(1 << 13));
		assert_eq!(Word16::from_f64(-1.0).raw(), Word16::MIN_RAW);
		assert_eq!(Word8::from_raw(-64).to_f64(), -0.5);
		assert_eq!(Word16::from_f64(0.75).to_string(), "0.75");
	}

	#[test]
	fn test_widening_mul_is_exact() {
		let min = Word16::from_raw(Word16::MIN_RAW);
		assert_eq!(min.widening_mul(min).raw(), 1 << 30);

		let a = Word16::from_raw(-12345);
		let b = Word16::from_raw(321);
		assert_eq!(a.widening_mul(b).raw(), -12345 * 321);
	}

	#[test]
	fn test_flip_bit() {
		assert_eq!(Word8::from_raw(0).flip_bit(7).raw(), -128);
		assert_eq!(Word8::from_raw(5).flip_bit(0).raw(), 4);
	}

	proptest! {
		#[test]
		fn test_raw_roundtrip_in_range(raw in Word16::MIN_RAW..=Word16::MAX_RAW) {
			prop_assert_eq!(Word16::from_raw(raw).raw(), raw);
		}

		#[test]
		fn test_wrap_is_modular(raw in any::<i32>(), k in -4i64..4) {
			let shifted = raw as i64 + k * (1 << 16);
			prop_assert_eq!(Word16::from_raw(shifted), Word16::from_raw(raw as i64));
		}
	}
}
