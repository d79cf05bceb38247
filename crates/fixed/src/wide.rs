// Copyright 2025 Irreducible Inc.

use std::{
	fmt::{self, Debug},
	iter::Sum,
	marker::PhantomData,
	ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign},
};

use crate::{wrap_to_bits, FixedPoint};

/// Double-width accumulator for words of type `T`.
///
/// Holds `2 * T::WIDTH` bits and wraps around on overflow. Products, partial sums, section sums
/// and checksums all live in this format until they are brought back to the working width by
/// [`Wide::rescale`].
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Wide<T> {
	raw: i64,
	_marker: PhantomData<T>,
}

impl<T> Wide<T> {
	pub const ZERO: Self = Self {
		raw: 0,
		_marker: PhantomData,
	};

	pub const fn raw(self) -> i64 {
		self.raw
	}
}

impl<T: FixedPoint> Wide<T> {
	pub const BITS: u32 = 2 * T::WIDTH;

	#[inline]
	pub fn from_raw(raw: i64) -> Self {
		Self {
			raw: wrap_to_bits(raw, Self::BITS),
			_marker: PhantomData,
		}
	}

	/// Truncating rescale to the working format.
	///
	/// Arithmetic right shift by `T::FRAC_BITS` (rounding toward negative infinity), then wrap to
	/// `T::WIDTH` bits. This is the only way a wide value leaves the accumulator format, so the
	/// pipeline, both checksums and the reference convolution agree bit for bit.
	#[inline]
	pub fn rescale(self) -> T {
		T::from_raw(self.raw >> T::FRAC_BITS)
	}

	/// Flips the accumulator bit that ends up as bit `bit` of [`Self::rescale`].
	pub fn flip_output_bit(self, bit: u32) -> Self {
		assert!(bit < T::WIDTH, "bit {bit} is outside of a {}-bit word", T::WIDTH);
		Self::from_raw(self.raw ^ (1 << (bit + T::FRAC_BITS)))
	}
}

impl<T> Default for Wide<T> {
	fn default() -> Self {
		Self::ZERO
	}
}

impl<T> Debug for Wide<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "Wide({})", self.raw)
	}
}

impl<T: FixedPoint> From<T> for Wide<T> {
	fn from(value: T) -> Self {
		value.widen()
	}
}

impl<T: FixedPoint> Add for Wide<T> {
	type Output = Self;

	#[inline]
	fn add(self, rhs: Self) -> Self {
		Self::from_raw(self.raw.wrapping_add(rhs.raw))
	}
}

impl<T: FixedPoint> AddAssign for Wide<T> {
	#[inline]
	fn add_assign(&mut self, rhs: Self) {
		*self = *self + rhs;
	}
}

impl<T: FixedPoint> Sub for Wide<T> {
	type Output = Self;

	#[inline]
	fn sub(self, rhs: Self) -> Self {
		Self::from_raw(self.raw.wrapping_sub(rhs.raw))
	}
}

impl<T: FixedPoint> SubAssign for Wide<T> {
	#[inline]
	fn sub_assign(&mut self, rhs: Self) {
		*self = *self - rhs;
	}
}

impl<T: FixedPoint> Mul for Wide<T> {
	type Output = Self;

	#[inline]
	fn mul(self, rhs: Self) -> Self {
		Self::from_raw(self.raw.wrapping_mul(rhs.raw))
	}
}

impl<T: FixedPoint> Neg for Wide<T> {
	type Output = Self;

	fn neg(self) -> Self {
		Self::from_raw(self.raw.wrapping_neg())
	}
}

impl<T: FixedPoint> Sum for Wide<T> {
	fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
		iter.fold(Self::ZERO, Add::add)
	}
}

impl<'a, T: FixedPoint> Sum<&'a Wide<T>> for Wide<T> {
	fn sum<I: Iterator<Item = &'a Self>>(iter: I) -> Self {
		iter.copied().sum()
	}
}

#[cfg(test)]
mod tests {
	use proptest::prelude::*;

	use super::*;
	use crate::{Word16, Word8};

	#[test]
	fn test_rescale_halves() {
		let half = Word16::from_f64(0.5);
		let quarter = Word16::from_f64(0.25);
		assert_eq!(half.widening_mul(half).rescale(), quarter);
		assert_eq!(half.widening_mul(Word16::from_f64(-0.5)).rescale(), Word16::from_f64(-0.25));
	}

	#[test]
	fn test_rescale_rounds_toward_negative_infinity() {
		let tiny = Word16::from_raw(1);
		let minus_tiny = Word16::from_raw(-1);
		assert_eq!(tiny.widening_mul(tiny).rescale().raw(), 0);
		assert_eq!(tiny.widening_mul(minus_tiny).rescale().raw(), -1);
	}

	#[test]
	fn test_accumulator_wraps_at_double_width() {
		let max = Wide::<Word8>::from_raw(i16::MAX as i64);
		let one = Wide::<Word8>::from_raw(1);
		assert_eq!((max + one).raw(), i16::MIN as i64);
		assert_eq!((Wide::<Word8>::ZERO - one).raw(), -1);
		assert_eq!((-Wide::<Word8>::from_raw(i16::MIN as i64)).raw(), i16::MIN as i64);
	}

	#[test]
	fn test_flip_output_bit_targets_rescaled_word() {
		let value = Word16::from_f64(0.5).widen() * Word16::from_raw((1 << 15) - 1).widen();
		for bit in 0..16 {
			let flipped = value.flip_output_bit(bit);
			assert_eq!(flipped.rescale(), value.rescale().flip_bit(bit));
		}
	}

	proptest! {
		#[test]
		fn test_sum_is_order_independent(values in proptest::collection::vec(any::<i32>(), 0..64)) {
			let words = values
				.iter()
				.map(|&v| Word16::from_raw(v as i64).widen())
				.collect::<Vec<_>>();
			let forward: Wide<Word16> = words.iter().sum();
			let backward: Wide<Word16> = words.iter().rev().sum();
			prop_assert_eq!(forward, backward);
		}

		#[test]
		fn test_products_distribute_over_sums(
			a in any::<i16>(),
			b in any::<i16>(),
			c in any::<i16>(),
		) {
			let [a, b, c] = [a, b, c].map(|v| Word16::from_raw(v as i64));
			let lhs = a.widen() * (b.widen() + c.widen());
			let rhs = a.widening_mul(b) + a.widening_mul(c);
			prop_assert_eq!(lhs, rhs);
		}

		#[test]
		fn test_single_flip_always_changes_output(raw in any::<i64>(), bit in 0u32..16) {
			let value = Wide::<Word16>::from_raw(raw);
			let flipped = value.flip_output_bit(bit);
			prop_assert_ne!(flipped.rescale(), value.rescale());
			prop_assert_eq!(flipped.rescale(), value.rescale().flip_bit(bit));
		}
	}
}
