// Copyright 2025 Irreducible Inc.

//! Bit-precise fixed-point arithmetic.
//!
//! Every value in the convolution core is a signed two's complement word of a configured width.
//! Products are accumulated exactly in a double-width accumulator ([`Wide`]) and brought back to
//! the working format by a single truncating right shift ([`Wide::rescale`]). All arithmetic
//! wraps on overflow, so any two computations of the same sum agree bit for bit regardless of
//! accumulation order.

mod fixed;
mod wide;

pub use fixed::*;
pub use wide::*;

/// Sign-extends the low `bits` bits of `raw`, discarding everything above them.
///
/// ## Preconditions
///
/// - `bits` must be in `1..=64`
#[inline]
pub const fn wrap_to_bits(raw: i64, bits: u32) -> i64 {
	let shift = 64 - bits;
	(raw << shift) >> shift
}
