// Copyright 2024-2025 Irreducible Inc.

/// Division implementation that fails in case when `a` isn't divisible by `b`
pub const fn checked_int_div(a: usize, b: usize) -> usize {
	let result = a / b;
	assert!(b * result == a);

	result
}

/// Number of chunks of size `den` needed to cover `num` elements.
pub const fn ceil_div(num: usize, den: usize) -> usize {
	num.div_ceil(den)
}
