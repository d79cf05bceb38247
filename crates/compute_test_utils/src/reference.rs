// Copyright 2025 Irreducible Inc.

use itertools::iproduct;
use rayon::prelude::*;
use tilecheck_compute::{ConvConfig, Tensor};
use tilecheck_fixed::{FixedPoint, Wide};

/// Direct convolution over the full tensors, without tiling.
///
/// Accumulates every output in the double-width format and rescales it once, the same way the
/// pipeline finalizes its outputs, so the two agree bit for bit.
pub fn reference_convolution<T: FixedPoint>(
	config: &ConvConfig,
	input: &Tensor<T, 4>,
	weights: &Tensor<T, 5>,
) -> Tensor<T, 4> {
	let shape = *config.shape();
	let mut output = Tensor::zeroed(shape.output_shape());
	output
		.as_mut_slice()
		.par_chunks_mut(shape.r * shape.c)
		.enumerate()
		.for_each(|(plane, values)| {
			let (batch, to) = (plane / shape.m, plane % shape.m);
			for (row, col) in iproduct!(0..shape.r, 0..shape.c) {
				values[row * shape.c + col] = iproduct!(0..shape.n, 0..shape.k, 0..shape.k)
					.map(|(ti, i, j)| {
						weights[[batch, ti, to, i, j]].widening_mul(
							input[[batch, ti, shape.s * row + i, shape.s * col + j]],
						)
					})
					.sum::<Wide<T>>()
					.rescale();
			}
		});
	output
}
