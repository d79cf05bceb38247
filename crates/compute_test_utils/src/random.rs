// Copyright 2025 Irreducible Inc.

use std::iter::repeat_with;

use rand::Rng;
use tilecheck_compute::{ConvConfig, Tensor};
use tilecheck_fixed::FixedPoint;

/// A uniformly random word over the full raw range of `T`.
pub fn random_word<T: FixedPoint>(rng: &mut impl Rng) -> T {
	T::from_raw(rng.gen_range(T::MIN_RAW..=T::MAX_RAW))
}

/// Uniformly random input and weights tensors shaped for `config`.
pub fn random_tensors<T: FixedPoint>(
	config: &ConvConfig,
	mut rng: impl Rng,
) -> (Tensor<T, 4>, Tensor<T, 5>) {
	let shape = config.shape();
	let input_shape = shape.input_shape();
	let weights_shape = shape.weights_shape();

	let input = repeat_with(|| random_word(&mut rng))
		.take(input_shape.iter().product())
		.collect();
	let weights = repeat_with(|| random_word(&mut rng))
		.take(weights_shape.iter().product())
		.collect();
	(
		Tensor::from_vec(input_shape, input).expect("length matches shape"),
		Tensor::from_vec(weights_shape, weights).expect("length matches shape"),
	)
}
