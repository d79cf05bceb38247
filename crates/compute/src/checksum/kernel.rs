// Copyright 2025 Irreducible Inc.

use tilecheck_fixed::{FixedPoint, Wide};

use crate::Tensor;

/// Per-kernel-position sums of the weights of one input channel across a tile's output
/// channels, `[K, K]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelSums<T> {
	sums: Tensor<Wide<T>, 2>,
}

impl<T: FixedPoint> KernelSums<T> {
	pub fn new(k: usize) -> Self {
		Self {
			sums: Tensor::new([k, k]),
		}
	}

	/// Sums a whole `[tm, k, k]` weights plane.
	pub fn from_plane(k: usize, plane: &[T]) -> Self {
		let mut sums = Self::new(k);
		for kernel in plane.chunks_exact(k * k) {
			sums.add_kernel(kernel);
		}
		sums
	}

	/// Adds the `k × k` kernel of one output channel.
	#[inline]
	pub fn add_kernel(&mut self, kernel: &[T]) {
		debug_assert_eq!(kernel.len(), self.sums.len());
		for (sum, &weight) in self.sums.as_mut_slice().iter_mut().zip(kernel) {
			*sum += weight.widen();
		}
	}

	pub fn reset(&mut self) {
		self.sums.fill(Wide::ZERO);
	}

	pub fn get(&self, i: usize, j: usize) -> Wide<T> {
		self.sums[[i, j]]
	}

	pub fn as_slice(&self) -> &[Wide<T>] {
		self.sums.as_slice()
	}
}
