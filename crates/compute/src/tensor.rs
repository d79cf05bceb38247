// Copyright 2025 Irreducible Inc.

use std::ops::{Deref, DerefMut, Index, IndexMut};

use bytemuck::{allocation::zeroed_vec, Zeroable};
use tilecheck_utils::bail;

use crate::Error;

/// Dense `D`-dimensional array with row-major layout.
///
/// The last axis is contiguous. `Data` is any slice container, so the same type serves owned
/// tensors and views over buffers handed out by an allocator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tensor<T, const D: usize, Data: Deref<Target = [T]> = Vec<T>> {
	data: Data,
	shape: [usize; D],
}

impl<T: Default + Clone, const D: usize> Tensor<T, D> {
	/// Create a tensor of the given shape filled with default values.
	pub fn new(shape: [usize; D]) -> Self {
		Self {
			data: vec![T::default(); shape.iter().product()],
			shape,
		}
	}
}

impl<T, const D: usize> Tensor<T, D> {
	/// Create a tensor of the given shape filled with zeroes.
	pub fn zeroed(shape: [usize; D]) -> Self
	where
		T: Zeroable,
	{
		Self {
			data: zeroed_vec(shape.iter().product()),
			shape,
		}
	}

	pub fn from_vec(shape: [usize; D], data: Vec<T>) -> Result<Self, Error> {
		Self::from_buffer(shape, data)
	}

	pub fn into_vec(self) -> Vec<T> {
		self.data
	}
}

impl<T, const D: usize, Data: Deref<Target = [T]>> Tensor<T, D, Data> {
	/// Wrap an existing buffer whose length matches the shape exactly.
	pub fn from_buffer(shape: [usize; D], data: Data) -> Result<Self, Error> {
		let expected = shape.iter().product::<usize>();
		if data.len() != expected {
			bail!(Error::TensorLength {
				shape: shape.to_vec(),
				expected,
				actual: data.len(),
			});
		}
		Ok(Self { data, shape })
	}

	pub fn shape(&self) -> [usize; D] {
		self.shape
	}

	pub fn len(&self) -> usize {
		self.data.len()
	}

	pub fn is_empty(&self) -> bool {
		self.data.is_empty()
	}

	/// Flat offset of a multi-index, or `None` if any coordinate is out of range.
	pub fn offset(&self, index: [usize; D]) -> Option<usize> {
		index
			.iter()
			.zip(&self.shape)
			.try_fold(0, |offset, (&i, &dim)| (i < dim).then_some(offset * dim + i))
	}

	pub fn get(&self, index: [usize; D]) -> Option<&T> {
		self.offset(index).map(|offset| &self.data[offset])
	}

	pub fn as_slice(&self) -> &[T] {
		&self.data
	}

	/// The contiguous block of elements whose leading coordinate is `i`.
	pub fn outer(&self, i: usize) -> &[T] {
		let stride = self.outer_stride();
		&self.data[i * stride..(i + 1) * stride]
	}

	/// Iterate over the blocks of the leading axis.
	pub fn iter_outer(&self) -> impl Iterator<Item = &[T]> {
		self.data.chunks_exact(self.outer_stride().max(1))
	}

	/// View of the tensor borrowing its elements.
	pub fn view(&self) -> Tensor<T, D, &[T]> {
		Tensor {
			data: self.data.deref(),
			shape: self.shape,
		}
	}

	pub fn into_inner(self) -> Data {
		self.data
	}

	fn outer_stride(&self) -> usize {
		self.shape.iter().skip(1).product()
	}

	fn expect_offset(&self, index: [usize; D]) -> usize {
		match self.offset(index) {
			Some(offset) => offset,
			None => panic!("index {index:?} is out of bounds for shape {:?}", self.shape),
		}
	}
}

impl<T, const D: usize, Data: DerefMut<Target = [T]>> Tensor<T, D, Data> {
	pub fn get_mut(&mut self, index: [usize; D]) -> Option<&mut T> {
		self.offset(index).map(|offset| &mut self.data[offset])
	}

	pub fn as_mut_slice(&mut self) -> &mut [T] {
		&mut self.data
	}

	pub fn outer_mut(&mut self, i: usize) -> &mut [T] {
		let stride = self.outer_stride();
		&mut self.data[i * stride..(i + 1) * stride]
	}

	pub fn fill(&mut self, value: T)
	where
		T: Clone,
	{
		self.data.fill(value);
	}
}

impl<T, const D: usize, Data: Deref<Target = [T]>> Index<[usize; D]> for Tensor<T, D, Data> {
	type Output = T;

	fn index(&self, index: [usize; D]) -> &T {
		&self.data[self.expect_offset(index)]
	}
}

impl<T, const D: usize, Data: DerefMut<Target = [T]>> IndexMut<[usize; D]> for Tensor<T, D, Data> {
	fn index_mut(&mut self, index: [usize; D]) -> &mut T {
		let offset = self.expect_offset(index);
		&mut self.data[offset]
	}
}
