// Copyright 2025 Irreducible Inc.

//! Scoped buffer allocation for tile buffers.

use std::sync::Mutex;

use bytemuck::{zeroed_vec, Zeroable};

pub trait ComputeAllocator<T> {
	/// Allocates a slice of elements.
	///
	/// This method operates on an immutable self reference so that multiple allocations can be
	/// alive at the same time, the way the input and weight tiles of every input-channel group
	/// of a tile are.
	fn alloc(&self, n: usize) -> Result<&mut [T], Error>;

	/// Borrow the remaining unallocated capacity.
	///
	/// This allows another allocator to have unique mutable access to the rest of the elements in
	/// this allocator until it gets dropped, at which point this allocator can be used again.
	fn remaining(&mut self) -> &mut [T];

	/// Returns the remaining number of elements that can be allocated.
	fn capacity(&self) -> usize;

	/// Returns the remaining unallocated capacity as a new allocator with a limited scope.
	fn subscope_allocator(&mut self) -> impl ComputeAllocator<T>;
}

/// Basic bump allocator that allocates slices from an underlying buffer provided at
/// construction.
pub struct BumpAllocator<'a, T> {
	buffer: Mutex<Option<&'a mut [T]>>,
}

impl<'a, T> BumpAllocator<'a, T> {
	pub fn new(buffer: &'a mut [T]) -> Self {
		Self {
			buffer: Mutex::new(Some(buffer)),
		}
	}
}

impl<T> ComputeAllocator<T> for BumpAllocator<'_, T> {
	fn alloc(&self, n: usize) -> Result<&mut [T], Error> {
		let mut buffer_lock = self.buffer.lock().expect("mutex is always available");

		let buffer = buffer_lock
			.take()
			.expect("buffer is always Some by invariant");
		// buffer temporarily contains None
		if buffer.len() < n {
			let available = buffer.len();
			*buffer_lock = Some(buffer);
			// buffer contains Some, invariant restored
			Err(Error::OutOfMemory {
				requested: n,
				available,
			})
		} else {
			let (lhs, rhs) = buffer.split_at_mut(n);
			*buffer_lock = Some(rhs);
			// buffer contains Some, invariant restored
			Ok(lhs)
		}
	}

	fn remaining(&mut self) -> &mut [T] {
		self.buffer
			.get_mut()
			.expect("mutex is always available")
			.as_deref_mut()
			.expect("buffer is always Some by invariant")
	}

	fn capacity(&self) -> usize {
		self.buffer
			.lock()
			.expect("mutex is always available")
			.as_ref()
			.expect("buffer is always Some by invariant")
			.len()
	}

	fn subscope_allocator(&mut self) -> impl ComputeAllocator<T> {
		BumpAllocator::new(self.remaining())
	}
}

/// Owns a zero-initialised host buffer and hands out bump allocators over it.
///
/// The orchestrator keeps one arena per convolution and takes a fresh allocator for every tile,
/// so tile buffers are released all at once when the tile is done.
pub struct HostArena<T> {
	data: Vec<T>,
}

impl<T: Zeroable> HostArena<T> {
	pub fn new(capacity: usize) -> Self {
		Self {
			data: zeroed_vec(capacity),
		}
	}
}

impl<T> HostArena<T> {
	pub fn capacity(&self) -> usize {
		self.data.len()
	}

	pub fn allocator(&mut self) -> BumpAllocator<'_, T> {
		BumpAllocator::new(self.data.as_mut_slice())
	}
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("allocator is out of memory: requested {requested} elements, {available} available")]
	OutOfMemory { requested: usize, available: usize },
}

#[cfg(test)]
mod tests {
	use assert_matches::assert_matches;

	use super::*;

	#[test]
	fn test_alloc() {
		let mut data = (0..256u32).collect::<Vec<_>>();

		{
			let bump = BumpAllocator::new(&mut data);
			assert_eq!(bump.alloc(100).unwrap().len(), 100);
			assert_eq!(bump.alloc(100).unwrap().len(), 100);
			assert_matches!(
				bump.alloc(100),
				Err(Error::OutOfMemory {
					requested: 100,
					available: 56
				})
			);
			// Release memory all at once.
		}

		// Reuse memory
		let bump = BumpAllocator::new(&mut data);
		let data = bump.alloc(100).unwrap();
		assert_eq!(data.len(), 100);
	}

	#[test]
	fn test_live_allocations_are_disjoint() {
		let mut data = vec![0u32; 8];
		let bump = BumpAllocator::new(&mut data);
		let lhs = bump.alloc(4).unwrap();
		let rhs = bump.alloc(4).unwrap();
		lhs.fill(1);
		rhs.fill(2);
		drop(bump);
		assert_eq!(data, [1, 1, 1, 1, 2, 2, 2, 2]);
	}

	#[test]
	fn test_stack_alloc() {
		let mut data = vec![0u32; 256];
		let mut bump = BumpAllocator::new(&mut data);
		assert_eq!(bump.alloc(100).unwrap().len(), 100);
		assert_matches!(bump.alloc(200), Err(Error::OutOfMemory { .. }));

		{
			let bump2 = bump.subscope_allocator();
			let _ = bump2.alloc(100).unwrap();
			assert_matches!(bump2.alloc(57), Err(Error::OutOfMemory { .. }));
			let _ = bump2.alloc(56).unwrap();
		}

		assert_eq!(bump.capacity(), 156);
		let _ = bump.alloc(100).unwrap();
	}

	#[test]
	fn test_arena_reuse() {
		let mut arena = HostArena::<u32>::new(16);
		assert_eq!(arena.capacity(), 16);
		{
			let bump = arena.allocator();
			bump.alloc(16).unwrap().fill(9);
			assert_eq!(bump.capacity(), 0);
		}
		let bump = arena.allocator();
		assert_eq!(bump.capacity(), 16);
		assert_eq!(bump.alloc(16).unwrap(), &[9; 16]);
	}
}
