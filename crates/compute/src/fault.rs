// Copyright 2025 Irreducible Inc.

/// One fault flag per tile, in tile processing order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FaultVector {
	flags: Vec<bool>,
}

impl FaultVector {
	pub fn new(tiles: usize) -> Self {
		Self {
			flags: vec![false; tiles],
		}
	}

	pub fn len(&self) -> usize {
		self.flags.len()
	}

	pub fn is_empty(&self) -> bool {
		self.flags.is_empty()
	}

	pub fn set(&mut self, tile: usize, faulty: bool) {
		self.flags[tile] = faulty;
	}

	pub fn is_faulty(&self, tile: usize) -> bool {
		self.flags[tile]
	}

	/// Number of faulty tiles.
	pub fn count(&self) -> usize {
		self.flags.iter().filter(|&&faulty| faulty).count()
	}

	pub fn any(&self) -> bool {
		self.flags.contains(&true)
	}

	pub fn faulty_tiles(&self) -> impl Iterator<Item = usize> + '_ {
		self.flags
			.iter()
			.enumerate()
			.filter_map(|(tile, &faulty)| faulty.then_some(tile))
	}

	pub fn as_slice(&self) -> &[bool] {
		&self.flags
	}
}

/// A single bit flip applied to one finalized output value of one tile before the checksum
/// comparison.
///
/// `channel`, `row` and `col` are coordinates inside the `[tm, tr, tc]` output tile and `bit` is
/// the bit of the rescaled word that flips. This emulates an unreliable accelerator, for example
/// one that is clocked past its timing closure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InjectedFault {
	pub tile: usize,
	pub channel: usize,
	pub row: usize,
	pub col: usize,
	pub bit: u32,
}
