// Copyright 2025 Irreducible Inc.

use crate::TileGeometry;

/// Partition of one padded tile axis into the bands the section sums are kept over.
///
/// An axis of extent `L = (T - 1)·S + K` (`T` output positions) is split into `2K - S` bands:
///
/// - `K - S` leading single positions `0..K-S`,
/// - `S` middle bands, band `K - S + p` collecting the positions of `K-S..S·T` congruent to `p`
///   modulo `S`,
/// - `K - S` trailing single positions `S·T..L`.
///
/// Kernel offset `i` touches positions `i, i + S, .., i + S·(T - 1)`, which is always a union of
/// whole bands. Moving from offset `i - S` to `i` drops the position `i - S` and adds
/// `i - S + S·T`, each of which is a single band on its own or lies in the middle band of its
/// residue. For `S = 1` this is the familiar layout of `2K - 1` sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BandLayout {
	kernel: usize,
	stride: usize,
	windows: usize,
}

impl BandLayout {
	/// ## Preconditions
	///
	/// - `1 <= stride <= kernel`
	/// - `stride * windows >= kernel`, equivalently the extent is at least `2 * kernel - stride`
	pub fn new(kernel: usize, stride: usize, windows: usize) -> Self {
		debug_assert!(stride >= 1 && stride <= kernel);
		debug_assert!(stride * windows >= kernel);
		Self {
			kernel,
			stride,
			windows,
		}
	}

	pub fn kernel(&self) -> usize {
		self.kernel
	}

	pub fn stride(&self) -> usize {
		self.stride
	}

	/// Extent of the padded axis.
	pub fn extent(&self) -> usize {
		(self.windows - 1) * self.stride + self.kernel
	}

	/// Number of bands, `2K - S`.
	pub fn len(&self) -> usize {
		2 * self.kernel - self.stride
	}

	pub fn is_empty(&self) -> bool {
		false
	}

	fn singles(&self) -> usize {
		self.kernel - self.stride
	}

	fn tail_start(&self) -> usize {
		self.stride * self.windows
	}

	/// The band a position belongs to.
	#[inline]
	pub fn band_of(&self, position: usize) -> usize {
		debug_assert!(position < self.extent());
		let singles = self.singles();
		let tail_start = self.tail_start();
		if position < singles {
			position
		} else if position < tail_start {
			singles + position % self.stride
		} else {
			singles + self.stride + (position - tail_start)
		}
	}

	/// The bands whose union is exactly the set of positions kernel offset `offset` touches.
	pub fn offset_bands(&self, offset: usize) -> Vec<usize> {
		debug_assert!(offset < self.kernel);
		let singles = self.singles();
		let residue = offset % self.stride;
		let last = offset + self.stride * (self.windows - 1);
		let head = (offset..singles).step_by(self.stride);
		let tail = (self.tail_start() + residue..=last)
			.step_by(self.stride)
			.map(|position| self.band_of(position));
		head.chain([singles + residue]).chain(tail).collect()
	}

	/// The band entering and the band leaving the window when moving from offset `offset - S`
	/// to `offset`.
	pub fn step(&self, offset: usize) -> (usize, usize) {
		debug_assert!(offset >= self.stride && offset < self.kernel);
		let previous = offset - self.stride;
		(
			self.band_of(previous + self.tail_start()),
			self.band_of(previous),
		)
	}
}

/// Band layouts of both axes of a padded input tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SectionLayout {
	pub rows: BandLayout,
	pub cols: BandLayout,
}

impl SectionLayout {
	pub fn new(geometry: &TileGeometry) -> Self {
		Self {
			rows: BandLayout::new(geometry.k, geometry.s, geometry.tr),
			cols: BandLayout::new(geometry.k, geometry.s, geometry.tc),
		}
	}

	pub fn kernel(&self) -> usize {
		self.rows.kernel()
	}

	pub fn stride(&self) -> usize {
		self.rows.stride()
	}

	/// Shape of the section-sum matrix, `[2K - S, 2K - S]`.
	pub fn shape(&self) -> [usize; 2] {
		[self.rows.len(), self.cols.len()]
	}
}
