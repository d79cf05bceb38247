// Copyright 2025 Irreducible Inc.

//! Algorithm-based fault tolerance checksums.
//!
//! For every tile the engine computes an input-checksum from the raw operands and an
//! output-checksum from the values the pipeline produced:
//!
//! ```text
//! input  = Σ_channels Σ_i,j X[i][j] · W[i][j]
//! output = Σ_o,r,c  Y[o][r][c]
//! ```
//!
//! where `X[i][j]` is the sum of an input plane over every position kernel offset `(i, j)`
//! touches and `W[i][j]` the sum of that channel's weights over the tile's output channels. Both
//! sides are computed in the double-width accumulator with wraparound arithmetic, so they agree
//! exactly unless an output value was corrupted.

mod bands;
mod direct;
mod kernel;
mod sections;

pub use bands::*;
pub use direct::*;
pub use kernel::*;
pub use sections::*;
use tilecheck_fixed::{FixedPoint, Wide};

use crate::TileGeometry;

/// Running checksum of one tile in the double-width accumulator format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChecksumAccumulator<T> {
	sum: Wide<T>,
}

impl<T: FixedPoint> ChecksumAccumulator<T> {
	pub fn new() -> Self {
		Self { sum: Wide::ZERO }
	}

	#[inline]
	pub fn add(&mut self, value: Wide<T>) {
		self.sum += value;
	}

	/// Adds `Σ X[i][j] · W[i][j]` for one input channel.
	pub fn add_window_products(&mut self, windows: &WindowSums<T>, kernel: &KernelSums<T>) {
		self.sum += windows
			.as_slice()
			.iter()
			.zip(kernel.as_slice())
			.map(|(&x, &w)| x * w)
			.sum::<Wide<T>>();
	}

	pub fn value(&self) -> Wide<T> {
		self.sum
	}

	/// The checksum rescaled to the working format.
	pub fn finish(&self) -> T {
		self.sum.rescale()
	}
}

/// A way of computing the input-checksum of a tile, one input-channel group at a time.
pub trait InputChecksum<T: FixedPoint> {
	/// Folds one input-channel group, given as a `[tn, trr, tcc]` input tile and a
	/// `[tn, tm, k, k]` weights tile, into `checksum`.
	fn accumulate_group(
		&self,
		input_tile: &[T],
		weights_tile: &[T],
		checksum: &mut ChecksumAccumulator<T>,
	);

	/// The input-checksum of a whole tile.
	fn tile_checksum<'a, I>(&self, groups: I) -> ChecksumAccumulator<T>
	where
		T: 'a,
		I: IntoIterator<Item = (&'a [T], &'a [T])>,
	{
		let mut checksum = ChecksumAccumulator::new();
		for (input_tile, weights_tile) in groups {
			self.accumulate_group(input_tile, weights_tile, &mut checksum);
		}
		checksum
	}
}

/// Sliding-window input-checksum path, sequentially.
///
/// The pipeline runs the same three steps (section scan, kernel sums, window products) spread
/// over its load and checksum stages.
#[derive(Debug, Clone, Copy)]
pub struct SlidingWindowChecksum {
	geometry: TileGeometry,
	layout: SectionLayout,
}

impl SlidingWindowChecksum {
	pub fn new(geometry: TileGeometry) -> Self {
		Self {
			geometry,
			layout: SectionLayout::new(&geometry),
		}
	}

	pub fn layout(&self) -> &SectionLayout {
		&self.layout
	}
}

impl<T: FixedPoint> InputChecksum<T> for SlidingWindowChecksum {
	fn accumulate_group(
		&self,
		input_tile: &[T],
		weights_tile: &[T],
		checksum: &mut ChecksumAccumulator<T>,
	) {
		let mut scanner = SectionScanner::new(self.layout);
		let planes = input_tile
			.chunks_exact(self.geometry.input_plane_len())
			.zip(weights_tile.chunks_exact(self.geometry.weights_plane_len()));
		for (input_plane, weights_plane) in planes {
			let sections = scanner.scan_plane(input_plane);
			let windows = WindowSums::from_sections(&self.layout, &sections);
			let kernel = KernelSums::from_plane(self.geometry.k, weights_plane);
			checksum.add_window_products(&windows, &kernel);
		}
	}
}
