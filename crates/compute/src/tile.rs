// Copyright 2025 Irreducible Inc.

//! Tile enumeration and the copies between full tensors and tile buffers.

use std::ops::{Deref, DerefMut};

use itertools::iproduct;
use tilecheck_fixed::FixedPoint;

use crate::{ConvConfig, Tensor};

/// Position of one tile in the output, as element offsets of its first output channel, row and
/// column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileIndex {
	pub batch: usize,
	pub channel: usize,
	pub row: usize,
	pub col: usize,
}

impl TileIndex {
	/// Index of the tile in the fixed processing order batch → output channel → row → column.
	pub fn flat(&self, config: &ConvConfig) -> usize {
		let tiles = config.tiles();
		((self.batch * config.channel_tiles() + self.channel / tiles.tm) * config.row_tiles()
			+ self.row / tiles.tr)
			* config.col_tiles()
			+ self.col / tiles.tc
	}
}

/// Iterates over all tiles of a configuration in processing order.
pub fn tile_indices(config: &ConvConfig) -> impl Iterator<Item = TileIndex> {
	let shape = *config.shape();
	let tiles = *config.tiles();
	iproduct!(
		0..shape.batches,
		(0..shape.m).step_by(tiles.tm),
		(0..shape.r).step_by(tiles.tr),
		(0..shape.c).step_by(tiles.tc)
	)
	.map(|(batch, channel, row, col)| TileIndex {
		batch,
		channel,
		row,
		col,
	})
}

/// Position of an input-channel group among the groups of a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GroupPosition {
	pub index: usize,
	pub count: usize,
}

impl GroupPosition {
	pub fn new(index: usize, count: usize) -> Self {
		debug_assert!(index < count);
		Self { index, count }
	}

	pub fn is_first(&self) -> bool {
		self.index == 0
	}

	pub fn is_last(&self) -> bool {
		self.index + 1 == self.count
	}

	/// The partial-sum half this group writes.
	pub fn current_half(&self) -> usize {
		self.index % 2
	}

	/// The partial-sum half the previous group wrote.
	pub fn previous_half(&self) -> usize {
		1 - self.current_half()
	}
}

/// Copies the input window of one input-channel group into a `[tn, trr, tcc]` tile.
///
/// Channels past the end of the input and positions past the padded input extent are zero.
pub fn prepare_input_tile<T, Data>(
	config: &ConvConfig,
	input: &Tensor<T, 4>,
	index: TileIndex,
	first_input_channel: usize,
	tile: &mut Tensor<T, 3, Data>,
) where
	T: FixedPoint,
	Data: DerefMut<Target = [T]>,
{
	let shape = config.shape();
	let [tn, trr, tcc] = tile.shape();
	let channels = shape.n - first_input_channel;
	let rows = shape.input_rows() - shape.s * index.row;
	let cols = shape.input_cols() - shape.s * index.col;

	for (iti, ir, ic) in iproduct!(0..tn, 0..trr, 0..tcc) {
		tile[[iti, ir, ic]] = if iti >= channels || ir >= rows || ic >= cols {
			T::ZERO
		} else {
			input[[
				index.batch,
				first_input_channel + iti,
				shape.s * index.row + ir,
				shape.s * index.col + ic,
			]]
		};
	}
}

/// Copies the weights of one input-channel group into a `[tn, tm, k, k]` tile.
///
/// Input or output channels past the end of the weights are zero.
pub fn prepare_weights_tile<T, Data>(
	config: &ConvConfig,
	weights: &Tensor<T, 5>,
	index: TileIndex,
	first_input_channel: usize,
	tile: &mut Tensor<T, 4, Data>,
) where
	T: FixedPoint,
	Data: DerefMut<Target = [T]>,
{
	let shape = config.shape();
	let [tn, tm, k, _] = tile.shape();
	let input_channels = shape.n - first_input_channel;
	let output_channels = shape.m - index.channel;

	for (iti, ito, i, j) in iproduct!(0..tn, 0..tm, 0..k, 0..k) {
		tile[[iti, ito, i, j]] = if iti >= input_channels || ito >= output_channels {
			T::ZERO
		} else {
			weights[[index.batch, first_input_channel + iti, index.channel + ito, i, j]]
		};
	}
}

/// Copies the valid part of a `[tm, tr, tc]` output tile into the output tensor.
///
/// Output channels, rows and columns of the tile that fall past the end of the output are
/// padding and are skipped.
pub fn store_output_tile<T, Data>(
	config: &ConvConfig,
	tile: &Tensor<T, 3, Data>,
	index: TileIndex,
	output: &mut Tensor<T, 4>,
) where
	T: FixedPoint,
	Data: Deref<Target = [T]>,
{
	let shape = config.shape();
	let [tm, tr, tc] = tile.shape();
	let channels = tm.min(shape.m - index.channel);
	let rows = tr.min(shape.r - index.row);
	let cols = tc.min(shape.c - index.col);

	for (ito, ir) in iproduct!(0..channels, 0..rows) {
		let source = &tile.outer(ito)[ir * tc..ir * tc + cols];
		for (ic, &value) in source.iter().enumerate() {
			output[[
				index.batch,
				index.channel + ito,
				index.row + ir,
				index.col + ic,
			]] = value;
		}
	}
}

#[cfg(test)]
mod tests {
	use tilecheck_fixed::Word16;

	use super::*;
	use crate::{ConvShape, TileShape};

	fn config() -> ConvConfig {
		ConvConfig::new(
			ConvShape {
				m: 3,
				n: 3,
				r: 5,
				c: 4,
				k: 3,
				s: 1,
				batches: 2,
			},
			TileShape {
				tm: 2,
				tn: 2,
				tr: 3,
				tc: 3,
				um: 1,
				un: 1,
			},
		)
		.unwrap()
	}

	fn counting<const D: usize>(shape: [usize; D]) -> Tensor<Word16, D> {
		let len = shape.iter().product::<usize>();
		Tensor::from_vec(shape, (1..=len as i64).map(Word16::from_raw).collect()).unwrap()
	}

	#[test]
	fn test_tile_order_and_flat_index() {
		let config = config();
		let indices = tile_indices(&config).collect::<Vec<_>>();
		assert_eq!(indices.len(), config.n_tiles());
		assert_eq!(
			indices[..3],
			[
				TileIndex {
					batch: 0,
					channel: 0,
					row: 0,
					col: 0
				},
				TileIndex {
					batch: 0,
					channel: 0,
					row: 0,
					col: 3
				},
				TileIndex {
					batch: 0,
					channel: 0,
					row: 3,
					col: 0
				},
			]
		);
		for (position, index) in indices.iter().enumerate() {
			assert_eq!(index.flat(&config), position);
		}
	}

	#[test]
	fn test_group_positions() {
		let single = GroupPosition::new(0, 1);
		assert!(single.is_first() && single.is_last());

		let middle = GroupPosition::new(1, 3);
		assert!(!middle.is_first() && !middle.is_last());
		assert_eq!((middle.current_half(), middle.previous_half()), (1, 0));

		let last = GroupPosition::new(2, 3);
		assert!(last.is_last());
		assert_eq!((last.current_half(), last.previous_half()), (0, 1));
	}

	#[test]
	fn test_input_tile_padding_is_zero() {
		let config = config();
		let input = counting(config.shape().input_shape());
		let geometry = config.geometry();
		let mut tile = Tensor::<Word16, 3>::new(geometry.input_tile_shape());

		// Last column tile, second input-channel group: one real channel, columns 3..6 of 6.
		let index = TileIndex {
			batch: 1,
			channel: 2,
			row: 3,
			col: 3,
		};
		tile.fill(Word16::from_raw(-1));
		prepare_input_tile(&config, &input, index, 2, &mut tile);

		for (iti, ir, ic) in iproduct!(0..2, 0..5, 0..5) {
			let expected = if iti == 0 && ir < 4 && ic < 3 {
				input[[1, 2, 3 + ir, 3 + ic]]
			} else {
				Word16::ZERO
			};
			assert_eq!(tile[[iti, ir, ic]], expected, "at {iti} {ir} {ic}");
		}
	}

	#[test]
	fn test_weights_tile_padding_is_zero() {
		let config = config();
		let weights = counting(config.shape().weights_shape());
		let geometry = config.geometry();
		let mut tile = Tensor::<Word16, 4>::new(geometry.weights_tile_shape());

		let index = TileIndex {
			batch: 0,
			channel: 2,
			row: 0,
			col: 0,
		};
		prepare_weights_tile(&config, &weights, index, 2, &mut tile);

		for (iti, ito, i, j) in iproduct!(0..2, 0..2, 0..3, 0..3) {
			let expected = if iti == 0 && ito == 0 {
				weights[[0, 2, 2, i, j]]
			} else {
				Word16::ZERO
			};
			assert_eq!(tile[[iti, ito, i, j]], expected);
		}
	}

	#[test]
	fn test_store_output_tile_skips_padding() {
		let config = config();
		let geometry = config.geometry();
		let tile = counting::<3>(geometry.output_tile_shape());
		let mut output = Tensor::<Word16, 4>::new(config.shape().output_shape());

		let index = TileIndex {
			batch: 1,
			channel: 2,
			row: 3,
			col: 3,
		};
		store_output_tile(&config, &tile, index, &mut output);

		let written = output
			.as_slice()
			.iter()
			.filter(|value| **value != Word16::ZERO)
			.count();
		// One valid channel, two valid rows, one valid column.
		assert_eq!(written, 2);
		assert_eq!(output[[1, 2, 3, 3]], tile[[0, 0, 0]]);
		assert_eq!(output[[1, 2, 4, 3]], tile[[0, 1, 0]]);
	}
}
