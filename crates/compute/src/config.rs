// Copyright 2025 Irreducible Inc.

//! Convolution layer and tiling configuration.

use std::fmt;

use tilecheck_utils::{
	checked_arithmetics::{ceil_div, checked_int_div},
	ensure,
};

use crate::Error;

/// Dimensions of one convolution layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConvShape {
	/// Output channels.
	pub m: usize,
	/// Input channels.
	pub n: usize,
	/// Output rows.
	pub r: usize,
	/// Output columns.
	pub c: usize,
	/// Kernel size, kernels are `k × k`.
	pub k: usize,
	/// Stride.
	pub s: usize,
	/// Batch size.
	pub batches: usize,
}

impl ConvShape {
	/// Rows of the (already padded) input, `(r - 1) * s + k`.
	pub fn input_rows(&self) -> usize {
		(self.r - 1) * self.s + self.k
	}

	/// Columns of the (already padded) input, `(c - 1) * s + k`.
	pub fn input_cols(&self) -> usize {
		(self.c - 1) * self.s + self.k
	}

	pub fn input_shape(&self) -> [usize; 4] {
		[self.batches, self.n, self.input_rows(), self.input_cols()]
	}

	pub fn weights_shape(&self) -> [usize; 5] {
		[self.batches, self.n, self.m, self.k, self.k]
	}

	pub fn output_shape(&self) -> [usize; 4] {
		[self.batches, self.m, self.r, self.c]
	}
}

/// Tile sizes and pipeline lane widths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileShape {
	/// Output channels per tile.
	pub tm: usize,
	/// Input channels per input-channel group.
	pub tn: usize,
	/// Output rows per tile.
	pub tr: usize,
	/// Output columns per tile.
	pub tc: usize,
	/// Output-channel lanes of the convolve stage.
	pub um: usize,
	/// Input-channel lanes of the convolve stage.
	pub un: usize,
}

/// Per-tile sizes shared by the pipeline stages and the checksum engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileGeometry {
	pub tm: usize,
	pub tn: usize,
	pub tr: usize,
	pub tc: usize,
	pub um: usize,
	pub un: usize,
	pub k: usize,
	pub s: usize,
	/// Padded tile rows, `(tr - 1) * s + k`.
	pub trr: usize,
	/// Padded tile columns, `(tc - 1) * s + k`.
	pub tcc: usize,
}

impl TileGeometry {
	pub fn input_plane_len(&self) -> usize {
		self.trr * self.tcc
	}

	pub fn input_tile_shape(&self) -> [usize; 3] {
		[self.tn, self.trr, self.tcc]
	}

	pub fn input_tile_len(&self) -> usize {
		self.tn * self.input_plane_len()
	}

	pub fn weights_plane_len(&self) -> usize {
		self.tm * self.k * self.k
	}

	pub fn weights_tile_shape(&self) -> [usize; 4] {
		[self.tn, self.tm, self.k, self.k]
	}

	pub fn weights_tile_len(&self) -> usize {
		self.tn * self.weights_plane_len()
	}

	pub fn output_tile_shape(&self) -> [usize; 3] {
		[self.tm, self.tr, self.tc]
	}

	pub fn output_tile_len(&self) -> usize {
		self.tm * self.tr * self.tc
	}

	/// Number of `um`-lane passes over the tile's output channels.
	pub fn lane_groups(&self) -> usize {
		checked_int_div(self.tm, self.um)
	}
}

/// A validated convolution configuration.
///
/// [`ConvConfig::new`] is the only constructor, so every instance satisfies the tiling
/// constraints the pipeline and the checksum engine rely on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConvConfig {
	shape: ConvShape,
	tiles: TileShape,
}

impl ConvConfig {
	pub fn new(shape: ConvShape, tiles: TileShape) -> Result<Self, Error> {
		let dimensions = [
			("M", shape.m),
			("N", shape.n),
			("R", shape.r),
			("C", shape.c),
			("K", shape.k),
			("S", shape.s),
			("B", shape.batches),
			("Tm", tiles.tm),
			("Tn", tiles.tn),
			("Tr", tiles.tr),
			("Tc", tiles.tc),
			("Um", tiles.um),
			("Un", tiles.un),
		];
		for (name, value) in dimensions {
			ensure!(value > 0, Error::ZeroDimension { name });
		}

		ensure!(
			tiles.tn % tiles.un == 0,
			Error::LanesMustDivideTile {
				tile: "Tn",
				tile_size: tiles.tn,
				lanes: "Un",
				lane_width: tiles.un,
			}
		);
		ensure!(
			tiles.tm % tiles.um == 0,
			Error::LanesMustDivideTile {
				tile: "Tm",
				tile_size: tiles.tm,
				lanes: "Um",
				lane_width: tiles.um,
			}
		);
		ensure!(
			shape.s <= shape.k,
			Error::StrideExceedsKernel {
				stride: shape.s,
				kernel: shape.k,
			}
		);

		let config = Self { shape, tiles };
		let required = config.min_tile_extent();
		let geometry = config.geometry();
		for (axis, extent) in [("row", geometry.trr), ("column", geometry.tcc)] {
			ensure!(
				extent >= required,
				Error::TileTooSmallForChecksum {
					axis,
					extent,
					required,
				}
			);
		}

		Ok(config)
	}

	pub fn shape(&self) -> &ConvShape {
		&self.shape
	}

	pub fn tiles(&self) -> &TileShape {
		&self.tiles
	}

	pub fn geometry(&self) -> TileGeometry {
		let ConvShape { k, s, .. } = self.shape;
		let TileShape {
			tm,
			tn,
			tr,
			tc,
			um,
			un,
		} = self.tiles;
		TileGeometry {
			tm,
			tn,
			tr,
			tc,
			um,
			un,
			k,
			s,
			trr: (tr - 1) * s + k,
			tcc: (tc - 1) * s + k,
		}
	}

	/// Smallest padded tile extent for which the sliding-window checksum is defined, `2k - s`.
	pub fn min_tile_extent(&self) -> usize {
		2 * self.shape.k - self.shape.s
	}

	/// Number of output-channel tiles, `⌈M / Tm⌉`.
	pub fn channel_tiles(&self) -> usize {
		ceil_div(self.shape.m, self.tiles.tm)
	}

	/// Number of input-channel groups per tile, `⌈N / Tn⌉`.
	pub fn input_groups(&self) -> usize {
		ceil_div(self.shape.n, self.tiles.tn)
	}

	pub fn row_tiles(&self) -> usize {
		ceil_div(self.shape.r, self.tiles.tr)
	}

	pub fn col_tiles(&self) -> usize {
		ceil_div(self.shape.c, self.tiles.tc)
	}

	/// Total number of tiles, `B · ⌈M/Tm⌉ · ⌈R/Tr⌉ · ⌈C/Tc⌉`.
	pub fn n_tiles(&self) -> usize {
		self.shape.batches * self.channel_tiles() * self.row_tiles() * self.col_tiles()
	}

	/// Elements of buffer space one tile needs: the output tile plus every input-channel group's
	/// input and weights tiles.
	pub fn tile_buffer_len(&self) -> usize {
		let geometry = self.geometry();
		geometry.output_tile_len()
			+ self.input_groups() * (geometry.input_tile_len() + geometry.weights_tile_len())
	}

	/// Whether this configuration was built for exactly the given layer parameters.
	pub fn compatibility_check(
		&self,
		m: usize,
		n: usize,
		r: usize,
		c: usize,
		k: usize,
		s: usize,
		batches: usize,
	) -> bool {
		self.shape
			== ConvShape {
				m,
				n,
				r,
				c,
				k,
				s,
				batches,
			}
	}
}

impl fmt::Display for ConvConfig {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let ConvShape {
			m,
			n,
			r,
			c,
			k,
			s,
			batches,
		} = self.shape;
		let TileShape {
			tm,
			tn,
			tr,
			tc,
			um,
			un,
		} = self.tiles;
		let geometry = self.geometry();
		writeln!(f, "M={m} N={n} R={r} C={c} K={k} S={s} B={batches}")?;
		writeln!(f, "Tm={tm} Tn={tn} Tr={tr} Tc={tc} Um={um} Un={un}")?;
		writeln!(
			f,
			"RR={} CC={} Trr={} Tcc={}",
			self.shape.input_rows(),
			self.shape.input_cols(),
			geometry.trr,
			geometry.tcc
		)?;
		write!(f, "tiles={} groups={}", self.n_tiles(), self.input_groups())
	}
}

#[cfg(test)]
mod tests {
	use assert_matches::assert_matches;

	use super::*;

	fn shape() -> ConvShape {
		ConvShape {
			m: 6,
			n: 5,
			r: 7,
			c: 9,
			k: 3,
			s: 1,
			batches: 2,
		}
	}

	fn tiles() -> TileShape {
		TileShape {
			tm: 4,
			tn: 2,
			tr: 4,
			tc: 4,
			um: 2,
			un: 1,
		}
	}

	#[test]
	fn test_derived_sizes() {
		let config = ConvConfig::new(shape(), tiles()).unwrap();
		assert_eq!(config.shape().input_shape(), [2, 5, 9, 11]);
		assert_eq!(config.channel_tiles(), 2);
		assert_eq!(config.input_groups(), 3);
		assert_eq!(config.row_tiles(), 2);
		assert_eq!(config.col_tiles(), 3);
		assert_eq!(config.n_tiles(), 2 * 2 * 2 * 3);

		let geometry = config.geometry();
		assert_eq!((geometry.trr, geometry.tcc), (6, 6));
		assert_eq!(
			config.tile_buffer_len(),
			4 * 4 * 4 + 3 * (2 * 6 * 6 + 2 * 4 * 3 * 3)
		);
	}

	#[test]
	fn test_rejects_zero_dimensions() {
		let mut shape = shape();
		shape.k = 0;
		assert_matches!(
			ConvConfig::new(shape, tiles()),
			Err(Error::ZeroDimension { name: "K" })
		);

		let mut tiles = tiles();
		tiles.un = 0;
		assert_matches!(
			ConvConfig::new(self::shape(), tiles),
			Err(Error::ZeroDimension { name: "Un" })
		);
	}

	#[test]
	fn test_rejects_lane_widths_not_dividing_tiles() {
		let mut tiles = tiles();
		tiles.un = 3;
		assert_matches!(
			ConvConfig::new(shape(), tiles),
			Err(Error::LanesMustDivideTile { tile: "Tn", .. })
		);

		let mut tiles = self::tiles();
		tiles.um = 3;
		assert_matches!(
			ConvConfig::new(shape(), tiles),
			Err(Error::LanesMustDivideTile { tile: "Tm", .. })
		);
	}

	#[test]
	fn test_rejects_stride_above_kernel() {
		let mut shape = shape();
		shape.s = 4;
		assert_matches!(
			ConvConfig::new(shape, tiles()),
			Err(Error::StrideExceedsKernel { stride: 4, kernel: 3 })
		);
	}

	#[test]
	fn test_tile_extent_bound_is_inclusive() {
		// Trr = (tr - 1) + 3 must reach 2K - S = 5.
		let mut tiles = tiles();
		tiles.tr = 3;
		assert!(ConvConfig::new(shape(), tiles).is_ok());

		tiles.tr = 2;
		assert_matches!(
			ConvConfig::new(shape(), tiles),
			Err(Error::TileTooSmallForChecksum {
				axis: "row",
				extent: 4,
				required: 5
			})
		);
	}

	#[test]
	fn test_strided_extent_bound() {
		let mut shape = shape();
		shape.k = 4;
		shape.s = 2;
		let mut tiles = tiles();
		// Tcc = 2 * (tc - 1) + 4 against 2K - S = 6.
		tiles.tc = 1;
		assert_matches!(
			ConvConfig::new(shape, tiles),
			Err(Error::TileTooSmallForChecksum {
				axis: "column",
				extent: 4,
				required: 6
			})
		);
		tiles.tc = 2;
		assert!(ConvConfig::new(shape, tiles).is_ok());
	}

	#[test]
	fn test_compatibility_check() {
		let config = ConvConfig::new(shape(), tiles()).unwrap();
		assert!(config.compatibility_check(6, 5, 7, 9, 3, 1, 2));

		let exact = [6, 5, 7, 9, 3, 1, 2];
		for position in 0..exact.len() {
			for delta in [-1i64, 1] {
				let mut params = exact;
				params[position] = (params[position] as i64 + delta) as usize;
				let [m, n, r, c, k, s, b] = params;
				assert!(!config.compatibility_check(m, n, r, c, k, s, b));
			}
		}
	}

	#[test]
	fn test_display_lists_constants() {
		let config = ConvConfig::new(shape(), tiles()).unwrap();
		let text = config.to_string();
		assert!(text.contains("M=6 N=5 R=7 C=9 K=3 S=1 B=2"));
		assert!(text.contains("Trr=6 Tcc=6"));
		assert!(text.contains("tiles=24"));
	}
}
