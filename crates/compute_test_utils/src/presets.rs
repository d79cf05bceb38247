// Copyright 2025 Irreducible Inc.

//! Named configurations used across tests, benchmarks and the command-line driver.

use tilecheck_compute::{ConvConfig, ConvShape, TileShape};

fn config(shape: ConvShape, tiles: TileShape) -> ConvConfig {
	ConvConfig::new(shape, tiles).expect("preset configurations are valid")
}

/// One 3×3 output from a 5×5 input with a single 3×3 kernel, a single tile.
pub fn single_tile() -> ConvConfig {
	config(
		ConvShape {
			m: 1,
			n: 1,
			r: 3,
			c: 3,
			k: 3,
			s: 1,
			batches: 1,
		},
		TileShape {
			tm: 1,
			tn: 1,
			tr: 3,
			tc: 3,
			um: 1,
			un: 1,
		},
	)
}

/// Dimensions that are not multiples of the tile sizes, so every kind of padding occurs, and
/// several input-channel groups per tile.
pub fn ragged() -> ConvConfig {
	config(
		ConvShape {
			m: 5,
			n: 7,
			r: 9,
			c: 10,
			k: 3,
			s: 1,
			batches: 2,
		},
		TileShape {
			tm: 4,
			tn: 4,
			tr: 4,
			tc: 4,
			um: 2,
			un: 2,
		},
	)
}

/// Stride 2 with a 4×4 kernel.
pub fn strided() -> ConvConfig {
	config(
		ConvShape {
			m: 3,
			n: 4,
			r: 5,
			c: 6,
			k: 4,
			s: 2,
			batches: 1,
		},
		TileShape {
			tm: 2,
			tn: 2,
			tr: 3,
			tc: 2,
			um: 1,
			un: 2,
		},
	)
}

/// Default layer of the command-line driver: 16 channels in and out over a 32×32 output.
pub fn layer() -> ConvConfig {
	config(
		ConvShape {
			m: 16,
			n: 16,
			r: 32,
			c: 32,
			k: 3,
			s: 1,
			batches: 1,
		},
		TileShape {
			tm: 8,
			tn: 8,
			tr: 8,
			tc: 8,
			um: 4,
			un: 4,
		},
	)
}
