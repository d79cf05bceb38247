// Copyright 2025 Irreducible Inc.

use itertools::iproduct;
use tilecheck_fixed::{FixedPoint, Wide};

use super::{ChecksumAccumulator, InputChecksum};
use crate::TileGeometry;

/// Software input-checksum path.
///
/// Recomputes, for every output position of the tile, the full `K × K` multiply-accumulate over
/// the group's input channels and adds it to the checksum. This costs as much as the convolution
/// itself and serves as an independent cross-check of the sliding-window path.
#[derive(Debug, Clone, Copy)]
pub struct DirectChecksum {
	geometry: TileGeometry,
}

impl DirectChecksum {
	pub fn new(geometry: TileGeometry) -> Self {
		Self { geometry }
	}
}

impl<T: FixedPoint> InputChecksum<T> for DirectChecksum {
	fn accumulate_group(
		&self,
		input_tile: &[T],
		weights_tile: &[T],
		checksum: &mut ChecksumAccumulator<T>,
	) {
		let TileGeometry {
			tm,
			tn,
			tr,
			tc,
			k,
			s,
			tcc,
			..
		} = self.geometry;
		let input_plane = self.geometry.input_plane_len();
		let weights_plane = self.geometry.weights_plane_len();

		for (ito, ir, ic) in iproduct!(0..tm, 0..tr, 0..tc) {
			let value = iproduct!(0..tn, 0..k, 0..k)
				.map(|(iti, i, j)| {
					let weight = weights_tile[iti * weights_plane + (ito * k + i) * k + j];
					let input = input_tile[iti * input_plane + (s * ir + i) * tcc + s * ic + j];
					weight.widening_mul(input)
				})
				.sum::<Wide<T>>();
			checksum.add(value);
		}
	}
}
