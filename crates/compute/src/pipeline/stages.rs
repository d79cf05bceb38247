// Copyright 2025 Irreducible Inc.

//! Bodies of the pipeline stages. Each runs on its own thread and talks to its peers only
//! through channels, apart from the partial-sum halves and accumulators it was handed.

use crossbeam_channel::{Receiver, Sender};
use itertools::iproduct;
use tilecheck_fixed::{FixedPoint, Wide};

use super::partial_sum::carry;
use crate::{
	checksum::{
		ChecksumAccumulator, KernelSums, SectionLayout, SectionScanner, SectionSums, WindowSums,
	},
	fault::InjectedFault,
	tile::GroupPosition,
	Error, TileGeometry,
};

pub const LOAD_INPUT: &str = "load-input";
pub const LOAD_WEIGHTS: &str = "load-weights";
pub const INPUT_CHECKSUM: &str = "input-checksum";
pub const CONVOLVE: &str = "convolve";
pub const STORE_OUTPUT: &str = "store-output";

fn disconnected(stage: &'static str) -> Error {
	Error::StageDisconnected { stage }
}

/// Streams the input planes of a `[tn, trr, tcc]` tile, scanning section sums on the way.
pub fn load_input<T: FixedPoint>(
	geometry: TileGeometry,
	input_tile: &[T],
	planes: Sender<Vec<T>>,
	sections: Option<(SectionLayout, Sender<SectionSums<T>>)>,
) -> Result<(), Error> {
	let mut scanner = sections.map(|(layout, sender)| (SectionScanner::new(layout), sender));
	for plane in input_tile.chunks_exact(geometry.input_plane_len()) {
		if let Some((scanner, sender)) = &mut scanner {
			for (row, values) in plane.chunks_exact(geometry.tcc).enumerate() {
				scanner.push_row(row, values);
			}
			sender
				.send(scanner.take())
				.map_err(|_| disconnected(INPUT_CHECKSUM))?;
		}
		planes
			.send(plane.to_vec())
			.map_err(|_| disconnected(CONVOLVE))?;
	}
	Ok(())
}

/// Streams the weight planes of a `[tn, tm, k, k]` tile, summing kernels across output channels
/// on the way.
pub fn load_weights<T: FixedPoint>(
	geometry: TileGeometry,
	weights_tile: &[T],
	planes: Sender<Vec<T>>,
	kernels: Option<Sender<KernelSums<T>>>,
) -> Result<(), Error> {
	let kernel_len = geometry.k * geometry.k;
	let mut sums = KernelSums::new(geometry.k);
	for plane in weights_tile.chunks_exact(geometry.weights_plane_len()) {
		if let Some(sender) = &kernels {
			for (ito, kernel) in plane.chunks_exact(kernel_len).enumerate() {
				if ito == 0 {
					sums.reset();
				}
				sums.add_kernel(kernel);
				if ito + 1 == geometry.tm {
					sender
						.send(sums.clone())
						.map_err(|_| disconnected(INPUT_CHECKSUM))?;
				}
			}
		}
		planes
			.send(plane.to_vec())
			.map_err(|_| disconnected(CONVOLVE))?;
	}
	Ok(())
}

/// Folds the section sums and kernel sums of every input channel into the input checksum.
pub fn input_checksum<T: FixedPoint>(
	geometry: TileGeometry,
	layout: SectionLayout,
	sections: Receiver<SectionSums<T>>,
	kernels: Receiver<KernelSums<T>>,
	checksum: &mut ChecksumAccumulator<T>,
) -> Result<(), Error> {
	for _ in 0..geometry.tn {
		let sections = sections.recv().map_err(|_| disconnected(LOAD_INPUT))?;
		let kernel = kernels.recv().map_err(|_| disconnected(LOAD_WEIGHTS))?;
		let windows = WindowSums::from_sections(&layout, &sections);
		checksum.add_window_products(&windows, &kernel);
	}
	Ok(())
}

/// Multiply-accumulate over the group's input channels for every output lane and position.
///
/// The `um` lane registers of a lane group accumulate over the kernel offsets and `un`-wide
/// input-channel sub-tiles. After the last of them the registers are combined with the carried
/// partial sums; on the last group the finalized values go out on the lane channels in the order
/// (lane group, row, column, lane).
pub fn convolve<T: FixedPoint>(
	geometry: TileGeometry,
	position: GroupPosition,
	input_planes: Receiver<Vec<T>>,
	weight_planes: Receiver<Vec<T>>,
	previous: &[Wide<T>],
	current: &mut [Wide<T>],
	lanes: Vec<Sender<Wide<T>>>,
) -> Result<(), Error> {
	let TileGeometry {
		tn,
		tr,
		tc,
		um,
		un,
		k,
		s,
		tcc,
		..
	} = geometry;

	// Planes are taken in channel order from both loaders so neither of them stalls the other.
	let mut input = Vec::with_capacity(tn);
	let mut weights = Vec::with_capacity(tn);
	for _ in 0..tn {
		input.push(input_planes.recv().map_err(|_| disconnected(LOAD_INPUT))?);
		weights.push(weight_planes.recv().map_err(|_| disconnected(LOAD_WEIGHTS))?);
	}

	let mut registers = vec![Wide::<T>::ZERO; um];
	for (lane_group, ir, ic) in iproduct!(0..geometry.lane_groups(), 0..tr, 0..tc) {
		registers.fill(Wide::ZERO);
		for (i, j, sub_tile) in iproduct!(0..k, 0..k, (0..tn).step_by(un)) {
			let offset = (s * ir + i) * tcc + s * ic + j;
			for (lane, register) in registers.iter_mut().enumerate() {
				let weight_offset = ((lane_group * um + lane) * k + i) * k + j;
				*register += (sub_tile..sub_tile + un)
					.map(|iti| weights[iti][weight_offset].widening_mul(input[iti][offset]))
					.sum::<Wide<T>>();
			}
		}

		for (lane, &register) in registers.iter().enumerate() {
			let o = ((lane_group * um + lane) * tr + ir) * tc + ic;
			if let Some(value) = carry(position, previous[o], register, &mut current[o]) {
				lanes
					.get(lane)
					.ok_or_else(|| disconnected(STORE_OUTPUT))?
					.send(value)
					.map_err(|_| disconnected(STORE_OUTPUT))?;
			}
		}
	}
	Ok(())
}

/// Drains the lane channels into the `[tm, tr, tc]` output tile.
///
/// Injected faults flip their bit before the value reaches the output checksum, the way a
/// corrupted result would arrive from an unreliable accelerator.
pub fn store_output<T: FixedPoint>(
	geometry: TileGeometry,
	lanes: Vec<Receiver<Wide<T>>>,
	faults: &[InjectedFault],
	mut checksum: Option<&mut ChecksumAccumulator<T>>,
	output_tile: &mut [T],
) -> Result<(), Error> {
	let TileGeometry { tr, tc, um, .. } = geometry;
	for (lane_group, ir, ic) in iproduct!(0..geometry.lane_groups(), 0..tr, 0..tc) {
		for (lane, receiver) in lanes.iter().enumerate() {
			let ito = lane_group * um + lane;
			let mut value = receiver.recv().map_err(|_| disconnected(CONVOLVE))?;
			for fault in faults
				.iter()
				.filter(|fault| (fault.channel, fault.row, fault.col) == (ito, ir, ic))
			{
				value = value.flip_output_bit(fault.bit);
			}
			if let Some(checksum) = checksum.as_deref_mut() {
				checksum.add(value);
			}
			output_tile[(ito * tr + ir) * tc + ic] = value.rescale();
		}
	}
	Ok(())
}
