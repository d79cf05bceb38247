// Copyright 2025 Irreducible Inc.

//! The concurrent compute pipeline that processes one input-channel group of a tile.
//!
//! Stages run on scoped threads connected by bounded channels:
//!
//! ```text
//! load-input ──planes──▶ convolve ──lanes──▶ store-output
//! load-weights ─planes─▶    ▲
//!      │ sections/kernels   └─ partial sums (ping/pong)
//!      └──────────────▶ input-checksum
//! ```
//!
//! Every stage consumes its inputs in the order they are produced, so the pipeline cannot
//! deadlock for any channel depth.

mod partial_sum;
pub mod stages;

use std::thread::{self, Scope, ScopedJoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender};
pub use partial_sum::*;
use tilecheck_fixed::FixedPoint;
use tracing::instrument;

use crate::{
	checksum::{ChecksumAccumulator, SectionLayout},
	fault::InjectedFault,
	tile::GroupPosition,
	ConvConfig, Error, TileGeometry,
};

/// Which path computes the input-checksum of a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ChecksumMode {
	/// Sliding-window section sums, computed by a dedicated pipeline stage as the operands stream
	/// through the loaders.
	#[default]
	Pipelined,
	/// Direct recomputation on the rayon pool, beside the pipeline.
	Software,
}

/// Knobs that change how the pipeline runs but never what it computes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineOptions {
	/// Capacity of the plane, section and kernel-sum channels.
	pub plane_channel_depth: usize,
	/// Capacity of each output lane channel.
	pub lane_channel_depth: usize,
	pub checksum_mode: ChecksumMode,
}

impl Default for PipelineOptions {
	fn default() -> Self {
		Self {
			plane_channel_depth: 2,
			lane_channel_depth: 16,
			checksum_mode: ChecksumMode::default(),
		}
	}
}

/// State carried across the input-channel groups of one tile.
#[derive(Debug, Clone)]
pub struct TileAccumulator<T> {
	partial_sums: PartialSumBuffer<T>,
	input_checksum: ChecksumAccumulator<T>,
	output_checksum: ChecksumAccumulator<T>,
}

impl<T: FixedPoint> TileAccumulator<T> {
	pub fn new(geometry: &TileGeometry) -> Self {
		Self {
			partial_sums: PartialSumBuffer::new(geometry.output_tile_len()),
			input_checksum: ChecksumAccumulator::new(),
			output_checksum: ChecksumAccumulator::new(),
		}
	}

	pub fn partial_sums(&self) -> &PartialSumBuffer<T> {
		&self.partial_sums
	}

	pub fn input_checksum(&self) -> &ChecksumAccumulator<T> {
		&self.input_checksum
	}

	pub fn output_checksum(&self) -> &ChecksumAccumulator<T> {
		&self.output_checksum
	}
}

#[derive(Debug, Clone, Copy)]
pub struct ComputePipeline {
	geometry: TileGeometry,
	layout: SectionLayout,
	options: PipelineOptions,
	fault_check: bool,
}

type StageHandle<'scope> = (&'static str, ScopedJoinHandle<'scope, Result<(), Error>>);

impl ComputePipeline {
	pub fn new(config: &ConvConfig, options: PipelineOptions, fault_check: bool) -> Self {
		let geometry = config.geometry();
		Self {
			geometry,
			layout: SectionLayout::new(&geometry),
			options,
			fault_check,
		}
	}

	pub fn geometry(&self) -> &TileGeometry {
		&self.geometry
	}

	pub fn fault_check(&self) -> bool {
		self.fault_check
	}

	/// Whether the input-checksum stage runs inside the pipeline.
	pub fn pipelined_checksum(&self) -> bool {
		self.fault_check && self.options.checksum_mode == ChecksumMode::Pipelined
	}

	/// Runs one input-channel group of a tile through the pipeline.
	///
	/// `input_tile` is `[tn, trr, tcc]` and `weights_tile` is `[tn, tm, k, k]`. On the last group
	/// the finalized tile is rescaled into `output_tile` (`[tm, tr, tc]`) with `faults` applied;
	/// earlier groups leave it untouched.
	#[instrument(
		skip_all,
		level = "debug",
		fields(group = position.index, groups = position.count)
	)]
	pub fn process_group<T: FixedPoint>(
		&self,
		input_tile: &[T],
		weights_tile: &[T],
		position: GroupPosition,
		accumulator: &mut TileAccumulator<T>,
		output_tile: &mut [T],
		faults: &[InjectedFault],
	) -> Result<(), Error> {
		let geometry = self.geometry;
		let layout = self.layout;
		let depth = self.options.plane_channel_depth;

		let TileAccumulator {
			partial_sums,
			input_checksum,
			output_checksum,
		} = accumulator;
		let (previous, current) = partial_sums.split_for_group(position)?;
		let output_checksum = self.fault_check.then_some(output_checksum);

		let (input_tx, input_rx) = bounded(depth);
		let (weights_tx, weights_rx) = bounded(depth);
		let (sections_tx, sections_rx) = optional_channel(self.pipelined_checksum(), depth);
		let (kernels_tx, kernels_rx) = optional_channel(self.pipelined_checksum(), depth);
		let lanes = if position.is_last() { geometry.um } else { 0 };
		let (lane_txs, lane_rxs): (Vec<_>, Vec<_>) = (0..lanes)
			.map(|_| bounded(self.options.lane_channel_depth))
			.unzip();

		thread::scope(|scope| {
			let mut handles = Vec::with_capacity(5);
			handles.push(spawn_stage(scope, stages::LOAD_INPUT, move || {
				let sections = sections_tx.map(|sender| (layout, sender));
				stages::load_input(geometry, input_tile, input_tx, sections)
			})?);
			handles.push(spawn_stage(scope, stages::LOAD_WEIGHTS, move || {
				stages::load_weights(geometry, weights_tile, weights_tx, kernels_tx)
			})?);
			if let (Some(sections_rx), Some(kernels_rx)) = (sections_rx, kernels_rx) {
				handles.push(spawn_stage(scope, stages::INPUT_CHECKSUM, move || {
					stages::input_checksum(
						geometry,
						layout,
						sections_rx,
						kernels_rx,
						input_checksum,
					)
				})?);
			}
			handles.push(spawn_stage(scope, stages::CONVOLVE, move || {
				stages::convolve(
					geometry,
					position,
					input_rx,
					weights_rx,
					previous,
					current,
					lane_txs,
				)
			})?);
			if position.is_last() {
				handles.push(spawn_stage(scope, stages::STORE_OUTPUT, move || {
					stages::store_output(geometry, lane_rxs, faults, output_checksum, output_tile)
				})?);
			}
			join_stages(handles)
		})?;

		partial_sums.publish(position);
		Ok(())
	}
}

fn optional_channel<M>(enabled: bool, depth: usize) -> (Option<Sender<M>>, Option<Receiver<M>>) {
	if enabled {
		let (sender, receiver) = bounded(depth);
		(Some(sender), Some(receiver))
	} else {
		(None, None)
	}
}

fn spawn_stage<'scope, 'env, F>(
	scope: &'scope Scope<'scope, 'env>,
	stage: &'static str,
	body: F,
) -> Result<StageHandle<'scope>, Error>
where
	F: FnOnce() -> Result<(), Error> + Send + 'scope,
{
	thread::Builder::new()
		.name(format!("tilecheck-{stage}"))
		.spawn_scoped(scope, body)
		.map(|handle| (stage, handle))
		.map_err(|source| Error::StageSpawn { stage, source })
}

/// Joins every stage and reports the root failure, if any.
///
/// A stage that fails drops its channel ends, which makes its peers fail with
/// [`Error::StageDisconnected`]; those are only reported when nothing else went wrong.
fn join_stages(handles: Vec<StageHandle<'_>>) -> Result<(), Error> {
	let mut failure = None;
	for (stage, handle) in handles {
		let result = handle
			.join()
			.unwrap_or(Err(Error::StagePanicked { stage }));
		if let Err(err) = result {
			let replaces = match &failure {
				None => true,
				Some(Error::StageDisconnected { .. }) => {
					!matches!(err, Error::StageDisconnected { .. })
				}
				Some(_) => false,
			};
			if replaces {
				failure = Some(err);
			}
		}
	}
	failure.map_or(Ok(()), Err)
}

#[cfg(test)]
mod tests {
	use assert_matches::assert_matches;
	use itertools::iproduct;
	use rand::{rngs::StdRng, Rng, SeedableRng};
	use tilecheck_fixed::{Wide, Word16};

	use super::*;
	use crate::{
		checksum::{DirectChecksum, InputChecksum},
		ConvShape, TileShape,
	};

	fn config(tn: usize, um: usize, un: usize) -> ConvConfig {
		ConvConfig::new(
			ConvShape {
				m: 4,
				n: 6,
				r: 3,
				c: 4,
				k: 3,
				s: 1,
				batches: 1,
			},
			TileShape {
				tm: 4,
				tn,
				tr: 3,
				tc: 4,
				um,
				un,
			},
		)
		.unwrap()
	}

	type Group = (Vec<Word16>, Vec<Word16>);

	fn random_groups(geometry: &TileGeometry, groups: usize, seed: u64) -> Vec<Group> {
		let mut rng = StdRng::seed_from_u64(seed);
		let mut words = |len: usize| -> Vec<Word16> {
			(0..len)
				.map(|_| Word16::from_raw(rng.gen::<i16>() as i64))
				.collect()
		};
		(0..groups)
			.map(|_| (words(geometry.input_tile_len()), words(geometry.weights_tile_len())))
			.collect()
	}

	fn expected_output(geometry: &TileGeometry, groups: &[Group]) -> Vec<Word16> {
		let TileGeometry {
			tm,
			tn,
			tr,
			tc,
			k,
			s,
			tcc,
			..
		} = *geometry;
		iproduct!(0..tm, 0..tr, 0..tc)
			.map(|(ito, ir, ic)| {
				iproduct!(groups, 0..tn, 0..k, 0..k)
					.map(|((input, weights), iti, i, j)| {
						let weight = weights[((iti * tm + ito) * k + i) * k + j];
						let value = input[(iti * geometry.trr + s * ir + i) * tcc + s * ic + j];
						weight.widening_mul(value)
					})
					.sum::<Wide<Word16>>()
					.rescale()
			})
			.collect()
	}

	fn run(
		pipeline: &ComputePipeline,
		groups: &[Group],
		faults: &[InjectedFault],
	) -> Result<(Vec<Word16>, TileAccumulator<Word16>), Error> {
		let geometry = pipeline.geometry();
		let mut accumulator = TileAccumulator::new(geometry);
		let mut output = vec![Word16::ZERO; geometry.output_tile_len()];
		for (index, (input, weights)) in groups.iter().enumerate() {
			pipeline.process_group(
				input,
				weights,
				GroupPosition::new(index, groups.len()),
				&mut accumulator,
				&mut output,
				faults,
			)?;
		}
		Ok((output, accumulator))
	}

	#[test]
	fn test_single_group_matches_direct_convolution() {
		let config = config(6, 2, 3);
		let pipeline = ComputePipeline::new(&config, PipelineOptions::default(), true);
		let groups = random_groups(pipeline.geometry(), 1, 0);
		let (output, accumulator) = run(&pipeline, &groups, &[]).unwrap();
		assert_eq!(output, expected_output(pipeline.geometry(), &groups));
		assert_eq!(accumulator.input_checksum(), accumulator.output_checksum());
	}

	#[test]
	fn test_partial_sums_carry_across_groups() {
		let config = config(2, 4, 2);
		let pipeline = ComputePipeline::new(&config, PipelineOptions::default(), true);
		let groups = random_groups(pipeline.geometry(), 3, 1);
		let (output, accumulator) = run(&pipeline, &groups, &[]).unwrap();
		assert_eq!(output, expected_output(pipeline.geometry(), &groups));
		assert_eq!(accumulator.input_checksum(), accumulator.output_checksum());

		let direct = DirectChecksum::new(*pipeline.geometry())
			.tile_checksum(groups.iter().map(|(x, w)| (x.as_slice(), w.as_slice())));
		assert_eq!(&direct, accumulator.input_checksum());
	}

	#[test]
	fn test_minimal_channel_depths_do_not_deadlock() {
		let config = config(3, 1, 1);
		let options = PipelineOptions {
			plane_channel_depth: 1,
			lane_channel_depth: 1,
			checksum_mode: ChecksumMode::Pipelined,
		};
		let pipeline = ComputePipeline::new(&config, options, true);
		let groups = random_groups(pipeline.geometry(), 2, 2);
		let (output, _) = run(&pipeline, &groups, &[]).unwrap();
		assert_eq!(output, expected_output(pipeline.geometry(), &groups));
	}

	#[test]
	fn test_injected_fault_breaks_checksum_equality() {
		let config = config(6, 2, 1);
		let pipeline = ComputePipeline::new(&config, PipelineOptions::default(), true);
		let groups = random_groups(pipeline.geometry(), 1, 3);
		let fault = InjectedFault {
			tile: 0,
			channel: 1,
			row: 2,
			col: 3,
			bit: 4,
		};
		let (output, accumulator) = run(&pipeline, &groups, &[fault]).unwrap();
		let expected = expected_output(pipeline.geometry(), &groups);

		// channel 1, row 2, column 3 of a [4, 3, 4] tile
		let o = (3 + 2) * 4 + 3;
		assert_eq!(output[o], expected[o].flip_bit(4));
		assert_eq!(output[..o], expected[..o]);
		assert_eq!(output[o + 1..], expected[o + 1..]);
		assert_ne!(
			accumulator.input_checksum().finish(),
			accumulator.output_checksum().finish()
		);
	}

	#[test]
	fn test_without_fault_check_no_checksum_is_computed() {
		let config = config(6, 2, 1);
		let pipeline = ComputePipeline::new(&config, PipelineOptions::default(), false);
		assert!(!pipeline.pipelined_checksum());
		let groups = random_groups(pipeline.geometry(), 1, 4);
		let (output, accumulator) = run(&pipeline, &groups, &[]).unwrap();
		assert_eq!(output, expected_output(pipeline.geometry(), &groups));
		assert_eq!(accumulator.input_checksum().value(), Wide::ZERO);
		assert_eq!(accumulator.output_checksum().value(), Wide::ZERO);
	}

	#[test]
	fn test_software_mode_skips_checksum_stage() {
		let config = config(6, 2, 1);
		let options = PipelineOptions {
			checksum_mode: ChecksumMode::Software,
			..Default::default()
		};
		let pipeline = ComputePipeline::new(&config, options, true);
		assert!(!pipeline.pipelined_checksum());
		let groups = random_groups(pipeline.geometry(), 1, 5);
		let (_, accumulator) = run(&pipeline, &groups, &[]).unwrap();
		assert_eq!(accumulator.input_checksum().value(), Wide::ZERO);
		assert_ne!(accumulator.output_checksum().value(), Wide::ZERO);
	}

	#[test]
	fn test_out_of_order_group_is_rejected() {
		let config = config(2, 4, 2);
		let pipeline = ComputePipeline::new(&config, PipelineOptions::default(), true);
		let groups = random_groups(pipeline.geometry(), 3, 6);
		let mut accumulator = TileAccumulator::new(pipeline.geometry());
		let mut output = vec![Word16::ZERO; pipeline.geometry().output_tile_len()];
		let (input, weights) = &groups[1];
		assert_matches!(
			pipeline.process_group(
				input,
				weights,
				GroupPosition::new(1, 3),
				&mut accumulator,
				&mut output,
				&[],
			),
			Err(Error::PartialSumNotReady { group: 1 })
		);
	}
}
