// Copyright 2025 Irreducible Inc.

use tilecheck_fixed::FixedPoint;
use tilecheck_utils::ensure;
use tracing::{debug, instrument, warn};

use crate::{
	alloc::{ComputeAllocator, HostArena},
	checksum::{DirectChecksum, InputChecksum},
	pipeline::{ChecksumMode, ComputePipeline, PipelineOptions, TileAccumulator},
	tile::{
		prepare_input_tile, prepare_weights_tile, store_output_tile, tile_indices, GroupPosition,
		TileIndex,
	},
	ConvConfig, Error, FaultVector, InjectedFault, Tensor,
};

/// Both checksums of one tile, rescaled to the working format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileChecksums<T> {
	pub input: T,
	pub output: T,
}

impl<T: Eq> TileChecksums<T> {
	pub fn is_faulty(&self) -> bool {
		self.input != self.output
	}
}

/// Result of a convolution.
#[derive(Debug, Clone)]
pub struct Convolution<T> {
	/// `[B, M, R, C]` output tensor.
	pub output: Tensor<T, 4>,
	pub faults: FaultVector,
	/// Number of faulty tiles.
	pub fault_count: usize,
	/// Per-tile checksums in tile order, empty when fault checking was off.
	pub checksums: Vec<TileChecksums<T>>,
}

/// Splits a convolution into tiles, runs them through the pipeline and checks every tile.
#[derive(Debug, Clone)]
pub struct TileOrchestrator {
	config: ConvConfig,
	options: PipelineOptions,
	memory_limit: Option<usize>,
	injected_faults: Vec<InjectedFault>,
}

impl TileOrchestrator {
	pub fn new(config: ConvConfig) -> Self {
		Self {
			config,
			options: PipelineOptions::default(),
			memory_limit: None,
			injected_faults: Vec::new(),
		}
	}

	pub fn with_options(mut self, options: PipelineOptions) -> Self {
		self.options = options;
		self
	}

	/// Caps the tile buffer arena at `elements` words instead of sizing it to fit one tile.
	pub fn with_memory_limit(mut self, elements: usize) -> Self {
		self.memory_limit = Some(elements);
		self
	}

	pub fn with_injected_faults(mut self, faults: impl IntoIterator<Item = InjectedFault>) -> Self {
		self.injected_faults = faults.into_iter().collect();
		self
	}

	pub fn config(&self) -> &ConvConfig {
		&self.config
	}

	pub fn options(&self) -> &PipelineOptions {
		&self.options
	}

	/// See [`ConvConfig::compatibility_check`].
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
		self.config.compatibility_check(m, n, r, c, k, s, batches)
	}

	/// Computes the convolution of `input` (`[B, N, RR, CC]`) with `weights`
	/// (`[B, N, M, K, K]`).
	///
	/// With `do_fault_check` every tile's input-checksum is compared against its
	/// output-checksum and mismatching tiles are flagged. Without it no checksum work is done
	/// and every flag stays clear.
	#[instrument(
		skip_all,
		name = "TileOrchestrator::convolve",
		fields(tiles = self.config.n_tiles(), fault_check = do_fault_check)
	)]
	pub fn convolve<T: FixedPoint>(
		&self,
		input: &Tensor<T, 4>,
		weights: &Tensor<T, 5>,
		do_fault_check: bool,
	) -> Result<Convolution<T>, Error> {
		let shape = self.config.shape();
		check_shape("input", shape.input_shape(), input.shape())?;
		check_shape("weights", shape.weights_shape(), weights.shape())?;
		self.check_injected_faults::<T>()?;

		let n_tiles = self.config.n_tiles();
		let pipeline = ComputePipeline::new(&self.config, self.options, do_fault_check);
		let software_checksum =
			do_fault_check && self.options.checksum_mode == ChecksumMode::Software;
		let mut arena = HostArena::<T>::new(
			self.memory_limit
				.unwrap_or_else(|| self.config.tile_buffer_len()),
		);
		let mut arena_alloc = arena.allocator();

		let mut output = Tensor::zeroed(shape.output_shape());
		let mut faults = FaultVector::new(n_tiles);
		let mut checksums = Vec::with_capacity(if do_fault_check { n_tiles } else { 0 });
		let mut tile_faults = Vec::new();

		for (tile, index) in tile_indices(&self.config).enumerate() {
			tile_faults.clear();
			tile_faults.extend(
				self.injected_faults
					.iter()
					.filter(|fault| fault.tile == tile),
			);

			// Tile buffers live in a subscope, so every tile reuses the same arena space.
			let tile_checksums = self.process_tile(
				&pipeline,
				&arena_alloc.subscope_allocator(),
				input,
				weights,
				index,
				&tile_faults,
				software_checksum,
				&mut output,
			)?;

			if let Some(tile_checksums) = tile_checksums {
				let faulty = tile_checksums.is_faulty();
				if faulty {
					warn!(
						tile,
						batch = index.batch,
						channel = index.channel,
						row = index.row,
						col = index.col,
						input_checksum = ?tile_checksums.input,
						output_checksum = ?tile_checksums.output,
						"tile checksum mismatch"
					);
				}
				faults.set(tile, faulty);
				checksums.push(tile_checksums);
			}
			debug!(tile, ?index, "tile done");
		}

		let fault_count = faults.count();
		debug!(fault_count, "convolution done");
		Ok(Convolution {
			output,
			faults,
			fault_count,
			checksums,
		})
	}

	/// Prepares, runs and stores one tile. Returns its checksums when fault checking is on.
	fn process_tile<T: FixedPoint>(
		&self,
		pipeline: &ComputePipeline,
		alloc: &impl ComputeAllocator<T>,
		input: &Tensor<T, 4>,
		weights: &Tensor<T, 5>,
		index: TileIndex,
		faults: &[InjectedFault],
		software_checksum: bool,
		output: &mut Tensor<T, 4>,
	) -> Result<Option<TileChecksums<T>>, Error> {
		let geometry = *pipeline.geometry();
		let groups = self.config.input_groups();

		let mut tiles = Vec::with_capacity(groups);
		for group in 0..groups {
			let first_input_channel = group * geometry.tn;
			let mut input_tile = Tensor::from_buffer(
				geometry.input_tile_shape(),
				alloc.alloc(geometry.input_tile_len())?,
			)?;
			prepare_input_tile(&self.config, input, index, first_input_channel, &mut input_tile);
			let mut weights_tile = Tensor::from_buffer(
				geometry.weights_tile_shape(),
				alloc.alloc(geometry.weights_tile_len())?,
			)?;
			prepare_weights_tile(
				&self.config,
				weights,
				index,
				first_input_channel,
				&mut weights_tile,
			);
			tiles.push((input_tile, weights_tile));
		}
		let mut output_tile = Tensor::from_buffer(
			geometry.output_tile_shape(),
			alloc.alloc(geometry.output_tile_len())?,
		)?;

		let mut accumulator = TileAccumulator::new(&geometry);
		let (pipelined, software) = rayon::join(
			|| -> Result<(), Error> {
				for (group, (input_tile, weights_tile)) in tiles.iter().enumerate() {
					pipeline.process_group(
						input_tile.as_slice(),
						weights_tile.as_slice(),
						GroupPosition::new(group, groups),
						&mut accumulator,
						output_tile.as_mut_slice(),
						faults,
					)?;
				}
				Ok(())
			},
			|| {
				software_checksum.then(|| {
					DirectChecksum::new(geometry).tile_checksum(
						tiles
							.iter()
							.map(|(input_tile, weights_tile)| {
								(input_tile.as_slice(), weights_tile.as_slice())
							}),
					)
				})
			},
		);
		pipelined?;

		store_output_tile(&self.config, &output_tile, index, output);

		if !pipeline.fault_check() {
			return Ok(None);
		}
		let input_checksum = software
			.as_ref()
			.unwrap_or(accumulator.input_checksum());
		Ok(Some(TileChecksums {
			input: input_checksum.finish(),
			output: accumulator.output_checksum().finish(),
		}))
	}

	fn check_injected_faults<T: FixedPoint>(&self) -> Result<(), Error> {
		let geometry = self.config.geometry();
		let n_tiles = self.config.n_tiles();
		for &fault in &self.injected_faults {
			ensure!(
				fault.tile < n_tiles
					&& fault.channel < geometry.tm
					&& fault.row < geometry.tr
					&& fault.col < geometry.tc
					&& fault.bit < T::WIDTH,
				Error::InvalidFault(fault)
			);
		}
		Ok(())
	}
}

fn check_shape<const D: usize>(
	tensor: &'static str,
	expected: [usize; D],
	actual: [usize; D],
) -> Result<(), Error> {
	ensure!(
		expected == actual,
		Error::ShapeMismatch {
			tensor,
			expected: expected.to_vec(),
			actual: actual.to_vec(),
		}
	);
	Ok(())
}
