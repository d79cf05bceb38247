// Copyright 2025 Irreducible Inc.

//! Generic test bodies for the tiled convolution, instantiated per word format and pipeline
//! configuration by the integration tests.

use rand::{rngs::StdRng, Rng, SeedableRng};
use tilecheck_compute::{
	checksum::{DirectChecksum, InputChecksum, SlidingWindowChecksum},
	tile::{prepare_input_tile, prepare_weights_tile, tile_indices},
	ConvConfig, InjectedFault, PipelineOptions, Tensor, TileOrchestrator,
};
use tilecheck_fixed::FixedPoint;

use crate::{random_tensors, reference_convolution};

/// The tiled output equals the direct convolution and no tile is flagged.
pub fn test_generic_matches_reference<T: FixedPoint>(
	config: &ConvConfig,
	options: PipelineOptions,
	seed: u64,
) {
	let (input, weights) = random_tensors::<T>(config, StdRng::seed_from_u64(seed));
	let result = TileOrchestrator::new(config.clone())
		.with_options(options)
		.convolve(&input, &weights, true)
		.unwrap();

	assert_eq!(result.output, reference_convolution(config, &input, &weights));
	assert_eq!(result.faults.len(), config.n_tiles());
	assert_eq!(result.fault_count, 0);
	assert!(!result.faults.any());
}

/// Two runs over identical operands produce identical outputs and fault vectors.
pub fn test_generic_deterministic<T: FixedPoint>(
	config: &ConvConfig,
	options: PipelineOptions,
	seed: u64,
) {
	let (input, weights) = random_tensors::<T>(config, StdRng::seed_from_u64(seed));
	let orchestrator = TileOrchestrator::new(config.clone()).with_options(options);
	let first = orchestrator.convolve(&input, &weights, true).unwrap();
	let second = orchestrator.convolve(&input, &weights, true).unwrap();
	assert_eq!(first.output, second.output);
	assert_eq!(first.faults, second.faults);
	assert_eq!(first.checksums, second.checksums);
}

/// A single flipped output bit is detected in exactly the tile it was injected into.
pub fn test_generic_single_fault_detected<T: FixedPoint>(
	config: &ConvConfig,
	options: PipelineOptions,
	seed: u64,
) {
	let mut rng = StdRng::seed_from_u64(seed);
	let (input, weights) = random_tensors::<T>(config, &mut rng);
	let geometry = config.geometry();
	let fault = InjectedFault {
		tile: rng.gen_range(0..config.n_tiles()),
		channel: rng.gen_range(0..geometry.tm),
		row: rng.gen_range(0..geometry.tr),
		col: rng.gen_range(0..geometry.tc),
		bit: rng.gen_range(0..T::WIDTH),
	};

	let result = TileOrchestrator::new(config.clone())
		.with_options(options)
		.with_injected_faults([fault])
		.convolve(&input, &weights, true)
		.unwrap();

	assert_eq!(result.fault_count, 1, "{fault:?}");
	assert_eq!(result.faults.faulty_tiles().collect::<Vec<_>>(), [fault.tile]);
}

/// Without fault checking nothing is flagged, even when an output is corrupted.
pub fn test_generic_unchecked_reports_nothing<T: FixedPoint>(
	config: &ConvConfig,
	options: PipelineOptions,
	seed: u64,
) {
	let (input, weights) = random_tensors::<T>(config, StdRng::seed_from_u64(seed));
	let fault = InjectedFault {
		tile: config.n_tiles() - 1,
		channel: 0,
		row: 0,
		col: 0,
		bit: 0,
	};
	let result = TileOrchestrator::new(config.clone())
		.with_options(options)
		.with_injected_faults([fault])
		.convolve(&input, &weights, false)
		.unwrap();
	assert_eq!(result.fault_count, 0);
	assert!(result.checksums.is_empty());
}

/// The sliding-window and direct input-checksum paths agree on every tile of a layer.
pub fn test_generic_checksum_paths_agree<T: FixedPoint>(config: &ConvConfig, seed: u64) {
	let (input, weights) = random_tensors::<T>(config, StdRng::seed_from_u64(seed));
	let geometry = config.geometry();
	let sliding = SlidingWindowChecksum::new(geometry);
	let direct = DirectChecksum::new(geometry);

	for index in tile_indices(config) {
		let groups = (0..config.input_groups())
			.map(|group| {
				let mut input_tile = Tensor::<T, 3>::zeroed(geometry.input_tile_shape());
				prepare_input_tile(config, &input, index, group * geometry.tn, &mut input_tile);
				let mut weights_tile = Tensor::<T, 4>::zeroed(geometry.weights_tile_shape());
				prepare_weights_tile(
					config,
					&weights,
					index,
					group * geometry.tn,
					&mut weights_tile,
				);
				(input_tile, weights_tile)
			})
			.collect::<Vec<_>>();
		let slices = || groups.iter().map(|(x, w)| (x.as_slice(), w.as_slice()));

		assert_eq!(
			sliding.tile_checksum(slices()),
			direct.tile_checksum(slices()),
			"{index:?}"
		);
	}
}
