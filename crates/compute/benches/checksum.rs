// Copyright 2025 Irreducible Inc.

use criterion::{
	criterion_group, criterion_main, measurement::WallTime, BenchmarkGroup, Criterion, Throughput,
};
use rand::{rngs::StdRng, SeedableRng};
use tilecheck_compute::{
	checksum::{DirectChecksum, InputChecksum, SlidingWindowChecksum},
	tile::{prepare_input_tile, prepare_weights_tile, tile_indices},
	ChecksumMode, ConvConfig, PipelineOptions, Tensor, TileOrchestrator, Word16,
};
use tilecheck_test_utils::{presets, random_tensors};

type Group = (Tensor<Word16, 3>, Tensor<Word16, 4>);

fn first_tile_groups(config: &ConvConfig) -> Vec<Group> {
	let (input, weights) = random_tensors::<Word16>(config, StdRng::seed_from_u64(0));
	let geometry = config.geometry();
	let index = tile_indices(config)
		.next()
		.expect("a configuration has at least one tile");
	(0..config.input_groups())
		.map(|group| {
			let mut input_tile = Tensor::zeroed(geometry.input_tile_shape());
			prepare_input_tile(config, &input, index, group * geometry.tn, &mut input_tile);
			let mut weights_tile = Tensor::zeroed(geometry.weights_tile_shape());
			prepare_weights_tile(config, &weights, index, group * geometry.tn, &mut weights_tile);
			(input_tile, weights_tile)
		})
		.collect()
}

fn bench_input_checksum(
	group: &mut BenchmarkGroup<WallTime>,
	name: &str,
	config: &ConvConfig,
	checksum: &impl InputChecksum<Word16>,
) {
	let groups = first_tile_groups(config);
	let elements = groups.iter().map(|(x, w)| x.len() + w.len()).sum::<usize>();
	group.throughput(Throughput::Elements(elements as u64));
	group.bench_function(name, |bench| {
		bench.iter(|| {
			checksum.tile_checksum(groups.iter().map(|(x, w)| (x.as_slice(), w.as_slice())))
		});
	});
}

fn input_checksum(c: &mut Criterion) {
	let config = presets::layer();
	let geometry = config.geometry();
	let mut group = c.benchmark_group("input_checksum");
	let sliding = SlidingWindowChecksum::new(geometry);
	bench_input_checksum(&mut group, "sliding_window", &config, &sliding);
	bench_input_checksum(&mut group, "direct", &config, &DirectChecksum::new(geometry));
}

fn convolve(c: &mut Criterion) {
	let config = presets::layer();
	let (input, weights) = random_tensors::<Word16>(&config, StdRng::seed_from_u64(0));
	let mut group = c.benchmark_group("convolve");
	group.sample_size(10);

	for (name, checksum_mode, fault_check) in [
		("unchecked", ChecksumMode::Pipelined, false),
		("pipelined", ChecksumMode::Pipelined, true),
		("software", ChecksumMode::Software, true),
	] {
		let orchestrator = TileOrchestrator::new(config.clone()).with_options(PipelineOptions {
			checksum_mode,
			..Default::default()
		});
		group.bench_function(name, |bench| {
			bench.iter(|| orchestrator.convolve(&input, &weights, fault_check));
		});
	}
}

criterion_group!(checksum, input_checksum, convolve);
criterion_main!(checksum);
