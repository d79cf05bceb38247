// Copyright 2025 Irreducible Inc.

//! Runs repeated checked convolutions on random data and reports, per image, whether any tile's
//! checksums disagreed.
//!
//! The clock of the (simulated) accelerator is first stepped to the requested frequency, so the
//! output lines can be collected into an error rate per frequency. Random bit flips can be
//! injected into the outputs to emulate an accelerator clocked past its limit.

use std::io::{self, Write};

use anyhow::{bail, ensure, Context, Result};
use clap::{Parser, ValueEnum};
use rand::{rngs::StdRng, Rng, SeedableRng};
use tilecheck_clock::{ClockLimits, FrequencyRange, FrequencySearch, SimulatedRegisters};
use tilecheck_compute::{
	ChecksumMode, ConvConfig, ConvShape, FixedPoint, InjectedFault, PipelineOptions,
	TileOrchestrator, TileShape, Word16, Word8,
};
use tilecheck_test_utils::{random_tensors, reference_convolution};
use tilecheck_utils::{env::boolean_env_flag_set, rayon::adjust_thread_pool, tracing::init_tracing};
use tracing::info;

const SOFTWARE_CHECKSUM_ENV: &str = "TILECHECK_SOFTWARE_CHECKSUM";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
	/// 16-bit words, 15 fractional bits.
	Word16,
	/// 8-bit words, 7 fractional bits.
	Word8,
}

#[derive(Debug, Parser)]
#[command(name = "tilecheck")]
struct Args {
	/// Number of images to convolve.
	#[arg(default_value_t = 1)]
	images: usize,
	/// Goal clock frequency in MHz.
	#[arg(default_value_t = 100.0)]
	freq: f64,

	/// Output channels.
	#[arg(short, default_value_t = 16)]
	m: usize,
	/// Input channels.
	#[arg(short, default_value_t = 16)]
	n: usize,
	/// Output rows.
	#[arg(short, default_value_t = 32)]
	r: usize,
	/// Output columns.
	#[arg(short, default_value_t = 32)]
	c: usize,
	/// Kernel size.
	#[arg(short, default_value_t = 3)]
	k: usize,
	/// Stride.
	#[arg(short, default_value_t = 1)]
	s: usize,
	#[arg(short, long, default_value_t = 1)]
	batches: usize,

	#[arg(long, default_value_t = 8)]
	tm: usize,
	#[arg(long, default_value_t = 8)]
	tn: usize,
	#[arg(long, default_value_t = 8)]
	tr: usize,
	#[arg(long, default_value_t = 8)]
	tc: usize,
	/// Output-channel lanes working in parallel.
	#[arg(long, default_value_t = 4)]
	um: usize,
	/// Input channels summed per lane step.
	#[arg(long, default_value_t = 4)]
	un: usize,

	/// Layer the data is generated for, as M,N,R,C,K,S,BATCHES. Defaults to the configured one.
	#[arg(long, value_delimiter = ',')]
	layer: Option<Vec<usize>>,

	#[arg(long, value_enum, default_value_t = Format::Word16)]
	format: Format,
	/// Seed of the random operands and injected faults.
	#[arg(long, default_value_t = 0)]
	seed: u64,
	/// Compute the input checksum in software instead of in the pipeline.
	#[arg(long)]
	software_checksum: bool,
	/// Skip the checksum comparison entirely.
	#[arg(long)]
	no_abft: bool,
	/// Probability that any given tile gets one random output bit flipped.
	#[arg(long, default_value_t = 0.0)]
	fault_rate: f64,
	/// Validate every output without injected faults against the direct convolution.
	#[arg(long)]
	check: bool,

	/// Input clock of the clocking wizard in MHz.
	#[arg(long, default_value_t = 100.0)]
	input_clock: f64,
	/// Spacing of the frequency ladder in MHz.
	#[arg(long, default_value_t = 0.01)]
	freq_step: f64,
}

impl Args {
	fn config(&self) -> Result<ConvConfig> {
		let shape = ConvShape {
			m: self.m,
			n: self.n,
			r: self.r,
			c: self.c,
			k: self.k,
			s: self.s,
			batches: self.batches,
		};
		let tiles = TileShape {
			tm: self.tm,
			tn: self.tn,
			tr: self.tr,
			tc: self.tc,
			um: self.um,
			un: self.un,
		};
		ConvConfig::new(shape, tiles).context("invalid convolution configuration")
	}

	fn pipeline_options(&self) -> PipelineOptions {
		let software = self.software_checksum || boolean_env_flag_set(SOFTWARE_CHECKSUM_ENV);
		PipelineOptions {
			checksum_mode: if software {
				ChecksumMode::Software
			} else {
				ChecksumMode::Pipelined
			},
			..Default::default()
		}
	}
}

fn main() -> Result<()> {
	adjust_thread_pool()
		.as_ref()
		.expect("failed to init thread pool");
	init_tracing();

	let args = Args::parse();
	ensure!(
		(0.0..=1.0).contains(&args.fault_rate),
		"fault rate must be a probability, got {}",
		args.fault_rate
	);

	match args.format {
		Format::Word16 => run::<Word16>(&args),
		Format::Word8 => run::<Word8>(&args),
	}
}

fn run<T: FixedPoint>(args: &Args) -> Result<()> {
	let config = args.config()?;
	let orchestrator = TileOrchestrator::new(config.clone()).with_options(args.pipeline_options());

	if let Some(layer) = &args.layer {
		let &[m, n, r, c, k, s, batches] = layer.as_slice() else {
			bail!("--layer takes exactly seven values");
		};
		ensure!(
			orchestrator.compatibility_check(m, n, r, c, k, s, batches),
			"layer {layer:?} is incompatible with the configured convolution"
		);
	}

	eprintln!("{config}");
	eprintln!("INPUT_CLK: {}", args.input_clock);

	let mut clock = FrequencySearch::new(
		SimulatedRegisters::new(),
		args.input_clock,
		FrequencyRange::towards(args.input_clock, args.freq, args.freq_step),
		&ClockLimits::MMCM,
	)?;
	let frequency = clock
		.advance_to(args.freq)?
		.with_context(|| format!("no clock setting reaches {} MHz", args.freq))?;
	eprintln!("frequency: {frequency} (goal: {})", args.freq);

	let n_tiles = config.n_tiles();
	let mut rng = StdRng::seed_from_u64(args.seed);
	let mut faulty_images = 0;
	let mut faulty_tiles = 0;
	let mut stdout = io::stdout().lock();

	for image in 0..args.images {
		let (input, weights) = random_tensors::<T>(&config, &mut rng);
		let faults = random_faults::<T>(&config, args.fault_rate, &mut rng);
		let corrupted = !faults.is_empty();
		let result = orchestrator
			.clone()
			.with_injected_faults(faults)
			.convolve(&input, &weights, !args.no_abft)?;

		// Injected flips reach the output, so only clean runs can match the direct convolution.
		if args.check && !corrupted {
			ensure!(
				result.output == reference_convolution(&config, &input, &weights),
				"image {image}: output differs from the direct convolution"
			);
		}

		faulty_images += usize::from(result.fault_count > 0);
		faulty_tiles += result.fault_count;
		writeln!(
			stdout,
			"{image}\t{}\t{}\t{}\t{n_tiles}",
			args.images,
			u8::from(result.fault_count > 0),
			result.fault_count,
		)?;
	}

	info!(
		images = args.images,
		faulty_images,
		faulty_tiles,
		tiles_per_image = n_tiles,
		frequency,
		"run complete"
	);
	Ok(())
}

/// One random bit flip for each tile, with probability `rate`.
fn random_faults<T: FixedPoint>(
	config: &ConvConfig,
	rate: f64,
	rng: &mut impl Rng,
) -> Vec<InjectedFault> {
	if rate == 0.0 {
		return Vec::new();
	}
	let geometry = config.geometry();
	let mut faults = Vec::new();
	for tile in 0..config.n_tiles() {
		if rng.gen_bool(rate) {
			faults.push(InjectedFault {
				tile,
				channel: rng.gen_range(0..geometry.tm),
				row: rng.gen_range(0..geometry.tr),
				col: rng.gen_range(0..geometry.tc),
				bit: rng.gen_range(0..T::WIDTH),
			});
		}
	}
	faults
}
