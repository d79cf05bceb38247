// Copyright 2025 Irreducible Inc.

use crate::{alloc, fault::InjectedFault};

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("configuration parameter {name} must be positive")]
	ZeroDimension { name: &'static str },
	#[error("tile size {tile} = {tile_size} is not divisible by lane width {lanes} = {lane_width}")]
	LanesMustDivideTile {
		tile: &'static str,
		tile_size: usize,
		lanes: &'static str,
		lane_width: usize,
	},
	#[error("stride {stride} exceeds kernel size {kernel}")]
	StrideExceedsKernel { stride: usize, kernel: usize },
	#[error("padded tile {axis} extent {extent} is below 2K - S = {required}")]
	TileTooSmallForChecksum {
		axis: &'static str,
		extent: usize,
		required: usize,
	},
	#[error("{tensor} tensor has shape {actual:?}, expected {expected:?}")]
	ShapeMismatch {
		tensor: &'static str,
		expected: Vec<usize>,
		actual: Vec<usize>,
	},
	#[error("shape {shape:?} holds {expected} elements, buffer has {actual}")]
	TensorLength {
		shape: Vec<usize>,
		expected: usize,
		actual: usize,
	},
	#[error("injected fault {0:?} lies outside the tile grid")]
	InvalidFault(InjectedFault),
	#[error("allocation error: {0}")]
	Alloc(#[from] alloc::Error),
	#[error("partial sums read by group {group} before the previous group published them")]
	PartialSumNotReady { group: usize },
	#[error("pipeline stage {stage} lost its peer")]
	StageDisconnected { stage: &'static str },
	#[error("pipeline stage {stage} panicked")]
	StagePanicked { stage: &'static str },
	#[error("failed to spawn pipeline stage {stage}: {source}")]
	StageSpawn {
		stage: &'static str,
		#[source]
		source: std::io::Error,
	},
}
