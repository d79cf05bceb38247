// Copyright 2025 Irreducible Inc.

//! Tiled batched 2D convolution with algorithm-based fault tolerance.
//!
//! A convolution layer is split into fixed-size tiles. Every tile flows through a concurrent
//! [`pipeline`] of load, convolve and store stages, one input-channel group at a time, while the
//! [`checksum`] engine derives an input-checksum from the raw operands and an output-checksum
//! from the produced values. Tiles whose checksums disagree are reported as faulty by the
//! [`orchestrator`].

pub mod alloc;
pub mod checksum;
pub mod config;
mod error;
pub mod fault;
pub mod orchestrator;
pub mod pipeline;
pub mod tensor;
pub mod tile;

pub use config::{ConvConfig, ConvShape, TileGeometry, TileShape};
pub use error::Error;
pub use fault::{FaultVector, InjectedFault};
pub use orchestrator::{Convolution, TileChecksums, TileOrchestrator};
pub use pipeline::{ChecksumMode, PipelineOptions};
pub use tensor::Tensor;
pub use tilecheck_fixed::{Fixed, FixedPoint, Wide, Word16, Word8};
