// Copyright 2025 Irreducible Inc.

//! Reference implementations, random operands and generic test bodies shared by the tests and
//! benchmarks of `tilecheck_compute` and by the command-line driver.

pub mod convolve;
pub mod presets;
pub mod random;
pub mod reference;

pub use random::random_tensors;
pub use reference::reference_convolution;
