// Copyright 2025 Irreducible Inc.

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("invalid frequency range: min {min} MHz, max {max} MHz, step {step} MHz")]
	InvalidRange { min: f64, max: f64, step: f64 },
	#[error("no clock settings between {min} and {max} MHz from a {input_clock} MHz input")]
	NoSettings {
		input_clock: f64,
		min: f64,
		max: f64,
	},
	#[error("clock did not lock after {polls} status polls")]
	LockTimeout { polls: usize },
}
