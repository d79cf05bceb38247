// Copyright 2025 Irreducible Inc.

use tilecheck_fixed::{Fixed, FixedPoint};
use tilecheck_utils::ensure;

use crate::Error;

/// Unsigned divider or multiplier in steps of 1/8, as the wizard's fractional registers hold it.
pub type Eighths = Fixed<12, 3>;

const EIGHTHS: f64 = 8.0;

/// Operating limits of the wizard's phase-frequency detector and VCO, in MHz.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockLimits {
	pub pfd_min: f64,
	pub pfd_max: f64,
	pub vco_min: f64,
	pub vco_max: f64,
}

impl ClockLimits {
	/// MMCM limits, with a margin on the lower PFD bound.
	pub const MMCM: Self = Self {
		pfd_min: 25.0,
		pfd_max: 450.0,
		vco_min: 600.0,
		vco_max: 1440.0,
	};
}

impl Default for ClockLimits {
	fn default() -> Self {
		Self::MMCM
	}
}

/// Output frequencies to cover, in MHz: one setting per `step` from `min` up to `max`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrequencyRange {
	pub min: f64,
	pub max: f64,
	pub step: f64,
}

impl FrequencyRange {
	/// The range a search towards `goal` walks when starting from `input_clock`, with 1 MHz of
	/// margin on both sides.
	pub fn towards(input_clock: f64, goal: f64, step: f64) -> Self {
		Self {
			min: input_clock.min(goal) - 1.0,
			max: input_clock.max(goal) + 1.0,
			step,
		}
	}
}

/// One legal wizard configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockSettings {
	pub input_clock: f64,
	pub divclk_divide: u8,
	pub clkfbout_mult: Eighths,
	pub clkout0_divide: Eighths,
	/// Output frequency in MHz.
	pub frequency: f64,
}

impl ClockSettings {
	pub fn new(
		input_clock: f64,
		divclk_divide: u8,
		clkfbout_mult: Eighths,
		clkout0_divide: Eighths,
	) -> Self {
		let pfd = input_clock / divclk_divide as f64;
		let frequency = pfd * clkfbout_mult.to_f64() / clkout0_divide.to_f64();
		Self {
			input_clock,
			divclk_divide,
			clkfbout_mult,
			clkout0_divide,
			frequency,
		}
	}

	/// Phase-frequency detector input, in MHz.
	pub fn pfd(&self) -> f64 {
		self.input_clock / self.divclk_divide as f64
	}

	/// VCO frequency, in MHz.
	pub fn vco(&self) -> f64 {
		self.pfd() * self.clkfbout_mult.to_f64()
	}

	/// Value of [`CR0`](crate::CR0): fractional feedback, integer feedback, input divider.
	pub fn cr0(&self) -> u32 {
		let (mult, frac) = split_eighths(self.clkfbout_mult);
		(frac << 16) | (mult << 8) | self.divclk_divide as u32
	}

	/// Value of [`CLKOUT0_DIVIDE`](crate::CLKOUT0_DIVIDE): fractional and integer divider.
	pub fn clkout0(&self) -> u32 {
		let (mult, frac) = split_eighths(self.clkout0_divide);
		(frac << 8) | mult
	}
}

/// Integer part and fraction in thousandths, the register encoding of an [`Eighths`] value.
fn split_eighths(value: Eighths) -> (u32, u32) {
	let raw = value.raw() as u32;
	(raw >> 3, (raw & 0x7) * 125)
}

/// Enumerates every legal configuration for `input_clock` whose output lies in `range`, sorted
/// by frequency, and keeps the first one at or above each `step` from `range.min`.
///
/// The returned frequencies are strictly increasing.
pub fn find_settings(
	input_clock: f64,
	range: FrequencyRange,
	limits: &ClockLimits,
) -> Result<Vec<ClockSettings>, Error> {
	let FrequencyRange { min, max, step } = range;
	ensure!(
		min > 0.0 && min <= max && step > 0.0 && input_clock > 0.0,
		Error::InvalidRange { min, max, step }
	);

	let max_eighths = Eighths::MAX_RAW;
	let mut candidates = Vec::new();
	let divclk_first = (input_clock / limits.pfd_max).ceil().max(1.0) as i64;
	let divclk_last = ((input_clock / limits.pfd_min).floor() as i64).min(u8::MAX as i64);
	for divclk_divide in divclk_first..=divclk_last {
		let pfd = input_clock / divclk_divide as f64;
		let fb_first = (limits.vco_min * EIGHTHS / pfd).ceil().max(EIGHTHS) as i64;
		let fb_last = ((limits.vco_max * EIGHTHS / pfd).floor() as i64).min(max_eighths);
		for clkfbout in fb_first..=fb_last {
			let vco = pfd * clkfbout as f64 / EIGHTHS;
			let out_first = (vco * EIGHTHS / max).ceil().max(EIGHTHS) as i64;
			let out_last = ((vco * EIGHTHS / min).floor() as i64).min(max_eighths);
			candidates.extend((out_first..=out_last).map(|clkout0| {
				ClockSettings::new(
					input_clock,
					divclk_divide as u8,
					Eighths::from_raw(clkfbout),
					Eighths::from_raw(clkout0),
				)
			}));
		}
	}
	candidates.sort_by(|a, b| a.frequency.total_cmp(&b.frequency));

	// Several divider combinations can produce the same frequency; only the first is kept.
	let mut goal = min;
	let mut settings = Vec::<ClockSettings>::new();
	for candidate in candidates {
		let repeats_last =
			matches!(settings.last(), Some(last) if candidate.frequency <= last.frequency);
		if candidate.frequency >= goal && !repeats_last {
			settings.push(candidate);
			goal += step;
		}
	}
	ensure!(
		!settings.is_empty(),
		Error::NoSettings {
			input_clock,
			min,
			max,
		}
	);
	Ok(settings)
}
