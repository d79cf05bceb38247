// Copyright 2025 Irreducible Inc.

use tracing::{debug, instrument};

use crate::{
	find_settings, ClockLimits, ClockRegisters, ClockSettings, Error, FrequencyRange,
	CLKOUT0_DIVIDE, CR0, CR23, LOAD_AND_RECONFIGURE, LOCKED, SOFT_RESET, SR, SRR,
};

/// Default bound on status polls while waiting for the clock to lock.
pub const DEFAULT_LOCK_POLLS: usize = 1 << 20;

/// Walks the frequency ladder of a clocking wizard, programming each rung as it is reached.
///
/// A fresh search points at the first setting without having programmed it. Dropping the search
/// soft-resets the wizard back to its power-on frequency.
#[derive(Debug)]
pub struct FrequencySearch<R: ClockRegisters> {
	registers: R,
	settings: Vec<ClockSettings>,
	position: usize,
	lock_polls: usize,
}

impl<R: ClockRegisters> FrequencySearch<R> {
	pub fn new(
		registers: R,
		input_clock: f64,
		range: FrequencyRange,
		limits: &ClockLimits,
	) -> Result<Self, Error> {
		let settings = find_settings(input_clock, range, limits)?;
		debug!(count = settings.len(), ?range, "clock settings found");
		Ok(Self {
			registers,
			settings,
			position: 0,
			lock_polls: DEFAULT_LOCK_POLLS,
		})
	}

	pub fn with_lock_polls(mut self, polls: usize) -> Self {
		self.lock_polls = polls;
		self
	}

	/// Programs the lowest frequency and returns it.
	pub fn restart(&mut self) -> Result<f64, Error> {
		self.position = 0;
		self.configure()
	}

	/// Steps up one rung. Returns `None`, leaving the clock untouched, once past the last one.
	pub fn next(&mut self) -> Result<Option<f64>, Error> {
		if self.end() {
			return Ok(None);
		}
		self.position += 1;
		if self.end() {
			return Ok(None);
		}
		self.configure().map(Some)
	}

	/// Steps down one rung. Returns `None` at the first one.
	pub fn previous(&mut self) -> Result<Option<f64>, Error> {
		if self.position == 0 {
			return Ok(None);
		}
		self.position -= 1;
		self.configure().map(Some)
	}

	/// Restarts and steps up until the frequency reaches `goal`.
	///
	/// Returns the first frequency at or above `goal`, or `None` when the ladder ends below it.
	#[instrument(skip(self), level = "debug")]
	pub fn advance_to(&mut self, goal: f64) -> Result<Option<f64>, Error> {
		let mut frequency = self.restart()?;
		while frequency < goal {
			match self.next()? {
				Some(next) => frequency = next,
				None => return Ok(None),
			}
		}
		Ok(Some(frequency))
	}

	/// Whether the search has stepped past the last setting.
	pub fn end(&self) -> bool {
		self.position >= self.settings.len()
	}

	pub fn count(&self) -> usize {
		self.settings.len()
	}

	pub fn current(&self) -> Option<&ClockSettings> {
		self.settings.get(self.position)
	}

	pub fn settings(&self) -> &[ClockSettings] {
		&self.settings
	}

	pub fn registers(&self) -> &R {
		&self.registers
	}

	fn configure(&mut self) -> Result<f64, Error> {
		let settings = self.settings[self.position];
		debug!(
			frequency = settings.frequency,
			divclk = settings.divclk_divide,
			clkfbout = %settings.clkfbout_mult,
			clkout0 = %settings.clkout0_divide,
			"programming clock"
		);
		self.registers.write(CR0, settings.cr0());
		self.registers.write(CLKOUT0_DIVIDE, settings.clkout0());
		self.wait_for_lock()?;
		self.registers.write(CR23, LOAD_AND_RECONFIGURE);
		self.wait_for_lock()?;
		Ok(settings.frequency)
	}

	fn wait_for_lock(&mut self) -> Result<(), Error> {
		for _ in 0..self.lock_polls {
			if self.registers.read(SR) & LOCKED != 0 {
				return Ok(());
			}
			std::hint::spin_loop();
		}
		Err(Error::LockTimeout {
			polls: self.lock_polls,
		})
	}
}

impl<R: ClockRegisters> Drop for FrequencySearch<R> {
	fn drop(&mut self) {
		self.registers.write(SRR, SOFT_RESET);
	}
}
