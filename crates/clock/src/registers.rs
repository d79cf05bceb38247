// Copyright 2025 Irreducible Inc.

use std::collections::BTreeMap;

/// Software reset register.
pub const SRR: u32 = 0x000;
/// Status register.
pub const SR: u32 = 0x004;
/// Clock configuration register 0: input divider and feedback multiplier.
pub const CR0: u32 = 0x200;
/// Output 0 divider.
pub const CLKOUT0_DIVIDE: u32 = 0x208;
/// Clock configuration register 23: load and reconfigure.
pub const CR23: u32 = 0x25C;

/// Lock bit of [`SR`].
pub const LOCKED: u32 = 1 << 0;
/// Writing this to [`SRR`] resets the wizard to its power-on configuration.
pub const SOFT_RESET: u32 = 0x0A;
/// Writing this to [`CR23`] loads the programmed dividers.
pub const LOAD_AND_RECONFIGURE: u32 = 0x03;

/// 32-bit register file of a clocking wizard, addressed by byte offset.
pub trait ClockRegisters {
	fn read(&mut self, offset: u32) -> u32;

	fn write(&mut self, offset: u32, value: u32);
}

impl<R: ClockRegisters + ?Sized> ClockRegisters for &mut R {
	fn read(&mut self, offset: u32) -> u32 {
		(**self).read(offset)
	}

	fn write(&mut self, offset: u32, value: u32) {
		(**self).write(offset, value)
	}
}

/// In-memory register file that records every write.
///
/// The status register reports lock unless the registers were created with
/// [`SimulatedRegisters::never_locking`].
#[derive(Debug, Clone, Default)]
pub struct SimulatedRegisters {
	values: BTreeMap<u32, u32>,
	writes: Vec<(u32, u32)>,
	never_locks: bool,
}

impl SimulatedRegisters {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn never_locking() -> Self {
		Self {
			never_locks: true,
			..Self::default()
		}
	}

	/// Every write so far as `(offset, value)`, oldest first.
	pub fn writes(&self) -> &[(u32, u32)] {
		&self.writes
	}

	pub fn value(&self, offset: u32) -> Option<u32> {
		self.values.get(&offset).copied()
	}
}

impl ClockRegisters for SimulatedRegisters {
	fn read(&mut self, offset: u32) -> u32 {
		match offset {
			SR if self.never_locks => 0,
			SR => LOCKED,
			_ => self.value(offset).unwrap_or(0),
		}
	}

	fn write(&mut self, offset: u32, value: u32) {
		self.values.insert(offset, value);
		self.writes.push((offset, value));
	}
}
