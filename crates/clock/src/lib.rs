// Copyright 2025 Irreducible Inc.

//! Frequency stepping for an MMCM clocking wizard.
//!
//! The wizard derives its output clock from a fixed input clock through an integer input
//! divider, a fractional feedback multiplier and a fractional output divider. [`find_settings`]
//! enumerates every legal combination and keeps an evenly spaced ladder of output frequencies;
//! [`FrequencySearch`] walks that ladder and programs each rung through a [`ClockRegisters`]
//! implementation.

mod error;
mod registers;
mod search;
mod settings;

pub use error::*;
pub use registers::*;
pub use search::*;
pub use settings::*;
