// Copyright 2025 Irreducible Inc.

use tilecheck_fixed::{FixedPoint, Wide};
use tilecheck_utils::ensure;

use crate::{tile::GroupPosition, Error};

/// Ping/pong buffer carrying partial sums from one input-channel group of a tile to the next.
///
/// Group `g` writes half `g % 2` and reads the half the previous group wrote. Each half carries a
/// ready flag: it is set when the writing group publishes its results and cleared once the next
/// group has consumed them, so a group can never read sums that were not produced for it.
#[derive(Debug, Clone)]
pub struct PartialSumBuffer<T> {
	halves: [Vec<Wide<T>>; 2],
	ready: [bool; 2],
}

impl<T: FixedPoint> PartialSumBuffer<T> {
	pub fn new(len: usize) -> Self {
		Self {
			halves: [vec![Wide::ZERO; len], vec![Wide::ZERO; len]],
			ready: [false; 2],
		}
	}

	pub fn len(&self) -> usize {
		self.halves[0].len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	pub fn is_ready(&self, half: usize) -> bool {
		self.ready[half]
	}

	pub fn half(&self, half: usize) -> &[Wide<T>] {
		&self.halves[half]
	}

	/// Borrows the previous group's half for reading and the current group's half for writing.
	///
	/// Fails with [`Error::PartialSumNotReady`] if a non-first group runs before its predecessor
	/// published.
	pub fn split_for_group(
		&mut self,
		position: GroupPosition,
	) -> Result<(&[Wide<T>], &mut [Wide<T>]), Error> {
		ensure!(
			position.is_first() || self.ready[position.previous_half()],
			Error::PartialSumNotReady {
				group: position.index
			}
		);
		let [even, odd] = &mut self.halves;
		Ok(if position.current_half() == 0 {
			(odd.as_slice(), even.as_mut_slice())
		} else {
			(even.as_slice(), odd.as_mut_slice())
		})
	}

	/// Marks the current half as written and the previous half as consumed.
	pub fn publish(&mut self, position: GroupPosition) {
		self.ready[position.current_half()] = true;
		self.ready[position.previous_half()] = false;
	}
}

/// Combines a lane register with the carried partial sum at the end of a group's accumulation.
///
/// Returns the finalized value when `position` is the last group of the tile, otherwise stores
/// the running sum into `current`.
#[inline]
pub fn carry<T: FixedPoint>(
	position: GroupPosition,
	previous: Wide<T>,
	register: Wide<T>,
	current: &mut Wide<T>,
) -> Option<Wide<T>> {
	match (position.is_first(), position.is_last()) {
		(true, true) => Some(register),
		(true, false) => {
			*current = register;
			None
		}
		(false, false) => {
			*current = previous + register;
			None
		}
		(false, true) => Some(previous + register),
	}
}

#[cfg(test)]
mod tests {
	use assert_matches::assert_matches;
	use proptest::prelude::*;
	use tilecheck_fixed::Word16;

	use super::*;

	fn run_groups(contributions: &[Vec<Wide<Word16>>]) -> Vec<Wide<Word16>> {
		let count = contributions.len();
		let len = contributions[0].len();
		let mut buffer = PartialSumBuffer::new(len);
		let mut finalized = Vec::new();
		for (index, registers) in contributions.iter().enumerate() {
			let position = GroupPosition::new(index, count);
			let (previous, current) = buffer.split_for_group(position).unwrap();
			for (o, &register) in registers.iter().enumerate() {
				if let Some(value) = carry(position, previous[o], register, &mut current[o]) {
					finalized.push(value);
				}
			}
			buffer.publish(position);
		}
		finalized
	}

	#[test]
	fn test_single_group_emits_register() {
		let registers = vec![Wide::from_raw(5), Wide::from_raw(-3)];
		assert_eq!(run_groups(&[registers.clone()]), registers);
	}

	#[test]
	fn test_reading_unpublished_half_fails() {
		let mut buffer = PartialSumBuffer::<Word16>::new(4);
		assert_matches!(
			buffer.split_for_group(GroupPosition::new(1, 3)),
			Err(Error::PartialSumNotReady { group: 1 })
		);

		let first = GroupPosition::new(0, 3);
		buffer.split_for_group(first).unwrap();
		buffer.publish(first);
		assert!(buffer.is_ready(0));

		let second = GroupPosition::new(1, 3);
		buffer.split_for_group(second).unwrap();
		buffer.publish(second);
		assert!(!buffer.is_ready(0) && buffer.is_ready(1));

		// The third group reads half 1; rerunning the second group would read the consumed half 0.
		assert_matches!(
			buffer.split_for_group(second),
			Err(Error::PartialSumNotReady { group: 1 })
		);
		assert!(buffer.split_for_group(GroupPosition::new(2, 3)).is_ok());
	}

	proptest! {
		#[test]
		fn test_finalized_value_is_sum_of_contributions(
			contributions in proptest::collection::vec(
				proptest::collection::vec(any::<i64>(), 6),
				1..6,
			)
		) {
			let contributions = contributions
				.iter()
				.map(|group| group.iter().map(|&raw| Wide::from_raw(raw)).collect::<Vec<_>>())
				.collect::<Vec<_>>();
			let expected = (0..6)
				.map(|o| contributions.iter().map(|group| group[o]).sum::<Wide<Word16>>())
				.collect::<Vec<_>>();
			prop_assert_eq!(run_groups(&contributions), expected);
		}
	}
}
