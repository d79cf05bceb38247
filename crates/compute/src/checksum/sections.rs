// Copyright 2025 Irreducible Inc.

use itertools::iproduct;
use tilecheck_fixed::{FixedPoint, Wide};

use super::SectionLayout;
use crate::Tensor;

/// Sums of one input plane over every pair of row band and column band, `[2K - S, 2K - S]`.
pub type SectionSums<T> = Tensor<Wide<T>, 2>;

/// Streaming accumulation of section sums.
///
/// Every input value is added to exactly one section, so a plane is scanned in a single pass as
/// it streams by.
#[derive(Debug, Clone)]
pub struct SectionScanner<T> {
	layout: SectionLayout,
	row_bands: Vec<usize>,
	col_bands: Vec<usize>,
	sections: SectionSums<T>,
}

impl<T: FixedPoint> SectionScanner<T> {
	pub fn new(layout: SectionLayout) -> Self {
		let row_bands = (0..layout.rows.extent())
			.map(|row| layout.rows.band_of(row))
			.collect();
		let col_bands = (0..layout.cols.extent())
			.map(|col| layout.cols.band_of(col))
			.collect();
		Self {
			layout,
			row_bands,
			col_bands,
			sections: Tensor::new(layout.shape()),
		}
	}

	pub fn layout(&self) -> &SectionLayout {
		&self.layout
	}

	/// Adds one row of the padded plane.
	#[inline]
	pub fn push_row(&mut self, row: usize, values: &[T]) {
		debug_assert_eq!(values.len(), self.col_bands.len());
		let row_band = self.row_bands[row];
		let sections = self.sections.outer_mut(row_band);
		for (&value, &col_band) in values.iter().zip(&self.col_bands) {
			sections[col_band] += value.widen();
		}
	}

	/// Returns the section sums accumulated so far and starts over.
	pub fn take(&mut self) -> SectionSums<T> {
		std::mem::replace(&mut self.sections, Tensor::new(self.layout.shape()))
	}

	/// Scans a whole `[trr, tcc]` plane.
	pub fn scan_plane(&mut self, plane: &[T]) -> SectionSums<T> {
		for (row, values) in plane.chunks_exact(self.col_bands.len()).enumerate() {
			self.push_row(row, values);
		}
		self.take()
	}
}

/// `X[i][j]`: the sum of an input plane over every position kernel offset `(i, j)` touches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowSums<T> {
	sums: Tensor<Wide<T>, 2>,
}

impl<T: FixedPoint> WindowSums<T> {
	/// Derives the window sums from the section sums of a plane.
	///
	/// The offsets below the stride are seeded from whole sections. Every other offset reuses the
	/// sum of the offset one stride before it, adding the band that enters the window and
	/// subtracting the band that leaves it: first down the leading columns, then along every row.
	pub fn from_sections(layout: &SectionLayout, sections: &SectionSums<T>) -> Self {
		let k = layout.kernel();
		let s = layout.stride();
		let row_bands = (0..k)
			.map(|i| layout.rows.offset_bands(i))
			.collect::<Vec<_>>();
		let col_bands = (0..k)
			.map(|j| layout.cols.offset_bands(j))
			.collect::<Vec<_>>();

		let mut sums = Tensor::<Wide<T>, 2>::new([k, k]);
		for (p, q) in iproduct!(0..s, 0..s) {
			sums[[p, q]] = iproduct!(&row_bands[p], &col_bands[q])
				.map(|(&a, &b)| sections[[a, b]])
				.sum();
		}

		for (i, q) in iproduct!(s..k, 0..s) {
			let (enter, leave) = layout.rows.step(i);
			let delta = col_bands[q]
				.iter()
				.map(|&b| sections[[enter, b]] - sections[[leave, b]])
				.sum::<Wide<T>>();
			sums[[i, q]] = sums[[i - s, q]] + delta;
		}

		for (i, j) in iproduct!(0..k, s..k) {
			let (enter, leave) = layout.cols.step(j);
			let delta = row_bands[i]
				.iter()
				.map(|&a| sections[[a, enter]] - sections[[a, leave]])
				.sum::<Wide<T>>();
			sums[[i, j]] = sums[[i, j - s]] + delta;
		}

		Self { sums }
	}

	pub fn get(&self, i: usize, j: usize) -> Wide<T> {
		self.sums[[i, j]]
	}

	pub fn as_slice(&self) -> &[Wide<T>] {
		self.sums.as_slice()
	}
}
