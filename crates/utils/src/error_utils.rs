// Copyright 2024-2025 Irreducible Inc.

//! Early-return helpers for precondition checks.
//!
//! With the `bail_panic` feature enabled the macros panic instead of returning, which makes it
//! easy to get a backtrace pointing at the failed check while debugging a configuration.

#[cfg(feature = "bail_panic")]
#[macro_export]
macro_rules! bail {
	($err:expr) => {
		panic!("{}", $err);
	};
}

#[cfg(not(feature = "bail_panic"))]
#[macro_export]
macro_rules! bail {
	($err:expr) => {
		return Err($err.into());
	};
}

#[macro_export]
macro_rules! ensure {
	($cond:expr, $err:expr) => {
		if !$cond {
			$crate::bail!($err);
		}
	};
}

#[cfg(all(test, not(feature = "bail_panic")))]
mod tests {
	#[derive(Debug, PartialEq, Eq)]
	struct Rejected(usize);

	fn accept_even(value: usize) -> Result<usize, Rejected> {
		ensure!(value % 2 == 0, Rejected(value));
		Ok(value / 2)
	}

	#[test]
	fn test_ensure_passes_and_fails() {
		assert_eq!(accept_even(8), Ok(4));
		assert_eq!(accept_even(7), Err(Rejected(7)));
	}
}
