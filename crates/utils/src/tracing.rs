// Copyright 2023-2025 Irreducible Inc.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Installs the global tracing subscriber.
///
/// Filtering follows `RUST_LOG` and defaults to `info`. Calling this more than once is harmless,
/// later calls leave the first subscriber in place.
pub fn init_tracing() {
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

	let _ = tracing_subscriber::registry()
		.with(filter)
		.with(fmt::layer().with_writer(std::io::stderr).with_thread_names(true))
		.try_init();
}
