//! Logging prelude module for convenient access to tracing macros.
//!
//! Re-exports the common tracing macros so engine modules can pull them in
//! with one `use crate::logging::*;`.

pub use tracing::{debug, error, info, warn};

/// Initialize the tracing subscriber with environment filter support.
///
/// Logs at INFO level and above by default. Control the log level with the
/// `RUST_LOG` environment variable:
///
/// ```bash
/// RUST_LOG=debug mediasyncr sync /mnt/card
/// RUST_LOG=mediasyncr::album=trace mediasyncr sync /mnt/card
/// ```
pub fn init_tracing() {
	tracing_subscriber::fmt()
		.with_env_filter(
			tracing_subscriber::EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
		)
		.with_writer(std::io::stderr)
		.init();
}

// vim: ts=4
