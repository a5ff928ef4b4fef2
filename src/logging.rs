//! Tracing subscriber setup for the command line runner.
//!
//! Library code only emits `tracing` events; installing a subscriber is left to the
//! binary so embedding applications keep control of their own output.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber.
///
/// `verbose` wins over `quiet`. Without either flag, `RUST_LOG` is honoured and the
/// default is info level for this crate. Call once, before anything logs.
pub fn init_logger(verbose: bool, quiet: bool, no_color: bool) {
  let filter = if verbose {
    EnvFilter::new("site_pipeline=debug")
  } else if quiet {
    EnvFilter::new("site_pipeline=error")
  } else {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("site_pipeline=info"))
  };

  let fmt_layer = fmt::layer()
    .with_target(false)
    .with_level(true)
    .with_ansi(!no_color)
    .compact();

  // A second initialisation (tests, embedding) keeps the first subscriber.
  let _ = tracing_subscriber::registry()
    .with(filter)
    .with(fmt_layer)
    .try_init();
}
