//! Tracing configuration.
//!
//! Logs to stderr with a compact formatter. `RUST_LOG` controls filtering
//! and defaults to `info`. CLI command output itself goes to stdout via
//! `println!` and is not routed through tracing.

use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}
