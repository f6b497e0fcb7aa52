//! Tracing subscriber setup.
//!
//! Library code only emits `tracing` events; binaries call [`init_tracing`]
//! once at startup. Output goes to stderr so it never interleaves with the
//! rendered transcript on stdout.

use tracing_subscriber::EnvFilter;

/// Installs a global fmt subscriber filtered by `filter` (an `EnvFilter`
/// directive string such as `"warn"` or `"stepwise=debug"`).
///
/// Returns false when the directive does not parse or a subscriber is already
/// installed; logging then stays as it was.
pub fn init_tracing(filter: &str) -> bool {
    let env_filter = match EnvFilter::try_new(filter) {
        Ok(env_filter) => env_filter,
        Err(_) => return false,
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init()
        .is_ok()
}
