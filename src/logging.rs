use log::LevelFilter;

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "chirp=info";

/// Install `env_logger`, honouring `RUST_LOG` and falling back to
/// [`DEFAULT_FILTER`]. Safe to call more than once.
pub fn init() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(DEFAULT_FILTER))
        .format_timestamp_millis()
        .try_init();
}

/// Install `env_logger` with a fixed level for this crate, ignoring `RUST_LOG`.
pub fn init_with_level(level: LevelFilter) {
    let _ = env_logger::Builder::new()
        .filter_module("chirp", level)
        .format_timestamp_millis()
        .try_init();
}

/// For tests: captured by the harness, repeated calls are harmless.
pub fn init_for_tests() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("chirp=debug"))
        .is_test(true)
        .try_init();
}
