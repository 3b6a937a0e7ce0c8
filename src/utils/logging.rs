//! Logging setup built on `tracing-subscriber`.

use tracing::Level;

/// Maps a textual level (as found in config or on the command line) to a
/// `tracing::Level`. Unknown names fall back to `INFO`.
pub fn parse_level(name: &str) -> Level {
    match name.trim().to_lowercase().as_str() {
        "error" => Level::ERROR,
        "warn" | "warning" => Level::WARN,
        "debug" => Level::DEBUG,
        "trace" => Level::TRACE,
        _ => Level::INFO,
    }
}

/// Installs the global fmt subscriber.
///
/// Worker pools log from many tasks at once, so thread ids are included.
/// Uses `try_init` so tests and the binary can both call it repeatedly.
pub fn init(level: &str) {
    let _ = tracing_subscriber::fmt()
        .with_max_level(parse_level(level))
        .with_target(false)
        .with_thread_ids(true)
        .try_init();
}
