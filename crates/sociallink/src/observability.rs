//! Tracing setup for hosts that don't install their own subscriber.
//!
//! Flow spans carry the configured `logger` field, so one host can tell
//! several engines apart in a shared log stream.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Crate targets the default filter enables.
const ENGINE_TARGETS: [&str; 2] = ["sociallink", "sociallink_memory"];

/// Installs a subscriber logging engine events at `info`.
pub fn init_tracing() {
    init_tracing_with_level("info");
}

/// Installs a subscriber logging engine events at `level` and everything
/// else at `warn`. `RUST_LOG` overrides both when set.
pub fn init_tracing_with_level(level: &str) {
    let filter = std::env::var("RUST_LOG")
        .ok()
        .and_then(|_| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(default_directives(level)));

    // A subscriber installed by the host wins.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .try_init();
}

fn default_directives(level: &str) -> String {
    let mut directives = vec!["warn".to_string()];
    directives.extend(ENGINE_TARGETS.iter().map(|target| format!("{target}={level}")));
    directives.join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives() {
        assert_eq!(
            default_directives("debug"),
            "warn,sociallink=debug,sociallink_memory=debug"
        );
    }

    #[test]
    fn test_init_is_repeatable() {
        init_tracing_with_level("debug");
        init_tracing();
        tracing::info!("still logging");
    }
}
