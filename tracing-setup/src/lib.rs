use tracing_subscriber::{fmt, EnvFilter};

/// Initializes the process-wide `tracing` subscriber once at startup. `filter`
/// is an `EnvFilter` directive string (e.g. `"warn,orderbook=debug"`); callers
/// pass the value of `--log-filter` straight through.
///
/// Panics if a subscriber is already installed, the same as calling this
/// twice in one process would.
pub fn initialize(filter: &str) {
    let env_filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_to_info_on_an_unparsable_directive() {
        // EnvFilter::try_new only validates syntax; this just exercises the
        // fallback branch without installing a global subscriber.
        assert!(EnvFilter::try_new("not a valid directive!!").is_err());
        let _ = EnvFilter::try_new(filter_or_default("garbage"));
    }

    fn filter_or_default(filter: &str) -> String {
        EnvFilter::try_new(filter)
            .map(|_| filter.to_string())
            .unwrap_or_else(|_| "info".to_string())
    }
}
