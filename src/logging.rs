// 📝 Logging - tracing subscriber setup
//
// Filter comes from RUST_LOG when set, otherwise from the configured level.
// Logs go to stderr so CLI summaries on stdout stay clean.

use crate::config::LoggingConfig;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber. A second call is a no-op.
pub fn init_logging(level: &str, json_output: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(filter);

    let result = if json_output {
        registry.with(fmt::layer().json().with_writer(std::io::stderr)).try_init()
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()
    };

    if result.is_err() {
        tracing::debug!("logging already initialised");
    }
}

pub fn init_from_config(config: &LoggingConfig) {
    init_logging(&config.level, config.json);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_twice_is_harmless() {
        init_logging("debug", false);
        init_logging("info", true);
        tracing::info!("still logging");
    }
}
