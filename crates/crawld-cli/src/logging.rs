use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

const DEFAULT_DIRECTIVE: &str = "info";

/// Filter from `RUST_LOG`, falling back to `info` when it is unset or
/// unparsable.
pub fn env_filter(directive: Option<&str>) -> EnvFilter {
    directive
        .filter(|value| !value.trim().is_empty())
        .and_then(|value| EnvFilter::try_new(value).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_DIRECTIVE))
}

pub fn init() {
    let directive = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    tracing_subscriber::registry()
        .with(env_filter(directive.as_deref()))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}
