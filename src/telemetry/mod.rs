use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Registry};

const SERVICE_NAME: &str = "ringlb";
const DEFAULT_FILTER: &str = "info";

/// Installs a subscriber that writes bunyan formatted JSON logs to stderr.
/// Verbosity is controlled with `RUST_LOG` and defaults to `info`.
pub fn initialize_json_subscriber() {
    let formatting_layer = BunyanFormattingLayer::new(SERVICE_NAME.to_string(), std::io::stderr);

    Registry::default()
        .with(env_filter())
        .with(JsonStorageLayer)
        .with(formatting_layer)
        .init();
}

/// Installs a human readable subscriber writing to stderr, stdout is left to command responses
pub fn initialize_fmt_subscriber() {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .init();
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}
