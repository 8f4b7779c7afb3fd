//! Tracing initialization.

use tracing_subscriber::EnvFilter;

/// Install the global subscriber. `filter` is an `EnvFilter` directive
/// string such as `info` or `mcp_bridge=debug,info`.
pub fn init(filter: &str) {
    let filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));
    // try_init so tests that build the router twice don't panic.
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
