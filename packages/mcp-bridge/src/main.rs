use mcp_bridge::cli::run_bridge;

fn main() {
    if let Err(err) = run_bridge() {
        tracing::error!(error = %err, "mcp-bridge failed");
        std::process::exit(1);
    }
}
