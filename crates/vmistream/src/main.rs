//! vmistream: guest-physical memory introspection MCP server.
//!
//! Serves the vmistream tools over the stdio transport.

use rmcp::transport::stdio;
use rmcp::ServiceExt;
use tracing_subscriber::EnvFilter;
use vmistream::server::VmiServer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so stdout stays clean for MCP
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("vmistream MCP server starting...");

    let service = VmiServer::new()
        .serve(stdio())
        .await
        .inspect_err(|e| tracing::error!("Server error: {}", e))?;

    tracing::info!("vmistream MCP server running on stdio");
    service.waiting().await?;

    tracing::info!("vmistream MCP server shutting down");
    Ok(())
}
