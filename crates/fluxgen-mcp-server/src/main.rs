//! FLUX MCP Server - Entry Point
//!
//! Runs the MCP server over stdio for integration with AI assistants.

use anyhow::Result;
use argh::FromArgs;
use fluxgen_mcp_server::FluxServer;

/// FLUX MCP Server - Generate images with FLUX models via Replicate
#[derive(FromArgs)]
struct Args {
    /// replicate API base URL (default: https://api.replicate.com)
    #[argh(option, default = "String::from(fluxgen::replicate::API_BASE)")]
    api_url: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Args = argh::from_env();

    // Initialize logging to stderr (stdout is used for MCP protocol)
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    log::info!("Starting FLUX MCP server");
    log::info!("Replicate API: {}", args.api_url);

    let server = FluxServer::new(args.api_url);

    // Run over stdio; a transport failure here is the only fatal error
    server.run_stdio().await?;

    Ok(())
}
