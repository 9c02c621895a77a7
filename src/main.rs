use clap::Parser;
use env_logger::Env;
use rhda_mcp_server::args::Args;
use rhda_mcp_server::backend::{HttpAnalysisBackend, HttpIntelBackend};
use rhda_mcp_server::errors::*;
use rhda_mcp_server::server::RhdaMcpServer;
use rhda_mcp_server::store::ResultStore;
use rhda_mcp_server::tools::Tools;
use rmcp::{transport::stdio, ServiceExt};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // stdout carries the MCP stream, env_logger writes to stderr
    env_logger::init_from_env(Env::default().default_filter_or(args.log_level()));

    let config = args.config();
    debug!("Using config: {:?}", config);

    let client = reqwest::Client::builder()
        .user_agent(concat!("rhda-mcp-server/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to setup http client")?;

    let tools = Tools::new(
        Arc::new(ResultStore::new()),
        Arc::new(HttpAnalysisBackend::new(client.clone(), config.backend_url)),
        Arc::new(HttpIntelBackend::new(client, config.intel_server_url)),
    );

    let running = RhdaMcpServer::new(Arc::new(tools))
        .serve(stdio())
        .await
        .context("Failed to start stdio MCP server")?;
    info!("RHDA MCP Server started");

    let reason = running
        .waiting()
        .await
        .context("MCP server task failed")?;
    debug!("MCP server stopped: {:?}", reason);

    Ok(())
}
