use std::sync::Arc;

use anyhow::Context;
use r2r_search_mcp::client::HttpR2rClient;
use r2r_search_mcp::config::{Config, ServerMode};
use r2r_search_mcp::http::serve_http;
use r2r_search_mcp::mcp::run_stdio;
use r2r_search_mcp::search::SearchPipeline;
use r2r_search_mcp::session::{SessionGuard, SessionStatus};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout 是协议通道，日志只写 stderr
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = Config::from_env().context("failed to load configuration from environment")?;
    info!(
        "R2R base URL: {}, authenticated: {}, mode: {:?}",
        config.r2r.base_url,
        config.r2r.credentials.is_some(),
        config.server.mode
    );

    let client = HttpR2rClient::new(config.r2r.base_url.clone()).context("failed to build R2R client")?;
    let session = SessionGuard::new(Arc::new(client), config.r2r.credentials.clone());

    // 启动前尽力登录一次，失败不影响服务启动
    if let SessionStatus::LoginFailed(e) = session.ensure_initialized().await.status {
        warn!("starting without a valid R2R session: {e}");
    }

    let pipeline = Arc::new(SearchPipeline::new(session));

    match config.server.mode {
        ServerMode::Stdio => run_stdio(pipeline).await?,
        ServerMode::Http => serve_http(pipeline, &config.server).await?,
        ServerMode::Both => {
            let server = config.server.clone();
            let http_pipeline = pipeline.clone();
            let http_task = tokio::spawn(async move { serve_http(http_pipeline, &server).await });
            let stdio_task = tokio::spawn(async move { run_stdio(pipeline).await });
            http_task.await.context("http task panicked")??;
            stdio_task.await.context("stdio task panicked")??;
        }
    }

    Ok(())
}
