//! Binary entry point for the fs-mcp-server MCP server.

use anyhow::Context;
use clap::{ArgAction, Parser};
use fs_mcp_server::{
    FilesystemServer,
    config::{SandboxConfig, Transport},
};
use rmcp::{
    ServiceExt,
    transport::streamable_http_server::{
        StreamableHttpServerConfig, StreamableHttpService, session::local::LocalSessionManager,
    },
};
use std::net::IpAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Filesystem MCP server: sandboxed file tools over stdio or HTTP.
#[derive(Parser, Debug)]
#[command(name = "fs-mcp-server", version, about)]
struct Cli {
    /// Base directory the server may access.
    #[arg(long)]
    dir: Option<PathBuf>,

    /// Port for the HTTP transport.
    #[arg(long, default_value_t = 8080)]
    port: u16,

    /// Address for the HTTP transport to bind.
    #[arg(long, default_value = "0.0.0.0")]
    host: IpAddr,

    /// Transport to serve MCP over.
    #[arg(short, long, value_enum, default_value_t = Transport::Stdio)]
    transport: Transport,

    /// Volume mount as hostPath:containerPath, used in container mode.
    #[arg(long)]
    volume: Option<String>,

    /// Rewrite host paths through --volume.
    #[arg(
        long,
        env = "FS_MCP_DOCKER_MODE",
        action = ArgAction::Set,
        num_args = 0..=1,
        default_value = "false",
        default_missing_value = "true",
        value_parser = parse_switch,
    )]
    container_mode: bool,
}

/// Only `true` (any case) or `1` switch the mode on.
fn parse_switch(s: &str) -> Result<bool, String> {
    Ok(s.eq_ignore_ascii_case("true") || s == "1")
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let cli = Cli::parse();

    let config = match SandboxConfig::resolve(
        cli.dir,
        cli.container_mode,
        cli.volume.as_deref(),
    ) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{e}");
            return ExitCode::from(1);
        }
    };
    match &config.volume {
        Some(mapping) => tracing::info!(
            host = %mapping.host.display(),
            container = %mapping.container.display(),
            "container mode enabled"
        ),
        None => tracing::info!(base = %config.base_dir.display(), "sandbox mode enabled"),
    }

    let server = FilesystemServer::new(config);
    let served = match cli.transport {
        Transport::Stdio => serve_stdio(server).await,
        Transport::Http => serve_http(server, cli.host, cli.port).await,
    };
    match served {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::from(2)
        }
    }
}

async fn serve_stdio(server: FilesystemServer) -> anyhow::Result<()> {
    tracing::info!("serving on stdio");
    server
        .serve(rmcp::transport::stdio())
        .await
        .context("failed to start server")?
        .waiting()
        .await
        .context("server error")?;
    Ok(())
}

async fn serve_http(server: FilesystemServer, host: IpAddr, port: u16) -> anyhow::Result<()> {
    let service = StreamableHttpService::new(
        move || Ok(server.clone()),
        LocalSessionManager::default().into(),
        StreamableHttpServerConfig::default(),
    );
    let app = axum::Router::new().nest_service("/mcp", service);

    let listener = tokio::net::TcpListener::bind((host, port))
        .await
        .with_context(|| format!("failed to bind {host}:{port}"))?;
    tracing::info!(%host, port, "serving streamable HTTP at /mcp");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("failed to listen for ctrl-c: {e}");
                std::future::pending::<()>().await;
            }
            tracing::info!("shutting down");
        })
        .await
        .context("http server error")
}
