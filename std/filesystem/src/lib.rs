//! MCP server providing sandboxed filesystem tools.
//!
//! Every request path is confined to one base directory chosen at startup,
//! or, in container mode, rewritten from a host volume path to the matching
//! path inside the container. Six tools are exposed: `listEntries`,
//! `readFromFile`, `writeToFile`, `getFileInfo`, `renamePath` and
//! `copyFileOrDir`.

use crate::{
    config::SandboxConfig,
    middleware::{Dispatch, LogLayer, LogService, PathGuardLayer, PathGuardService, ToolCall},
    tools::FilesystemTools,
    validate::PathPolicy,
};
use rmcp::{
    ErrorData, RoleServer, ServerHandler,
    model::{
        CallToolRequestParams, CallToolResult, Implementation, ListToolsResult,
        PaginatedRequestParams, ServerCapabilities, ServerInfo,
    },
    service::RequestContext,
};
use std::sync::Arc;
use tower::{ServiceBuilder, ServiceExt};

pub mod config;
pub mod middleware;
pub mod ops;
pub mod sniff;
pub mod tools;
pub mod validate;

type Stack = LogService<PathGuardService<Dispatch>>;

/// MCP filesystem server bound to one sandbox.
#[derive(Debug, Clone)]
pub struct FilesystemServer {
    config: Arc<SandboxConfig>,
    stack: Stack,
}

impl FilesystemServer {
    /// Build the server and its request stack for `config`.
    pub fn new(config: SandboxConfig) -> Self {
        let stack = ServiceBuilder::new()
            .layer(LogLayer)
            .layer(PathGuardLayer::new(PathPolicy::from_config(&config)))
            .service(Dispatch::new(FilesystemTools::new(
                config.resolved_base.clone(),
            )));
        Self {
            config: Arc::new(config),
            stack,
        }
    }

    /// The sandbox this server was started with.
    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }
}

impl ServerHandler for FilesystemServer {
    fn get_info(&self) -> ServerInfo {
        let scope = match &self.config.volume {
            Some(mapping) => format!(
                "Paths are host paths under {}.",
                mapping.host.display()
            ),
            None => format!("Paths must lie under {}.", self.config.base_dir.display()),
        };
        ServerInfo {
            protocol_version: Default::default(),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "fs-mcp-server".into(),
                title: Some("Filesystem MCP Server".into()),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            instructions: Some(format!(
                "Filesystem server for listing, reading, writing, renaming and copying files. {scope}"
            )),
        }
    }

    async fn call_tool(
        &self,
        params: CallToolRequestParams,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, ErrorData> {
        self.stack
            .clone()
            .oneshot(ToolCall { params, context })
            .await
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, ErrorData> {
        Ok(ListToolsResult::with_all_items(
            FilesystemTools::router().list_all(),
        ))
    }
}
