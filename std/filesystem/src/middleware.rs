//! Tower middleware wrapped around tool dispatch.
//!
//! The stack is built in [`crate::FilesystemServer::new`]:
//!
//! ```text
//! LogLayer -> PathGuardLayer -> Dispatch -> FilesystemTools
//! ```
//!
//! The layers are generic over the request context so they can be driven
//! without a live MCP peer.

use crate::tools::FilesystemTools;
use crate::validate::{Admission, PathPolicy};
use futures::future::BoxFuture;
use rmcp::{
    ErrorData, RoleServer,
    handler::server::{router::tool::ToolRouter, tool::ToolCallContext},
    model::{CallToolRequestParams, CallToolResult, Content},
    service::RequestContext,
};
use serde_json::Value;
use std::sync::Arc;
use std::task::{Context, Poll};

/// Arguments that carry client paths.
pub const GUARDED_ARGUMENTS: [&str; 2] = ["path", "destination"];

/// One tool invocation travelling through the stack.
#[derive(Debug, Clone)]
pub struct ToolCall<C = RequestContext<RoleServer>> {
    pub params: CallToolRequestParams,
    pub context: C,
}

/// Tower [`Layer`](tower::Layer) that applies [`LogService`].
#[derive(Debug, Clone, Copy, Default)]
pub struct LogLayer;

impl<S> tower::Layer<S> for LogLayer {
    type Service = LogService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        LogService { inner }
    }
}

/// Records the tool name and raw arguments, then delegates.
#[derive(Debug, Clone)]
pub struct LogService<S> {
    inner: S,
}

impl<S, C> tower::Service<ToolCall<C>> for LogService<S>
where
    S: tower::Service<ToolCall<C>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, call: ToolCall<C>) -> Self::Future {
        let arguments = call
            .params
            .arguments
            .as_ref()
            .map(|args| Value::Object(args.clone()))
            .unwrap_or(Value::Null);
        tracing::info!(tool = %call.params.name, %arguments, "tool called");
        self.inner.call(call)
    }
}

/// Tower [`Layer`](tower::Layer) that applies [`PathGuardService`].
#[derive(Debug, Clone)]
pub struct PathGuardLayer {
    policy: Arc<PathPolicy>,
}

impl PathGuardLayer {
    pub fn new(policy: PathPolicy) -> Self {
        Self {
            policy: Arc::new(policy),
        }
    }
}

impl<S> tower::Layer<S> for PathGuardLayer {
    type Service = PathGuardService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        PathGuardService {
            policy: self.policy.clone(),
            inner,
        }
    }
}

/// Rejects calls whose path arguments fall outside the sandbox and
/// rewrites admitted ones to the path the operation should use.
#[derive(Debug, Clone)]
pub struct PathGuardService<S> {
    policy: Arc<PathPolicy>,
    inner: S,
}

impl<S, C> tower::Service<ToolCall<C>> for PathGuardService<S>
where
    S: tower::Service<ToolCall<C>, Response = CallToolResult, Error = ErrorData>
        + Clone
        + Send
        + 'static,
    S::Future: Send,
    C: Send + 'static,
{
    type Response = CallToolResult;
    type Error = ErrorData;
    type Future = BoxFuture<'static, Result<CallToolResult, ErrorData>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut call: ToolCall<C>) -> Self::Future {
        let policy = self.policy.clone();
        let mut inner = self.inner.clone();
        // swap to ensure poll_ready state is preserved
        std::mem::swap(&mut self.inner, &mut inner);

        Box::pin(async move {
            let arguments = call.params.arguments.get_or_insert_with(Default::default);
            if !arguments.contains_key("path") {
                return Err(ErrorData::invalid_params("missing argument `path`", None));
            }

            for key in GUARDED_ARGUMENTS {
                let raw = match arguments.get(key) {
                    None => continue,
                    Some(Value::String(raw)) => raw,
                    Some(_) => {
                        return Err(ErrorData::invalid_params(
                            format!("argument `{key}` must be a string"),
                            None,
                        ));
                    }
                };
                match policy.admit(raw).await {
                    Admission::Allowed(path) => {
                        let path = path.to_string_lossy().into_owned();
                        tracing::debug!(argument = key, %path, "path admitted");
                        arguments.insert(key.to_string(), Value::String(path));
                    }
                    Admission::Denied(reply) => {
                        tracing::warn!(tool = %call.params.name, argument = key, %raw, "{reply}");
                        return Ok(CallToolResult::success(vec![Content::text(reply)]));
                    }
                }
            }

            inner.call(call).await
        })
    }
}

/// Bottom of the stack: routes the call to the matching tool.
#[derive(Debug, Clone)]
pub struct Dispatch {
    tools: FilesystemTools,
    router: ToolRouter<FilesystemTools>,
}

impl Dispatch {
    pub fn new(tools: FilesystemTools) -> Self {
        Self {
            tools,
            router: FilesystemTools::router(),
        }
    }
}

impl tower::Service<ToolCall> for Dispatch {
    type Response = CallToolResult;
    type Error = ErrorData;
    type Future = BoxFuture<'static, Result<CallToolResult, ErrorData>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, call: ToolCall) -> Self::Future {
        let tools = self.tools.clone();
        let router = self.router.clone();
        Box::pin(async move {
            router
                .call(ToolCallContext::new(&tools, call.params, call.context))
                .await
        })
    }
}
