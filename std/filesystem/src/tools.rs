//! Tool definitions for the filesystem MCP server.
//!
//! Each tool deserializes its parameters, runs one operation from
//! [`crate::ops`] and maps the [`Outcome`](crate::ops::Outcome) to an MCP
//! reply. Paths arrive here already checked and rewritten by the path guard.

use crate::ops::{self, Depth};
use rmcp::{
    ErrorData, RoleServer,
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::CallToolResult,
    schemars::{self, JsonSchema},
    service::RequestContext,
    tool, tool_router,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Parameters for listing a directory.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct ListEntriesParams {
    /// Path for which to list all entries
    pub path: String,
    /// Depth of the directory tree (default is 3, negative for unlimited)
    pub depth: Option<f64>,
}

/// Parameters for reading a file.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct ReadFromFileParams {
    /// Path to the file to be read
    pub path: String,
}

/// Parameters for writing a file.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct WriteToFileParams {
    /// Path to the file to write to
    pub path: String,
    /// Content to write to the file
    pub content: String,
}

/// Parameters for describing a file.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetFileInfoParams {
    /// Path to the file to retrieve information from
    pub path: String,
}

/// Parameters for renaming a file or directory.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct RenamePathParams {
    /// Path to the file or directory to be renamed
    pub path: String,
    /// New name for the file or directory (just the name, not the full path)
    #[serde(rename = "newPathFinalName")]
    pub new_name: String,
}

/// Parameters for copying a file or directory.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct CopyFileOrDirParams {
    /// Path to the file or directory to be copied
    pub path: String,
    /// Destination path where the file or directory will be copied
    pub destination: String,
}

/// The six filesystem tools.
#[derive(Debug, Clone)]
pub struct FilesystemTools {
    /// Sandbox base with symlinks resolved.
    root: Arc<PathBuf>,
}

impl FilesystemTools {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root: Arc::new(root),
        }
    }

    /// Router holding every tool with its schema.
    pub fn router() -> ToolRouter<Self> {
        Self::tool_router()
    }
}

#[tool_router]
impl FilesystemTools {
    #[tool(name = "listEntries", description = "List entries at a given path")]
    async fn list_entries(
        &self,
        Parameters(params): Parameters<ListEntriesParams>,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, ErrorData> {
        let depth = Depth::from_param(params.depth);
        ops::list(Path::new(&params.path), depth, &context.ct)
            .await
            .into_call_result("listEntries")
    }

    #[tool(
        name = "readFromFile",
        description = "Read the contents of a file at a given path"
    )]
    async fn read_from_file(
        &self,
        Parameters(params): Parameters<ReadFromFileParams>,
    ) -> Result<CallToolResult, ErrorData> {
        ops::read(Path::new(&params.path))
            .await
            .into_call_result("readFromFile")
    }

    #[tool(
        name = "writeToFile",
        description = "Create or overwrite a file with the given content"
    )]
    async fn write_to_file(
        &self,
        Parameters(params): Parameters<WriteToFileParams>,
    ) -> Result<CallToolResult, ErrorData> {
        ops::write(&params.content, Path::new(&params.path))
            .await
            .into_call_result("writeToFile")
    }

    #[tool(
        name = "getFileInfo",
        description = "Retrieve file information including size, last modified time, detected MIME type, and file permissions"
    )]
    async fn get_file_info(
        &self,
        Parameters(params): Parameters<GetFileInfoParams>,
    ) -> Result<CallToolResult, ErrorData> {
        ops::info(Path::new(&params.path))
            .await
            .into_call_result("getFileInfo")
    }

    #[tool(name = "renamePath", description = "Renames a file or directory to a new name")]
    async fn rename_path(
        &self,
        Parameters(params): Parameters<RenamePathParams>,
    ) -> Result<CallToolResult, ErrorData> {
        ops::rename(Path::new(&params.path), &params.new_name, &self.root)
            .await
            .into_call_result("renamePath")
    }

    #[tool(
        name = "copyFileOrDir",
        description = "Copies a file or directory to a new location"
    )]
    async fn copy_file_or_dir(
        &self,
        Parameters(params): Parameters<CopyFileOrDirParams>,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, ErrorData> {
        ops::copy(
            Path::new(&params.path),
            Path::new(&params.destination),
            &context.ct,
        )
        .await
        .into_call_result("copyFileOrDir")
    }
}

#[cfg(test)]
mod tests {
    use crate::tools::FilesystemTools;
    use serde_json::Value;

    #[test]
    fn registers_six_tools() {
        let mut names: Vec<String> = FilesystemTools::router()
            .list_all()
            .into_iter()
            .map(|tool| tool.name.to_string())
            .collect();
        names.sort();
        assert_eq!(
            names,
            [
                "copyFileOrDir",
                "getFileInfo",
                "listEntries",
                "readFromFile",
                "renamePath",
                "writeToFile",
            ]
        );
    }

    #[test]
    fn schemas_use_wire_parameter_names() {
        let tools = FilesystemTools::router().list_all();
        let schema = |name: &str| {
            let tool = tools.iter().find(|t| t.name == name).unwrap();
            Value::Object(tool.input_schema.as_ref().clone())
        };

        let rename = schema("renamePath");
        assert!(rename["properties"]["newPathFinalName"].is_object());
        let required = rename["required"].as_array().unwrap();
        assert!(required.contains(&Value::from("path")));
        assert!(required.contains(&Value::from("newPathFinalName")));

        let list = schema("listEntries");
        let required = list["required"].as_array().unwrap();
        assert_eq!(required, &vec![Value::from("path")]);
        assert!(list["properties"]["depth"].is_object());
    }
}
