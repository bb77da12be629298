//! Filesystem operations behind the MCP tools.
//!
//! Every operation reports an [`Outcome`]: text content, a message the
//! caller can act on, or a hard failure. Paths are expected to have passed
//! the path policy already.

use crate::sniff;
use rmcp::{
    ErrorData,
    model::{self, CallToolResult},
};
use std::fs::Metadata;
use std::future::Future;
use std::io;
use std::path::Path;
use std::pin::Pin;
use thiserror::Error;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

pub const DIRECTORY_MODE: u32 = 0o750;
pub const FILE_MODE: u32 = 0o600;

/// Hard failures, surfaced to the client as MCP errors.
#[derive(Error, Debug)]
pub enum FsError {
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
    #[error("operation cancelled")]
    Cancelled,
}

fn io_err(context: impl Into<String>) -> impl FnOnce(io::Error) -> FsError {
    let context = context.into();
    move |source| FsError::Io { context, source }
}

/// Result of a filesystem operation.
#[derive(Debug)]
pub enum Outcome {
    /// Successful payload.
    Content(String),
    /// Expected user error, e.g. a missing path.
    Message(String),
    /// I/O or system failure.
    Fail(FsError),
}

impl Outcome {
    fn message(text: impl Into<String>) -> Self {
        Self::Message(text.into())
    }

    /// Map to the MCP reply for `tool`.
    ///
    /// Messages are sent as plain text, failures as protocol errors.
    pub fn into_call_result(self, tool: &str) -> Result<CallToolResult, ErrorData> {
        match self {
            Self::Content(text) => Ok(CallToolResult::success(vec![model::Content::text(text)])),
            Self::Message(text) => {
                tracing::warn!(tool, "{text}");
                Ok(CallToolResult::success(vec![model::Content::text(text)]))
            }
            Self::Fail(err) => {
                tracing::error!(tool, error = %err, "operation failed");
                Err(ErrorData::internal_error(err.to_string(), None))
            }
        }
    }
}

impl From<FsError> for Outcome {
    fn from(err: FsError) -> Self {
        Self::Fail(err)
    }
}

/// How far `list` descends below the requested directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Depth {
    Limited(u32),
    Unbounded,
}

impl Depth {
    pub const DEFAULT: Depth = Depth::Limited(3);

    /// Interpret the tool's numeric `depth`; negative means unbounded.
    pub fn from_param(depth: Option<f64>) -> Self {
        match depth {
            None => Self::DEFAULT,
            Some(d) if d < 0.0 => Self::Unbounded,
            Some(d) => Self::Limited(d as u32),
        }
    }

    fn descend(self) -> Option<Self> {
        match self {
            Self::Limited(0) => None,
            Self::Limited(n) => Some(Self::Limited(n - 1)),
            Self::Unbounded => Some(Self::Unbounded),
        }
    }
}

/// Stat `path`, following symlinks. `Ok(None)` when it does not exist.
async fn stat(path: &Path) -> Result<Option<Metadata>, FsError> {
    match fs::metadata(path).await {
        Ok(meta) => Ok(Some(meta)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(io_err("error")(e)),
    }
}

fn not_found(path: &Path) -> Outcome {
    Outcome::message(format!("path not found at {}", path.display()))
}

const IS_DIRECTORY: &str = "path is a directory, must be a file";

fn check_cancelled(cancel: &CancellationToken) -> Result<(), FsError> {
    if cancel.is_cancelled() {
        Err(FsError::Cancelled)
    } else {
        Ok(())
    }
}

/// List the entries of a directory as an indented tree.
pub async fn list(path: &Path, depth: Depth, cancel: &CancellationToken) -> Outcome {
    match stat(path).await {
        Err(e) => return e.into(),
        Ok(None) => return not_found(path),
        Ok(Some(meta)) if !meta.is_dir() => return Outcome::message("path is not a directory"),
        Ok(Some(_)) => {}
    }

    let mut out = String::new();
    match walk(path, depth, String::new(), &mut out, cancel).await {
        Ok(()) => Outcome::Content(out),
        Err(e) => e.into(),
    }
}

fn walk<'a>(
    path: &'a Path,
    depth: Depth,
    prefix: String,
    out: &'a mut String,
    cancel: &'a CancellationToken,
) -> Pin<Box<dyn Future<Output = Result<(), FsError>> + Send + 'a>> {
    Box::pin(async move {
        check_cancelled(cancel)?;
        let context = || format!("error reading the directory {}", path.display());

        let mut entries = Vec::new();
        let mut read_dir = fs::read_dir(path).await.map_err(io_err(context()))?;
        while let Some(entry) = read_dir.next_entry().await.map_err(io_err(context()))? {
            let is_dir = entry
                .file_type()
                .await
                .map_err(io_err(context()))?
                .is_dir();
            entries.push((entry.file_name(), is_dir));
        }
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        for (name, is_dir) in entries {
            let kind = if is_dir { "directory" } else { "file" };
            out.push_str(&format!("{prefix}- {} ({kind})\n", name.to_string_lossy()));
            if let (true, Some(next)) = (is_dir, depth.descend()) {
                walk(&path.join(&name), next, format!("{prefix}  "), out, cancel).await?;
            }
        }
        Ok(())
    })
}

/// Read a whole file as UTF-8 text.
pub async fn read(path: &Path) -> Outcome {
    match stat(path).await {
        Err(e) => return e.into(),
        Ok(None) => return not_found(path),
        Ok(Some(meta)) if meta.is_dir() => return Outcome::message(IS_DIRECTORY),
        Ok(Some(_)) => {}
    }

    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) => return io_err("error reading the file")(e).into(),
    };
    match String::from_utf8(bytes) {
        Ok(text) => Outcome::Content(text),
        Err(_) => Outcome::message("file is not valid UTF-8 text (likely binary)"),
    }
}

async fn create_dir_all(dir: &Path) -> io::Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(DIRECTORY_MODE);
    builder.create(dir).await
}

/// Create or truncate a file with `content`, creating parent directories.
pub async fn write(content: &str, path: &Path) -> Outcome {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Err(e) = create_dir_all(parent).await {
            return io_err("could not create directory")(e).into();
        }
    }

    match stat(path).await {
        Err(e) => return e.into(),
        Ok(Some(meta)) if meta.is_dir() => return Outcome::message(IS_DIRECTORY),
        _ => {}
    }

    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(FILE_MODE);
    let written = async {
        let mut file = options.open(path).await?;
        file.write_all(content.as_bytes()).await?;
        file.flush().await
    };
    match written.await {
        Ok(()) => Outcome::Content("file written successfully".into()),
        Err(e) => io_err("could not write to file")(e).into(),
    }
}

/// Symbolic permission string in `ls -l` style, e.g. `-rw-------`.
///
/// Type and special bits come first, one letter each, in the order
/// `d L D p S u g c t`; a plain file gets a single `-`. A character device
/// is therefore `Dc`.
#[cfg(unix)]
fn symbolic_mode(meta: &Metadata) -> String {
    use std::os::unix::fs::{FileTypeExt, PermissionsExt};

    let ft = meta.file_type();
    let mode = meta.permissions().mode();
    let flags = [
        ('d', ft.is_dir()),
        ('L', ft.is_symlink()),
        ('D', ft.is_block_device() || ft.is_char_device()),
        ('p', ft.is_fifo()),
        ('S', ft.is_socket()),
        ('u', mode & 0o4000 != 0),
        ('g', mode & 0o2000 != 0),
        ('c', ft.is_char_device()),
        ('t', mode & 0o1000 != 0),
    ];
    let mut out: String = flags
        .iter()
        .filter(|(_, set)| *set)
        .map(|(ch, _)| *ch)
        .collect();
    if out.is_empty() {
        out.push('-');
    }
    for (i, ch) in "rwxrwxrwx".chars().enumerate() {
        out.push(if mode & (1 << (8 - i)) != 0 { ch } else { '-' });
    }
    out
}

#[cfg(not(unix))]
fn symbolic_mode(meta: &Metadata) -> String {
    if meta.permissions().readonly() {
        "-r--r--r--".into()
    } else {
        "-rw-rw-rw-".into()
    }
}

async fn sniff_file(path: &Path) -> io::Result<&'static str> {
    let file = fs::File::open(path).await?;
    let mut head = Vec::with_capacity(sniff::SNIFF_LEN);
    file.take(sniff::SNIFF_LEN as u64).read_to_end(&mut head).await?;
    Ok(sniff::detect(&head))
}

/// Describe a file: size, permissions, modification time and MIME type.
pub async fn info(path: &Path) -> Outcome {
    let meta = match stat(path).await {
        Err(e) => return e.into(),
        Ok(None) => return not_found(path),
        Ok(Some(meta)) if meta.is_dir() => return Outcome::message(IS_DIRECTORY),
        Ok(Some(meta)) => meta,
    };

    let mime = match sniff_file(path).await {
        Ok(mime) => mime,
        Err(e) => return io_err("error detecting the MIME type")(e).into(),
    };
    let modified = match meta.modified() {
        Ok(time) => chrono::DateTime::<chrono::Local>::from(time)
            .to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        Err(e) => return io_err("error reading the modification time")(e).into(),
    };

    Outcome::Content(format!(
        "File: {}\nSize: {} bytes\nPermissions: {}\nLast Modified: {}\nMIME Type: {}\n",
        path.display(),
        meta.len(),
        symbolic_mode(&meta),
        modified,
        mime,
    ))
}

fn is_bare_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains('/')
        && !name.contains(std::path::MAIN_SEPARATOR)
        && !name.contains('\0')
}

const ROOT_RENAME: &str = "the base directory cannot be renamed";

/// Rename `path` to `new_name` within the same parent directory.
///
/// The parent must resolve inside `root`, so the sandbox root itself can
/// not be renamed.
pub async fn rename(path: &Path, new_name: &str, root: &Path) -> Outcome {
    match stat(path).await {
        Err(e) => return e.into(),
        Ok(None) => return not_found(path),
        Ok(Some(_)) => {}
    }
    if !is_bare_name(new_name) {
        return Outcome::message("new name must be a bare name, not a path");
    }

    let Some(parent) = path.parent() else {
        return Outcome::message(ROOT_RENAME);
    };
    match fs::canonicalize(parent).await {
        Ok(resolved) if resolved.starts_with(root) => {}
        Ok(_) => return Outcome::message(ROOT_RENAME),
        Err(e) => return io_err("error resolving the parent directory")(e).into(),
    }

    let new_path = parent.join(new_name);
    match fs::symlink_metadata(&new_path).await {
        Ok(_) => {
            return Outcome::message(format!(
                "target path {} already exists",
                new_path.display()
            ));
        }
        Err(e) if e.kind() != io::ErrorKind::NotFound => {
            return io_err("error checking the target path")(e).into();
        }
        Err(_) => {}
    }

    match fs::rename(path, &new_path).await {
        Ok(()) => Outcome::Content(new_path.display().to_string()),
        Err(e) => io_err("could not rename path")(e).into(),
    }
}

/// Copy a file, or a directory tree, from `src` to `dst`.
pub async fn copy(src: &Path, dst: &Path, cancel: &CancellationToken) -> Outcome {
    let meta = match stat(src).await {
        Err(e) => return e.into(),
        Ok(None) => return not_found(src),
        Ok(Some(meta)) => meta,
    };

    if !meta.is_dir() {
        return match copy_file(src, dst).await {
            Ok(()) => Outcome::Content("File copied to destination".into()),
            Err(e) => e.into(),
        };
    }

    if dst.starts_with(src) {
        return Outcome::message("destination is inside the source directory");
    }
    if let Some(parent) = dst.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Err(e) = create_dir_all(parent).await {
            return io_err("could not create directory")(e).into();
        }
    }
    match copy_dir(src, dst, cancel).await {
        Ok(()) => Outcome::Content(String::new()),
        Err(e) => e.into(),
    }
}

async fn copy_file(src: &Path, dst: &Path) -> Result<(), FsError> {
    let context = || format!("could not copy {} to {}", src.display(), dst.display());
    let mut source = fs::File::open(src).await.map_err(io_err(context()))?;
    let mut dest = fs::File::create(dst).await.map_err(io_err(context()))?;
    tokio::io::copy(&mut source, &mut dest)
        .await
        .map_err(io_err(context()))?;
    dest.sync_all().await.map_err(io_err(context()))
}

/// Recreate the link itself; its target is never read.
#[cfg(unix)]
async fn copy_link(src: &Path, dst: &Path) -> Result<(), FsError> {
    let context = || format!("could not copy link {} to {}", src.display(), dst.display());
    let target = fs::read_link(src).await.map_err(io_err(context()))?;
    fs::symlink(&target, dst).await.map_err(io_err(context()))
}

#[cfg(not(unix))]
async fn copy_link(src: &Path, _dst: &Path) -> Result<(), FsError> {
    tracing::warn!(path = %src.display(), "skipping symlink");
    Ok(())
}

fn copy_dir<'a>(
    src: &'a Path,
    dst: &'a Path,
    cancel: &'a CancellationToken,
) -> Pin<Box<dyn Future<Output = Result<(), FsError>> + Send + 'a>> {
    Box::pin(async move {
        check_cancelled(cancel)?;
        let meta = fs::metadata(src)
            .await
            .map_err(io_err(format!("error reading {}", src.display())))?;

        let mut builder = fs::DirBuilder::new();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            builder.mode(meta.permissions().mode());
        }
        #[cfg(not(unix))]
        let _ = meta;
        builder
            .create(dst)
            .await
            .map_err(io_err(format!("could not create directory {}", dst.display())))?;

        let context = || format!("error reading the directory {}", src.display());
        let mut read_dir = fs::read_dir(src).await.map_err(io_err(context()))?;
        while let Some(entry) = read_dir.next_entry().await.map_err(io_err(context()))? {
            let from = entry.path();
            let to = dst.join(entry.file_name());
            let file_type = entry.file_type().await.map_err(io_err(context()))?;
            if file_type.is_dir() {
                copy_dir(&from, &to, cancel).await?;
            } else if file_type.is_symlink() {
                copy_link(&from, &to).await?;
            } else {
                copy_file(&from, &to).await?;
            }
        }
        Ok(())
    })
}
