//! Path policy for the filesystem MCP server.
//!
//! Every request path passes through [`PathPolicy::admit`] before an
//! operation runs. Containment is decided twice: lexically with
//! [`is_safe`] / [`rewrite_host_to_container`], then again after resolving
//! symlinks on the part of the path that already exists.

use crate::config::{SandboxConfig, VolumeMapping};
use std::path::{Component, Path, PathBuf};

/// Reply sent when a sandbox-mode request leaves the base directory.
pub const SANDBOX_DENIED: &str = "access denied: path is outside of allowed base directory";

/// Reply sent when a container-mode request is not under the host volume.
pub const CONTAINER_DENIED: &str = "PATH NOT ALLOWED: path is outside of allowed directory";

/// Collapse `.` and `..` without touching the filesystem.
///
/// `..` at the root stays at the root. Relative paths stay relative.
pub fn clean(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir | Component::Normal(_) => {
                out.push(component)
            }
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => out.push(component),
            },
        }
    }
    out
}

/// Absolute, lexically cleaned form of `path`.
///
/// Relative paths are resolved against the current working directory.
pub fn normalize(path: &Path) -> std::io::Result<PathBuf> {
    if path.is_absolute() {
        Ok(clean(path))
    } else {
        Ok(clean(&std::env::current_dir()?.join(path)))
    }
}

/// Whether `target` lies within `base` after normalization.
///
/// The prefix test is per component, so `/tmp/s` does not contain
/// `/tmp/sx`. Targets do not need to exist.
pub fn is_safe(base: &Path, target: &Path) -> bool {
    match (normalize(base), normalize(target)) {
        (Ok(base), Ok(target)) => target.starts_with(base),
        _ => false,
    }
}

/// Map a client-visible host path to the path inside the container.
///
/// Returns `None` unless the cleaned path is absolute and starts with the
/// mapping's host side.
pub fn rewrite_host_to_container(host_path: &Path, mapping: &VolumeMapping) -> Option<PathBuf> {
    if !host_path.is_absolute() {
        return None;
    }
    let cleaned = clean(host_path);
    let rest = cleaned.strip_prefix(&mapping.host).ok()?;
    Some(mapping.container.join(rest))
}

/// Whether `path` stays within `resolved_base` once symlinks are followed.
///
/// The deepest existing ancestor is canonicalized and the missing tail is
/// appended unchanged. `path` must already be normalized.
pub async fn resolves_within(resolved_base: &Path, path: &Path) -> bool {
    let mut existing = path;
    let mut tail = Vec::new();
    loop {
        match tokio::fs::canonicalize(existing).await {
            Ok(mut resolved) => {
                resolved.extend(tail.iter().rev());
                return resolved.starts_with(resolved_base);
            }
            // dangling symlink
            Err(_) if tokio::fs::symlink_metadata(existing).await.is_ok() => return false,
            Err(_) => match (existing.parent(), existing.file_name()) {
                (Some(parent), Some(name)) => {
                    tail.push(name.to_os_string());
                    existing = parent;
                }
                _ => return false,
            },
        }
    }
}

/// Outcome of checking one request path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// The operation may run against this path.
    Allowed(PathBuf),
    /// The request is refused; the text is sent back as-is.
    Denied(&'static str),
}

/// Per-request path check, chosen once at startup.
#[derive(Debug, Clone)]
pub enum PathPolicy {
    /// Paths must stay within `base`.
    Sandbox { base: PathBuf, resolved_base: PathBuf },
    /// Paths are host paths rewritten through `mapping`.
    Container {
        mapping: VolumeMapping,
        resolved_base: PathBuf,
    },
}

impl PathPolicy {
    /// Pick the policy variant matching the sandbox configuration.
    pub fn from_config(config: &SandboxConfig) -> Self {
        match &config.volume {
            Some(mapping) => Self::Container {
                mapping: mapping.clone(),
                resolved_base: config.resolved_base.clone(),
            },
            None => Self::Sandbox {
                base: config.base_dir.clone(),
                resolved_base: config.resolved_base.clone(),
            },
        }
    }

    /// Decide whether `raw` may be used and what path the operation gets.
    pub async fn admit(&self, raw: &str) -> Admission {
        if raw.contains('\0') {
            return Admission::Denied(self.denial());
        }
        let raw = Path::new(raw);
        let candidate = match self {
            Self::Sandbox { base, .. } => {
                if !is_safe(base, raw) {
                    return Admission::Denied(SANDBOX_DENIED);
                }
                normalize(raw).ok()
            }
            Self::Container { mapping, .. } => rewrite_host_to_container(raw, mapping),
        };
        match candidate {
            Some(path) if resolves_within(self.resolved_base(), &path).await => {
                Admission::Allowed(path)
            }
            _ => Admission::Denied(self.denial()),
        }
    }

    fn resolved_base(&self) -> &Path {
        match self {
            Self::Sandbox { resolved_base, .. } | Self::Container { resolved_base, .. } => {
                resolved_base
            }
        }
    }

    fn denial(&self) -> &'static str {
        match self {
            Self::Sandbox { .. } => SANDBOX_DENIED,
            Self::Container { .. } => CONTAINER_DENIED,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::config::VolumeMapping;
    use crate::validate::{
        Admission, CONTAINER_DENIED, PathPolicy, SANDBOX_DENIED, clean, is_safe,
        rewrite_host_to_container,
    };
    use std::fs;
    use std::path::{Path, PathBuf};

    fn mapping() -> VolumeMapping {
        VolumeMapping {
            host: "/host/data".into(),
            container: "/data".into(),
        }
    }

    fn sandbox(root: &Path) -> PathPolicy {
        PathPolicy::Sandbox {
            base: root.to_path_buf(),
            resolved_base: root.canonicalize().unwrap(),
        }
    }

    #[test]
    fn clean_collapses_dots() {
        assert_eq!(clean(Path::new("/a/./b/../c")), PathBuf::from("/a/c"));
        assert_eq!(clean(Path::new("/../../etc")), PathBuf::from("/etc"));
        assert_eq!(clean(Path::new("a/../../b")), PathBuf::from("../b"));
        assert_eq!(clean(Path::new("../../b")), PathBuf::from("../../b"));
    }

    #[test]
    fn allows_paths_within_base() {
        let base = tempfile::tempdir().unwrap();
        let sub = base.path().join("safe-subdir");
        fs::create_dir(&sub).unwrap();
        fs::write(sub.join("file.txt"), "").unwrap();

        assert!(is_safe(base.path(), &sub.join("file.txt")));
        assert!(is_safe(base.path(), &sub));
        assert!(is_safe(base.path(), base.path()));
        assert!(is_safe(&sub, &sub.join("..").join("safe-subdir").join("file.txt")));
    }

    #[test]
    fn nonexistent_targets_are_still_safe() {
        let base = tempfile::tempdir().unwrap();
        assert!(is_safe(base.path(), &base.path().join("nonexistent/file.txt")));
    }

    #[test]
    fn rejects_paths_outside_base() {
        let base = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        assert!(!is_safe(base.path(), &outside.path().join("file.txt")));
        assert!(!is_safe(base.path(), &base.path().join("../escape")));
    }

    #[test]
    fn prefix_check_respects_component_boundaries() {
        assert!(!is_safe(Path::new("/tmp/s"), Path::new("/tmp/sx/file")));
        assert!(is_safe(Path::new("/tmp/s"), Path::new("/tmp/s/x/../file")));
    }

    #[test]
    fn rewrites_host_paths() {
        assert_eq!(
            rewrite_host_to_container(Path::new("/host/data/f"), &mapping()),
            Some(PathBuf::from("/data/f"))
        );
        assert_eq!(
            rewrite_host_to_container(Path::new("/host/data"), &mapping()),
            Some(PathBuf::from("/data"))
        );
        assert_eq!(
            rewrite_host_to_container(Path::new("/host/data/a/./b/../c"), &mapping()),
            Some(PathBuf::from("/data/a/c"))
        );
    }

    #[test]
    fn rejects_paths_outside_volume() {
        assert_eq!(rewrite_host_to_container(Path::new("/elsewhere/f"), &mapping()), None);
        assert_eq!(rewrite_host_to_container(Path::new("/host/database"), &mapping()), None);
        assert_eq!(rewrite_host_to_container(Path::new("/host/data/../x"), &mapping()), None);
        assert_eq!(rewrite_host_to_container(Path::new("host/data/f"), &mapping()), None);
    }

    #[tokio::test]
    async fn sandbox_admits_and_normalizes() {
        let base = tempfile::tempdir().unwrap();
        let policy = sandbox(base.path());
        let raw = format!("{}/a/../b.txt", base.path().display());
        assert_eq!(
            policy.admit(&raw).await,
            Admission::Allowed(base.path().join("b.txt"))
        );
    }

    #[tokio::test]
    async fn sandbox_denies_traversal() {
        let base = tempfile::tempdir().unwrap();
        let policy = sandbox(base.path());
        let raw = format!("{}/../etc/passwd", base.path().display());
        assert_eq!(policy.admit(&raw).await, Admission::Denied(SANDBOX_DENIED));
        assert_eq!(policy.admit("/etc/passwd").await, Admission::Denied(SANDBOX_DENIED));
    }

    #[tokio::test]
    async fn sandbox_denies_null_bytes() {
        let base = tempfile::tempdir().unwrap();
        let policy = sandbox(base.path());
        let raw = format!("{}/a\0b", base.path().display());
        assert_eq!(policy.admit(&raw).await, Admission::Denied(SANDBOX_DENIED));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn sandbox_denies_symlink_escape() {
        let base = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(outside.path(), base.path().join("link")).unwrap();
        let policy = sandbox(base.path());

        let raw = format!("{}/link/secret.txt", base.path().display());
        assert_eq!(policy.admit(&raw).await, Admission::Denied(SANDBOX_DENIED));
    }

    #[tokio::test]
    async fn container_rewrites_into_volume() {
        let container = tempfile::tempdir().unwrap();
        let policy = PathPolicy::Container {
            mapping: VolumeMapping {
                host: "/host/data".into(),
                container: container.path().to_path_buf(),
            },
            resolved_base: container.path().canonicalize().unwrap(),
        };
        assert_eq!(
            policy.admit("/host/data/f").await,
            Admission::Allowed(container.path().join("f"))
        );
        assert_eq!(
            policy.admit("/elsewhere/f").await,
            Admission::Denied(CONTAINER_DENIED)
        );
    }
}
