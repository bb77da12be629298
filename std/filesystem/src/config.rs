//! Startup configuration for the filesystem server.
//!
//! The sandbox is resolved once from the command line (and the container
//! mode switch) and never changes afterwards.

use crate::validate::normalize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Errors raised while resolving the startup configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Neither `--dir` nor a container volume named a base directory.
    #[error("a base directory is required: pass --dir <path>")]
    MissingBaseDir,
    /// Container mode was requested without `--volume`.
    #[error("container mode requires --volume <hostPath:containerPath>")]
    MissingVolume,
    /// The volume mapping could not be parsed.
    #[error("invalid volume format {0:?}: use hostPath:containerPath with absolute paths")]
    InvalidVolume(String),
    /// The base directory does not exist.
    #[error("base path not found: {}", .0.display())]
    BaseNotFound(PathBuf),
    /// The base path exists but is not a directory.
    #[error("base path is not a directory: {}", .0.display())]
    BaseNotDirectory(PathBuf),
    /// The base path could not be inspected.
    #[error("error reading the base path {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Transport the server speaks MCP over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Transport {
    /// JSON-RPC over stdin/stdout.
    #[default]
    Stdio,
    /// Streamable HTTP with server-sent events.
    Http,
}

/// A `hostPath:containerPath` volume mount.
///
/// Clients address files by `host`; the process reads and writes under
/// `container`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeMapping {
    pub host: PathBuf,
    pub container: PathBuf,
}

impl FromStr for VolumeMapping {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidVolume(s.to_string());
        let parts: Vec<&str> = s.split(':').collect();
        let [host, container] = parts.as_slice() else {
            return Err(invalid());
        };
        let (host, container) = (Path::new(host), Path::new(container));
        if !host.is_absolute() || !container.is_absolute() {
            return Err(invalid());
        }
        Ok(Self {
            host: normalize(host).map_err(|_| invalid())?,
            container: normalize(container).map_err(|_| invalid())?,
        })
    }
}

/// Immutable sandbox settings shared by every request.
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Absolute, lexically normalized base directory.
    pub base_dir: PathBuf,
    /// `base_dir` with symlinks resolved.
    pub resolved_base: PathBuf,
    /// Present iff the server runs in container mode.
    pub volume: Option<VolumeMapping>,
}

impl SandboxConfig {
    /// Resolve the effective sandbox from the startup options.
    ///
    /// In container mode the container side of `volume` becomes the base
    /// directory and `dir` is ignored. The base must exist and be a
    /// directory.
    pub fn resolve(
        dir: Option<PathBuf>,
        container_mode: bool,
        volume: Option<&str>,
    ) -> Result<Self, ConfigError> {
        let (base, volume) = if container_mode {
            let mapping: VolumeMapping = volume.ok_or(ConfigError::MissingVolume)?.parse()?;
            (mapping.container.clone(), Some(mapping))
        } else {
            if volume.is_some() {
                tracing::warn!("--volume is ignored unless container mode is enabled");
            }
            (dir.ok_or(ConfigError::MissingBaseDir)?, None)
        };

        let base_dir = normalize(&base).map_err(|source| ConfigError::Io {
            path: base.clone(),
            source,
        })?;
        let meta = match std::fs::metadata(&base_dir) {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConfigError::BaseNotFound(base_dir));
            }
            Err(source) => return Err(ConfigError::Io { path: base_dir, source }),
        };
        if !meta.is_dir() {
            return Err(ConfigError::BaseNotDirectory(base_dir));
        }
        let resolved_base = base_dir.canonicalize().map_err(|source| ConfigError::Io {
            path: base_dir.clone(),
            source,
        })?;

        Ok(Self {
            base_dir,
            resolved_base,
            volume,
        })
    }

    /// Whether host paths are rewritten through a volume mapping.
    pub fn container_mode(&self) -> bool {
        self.volume.is_some()
    }
}

#[cfg(test)]
mod tests {
    use crate::config::{ConfigError, SandboxConfig, VolumeMapping};
    use std::path::PathBuf;

    #[test]
    fn parses_volume_mapping() {
        let mapping: VolumeMapping = "/host/data:/data".parse().unwrap();
        assert_eq!(mapping.host, PathBuf::from("/host/data"));
        assert_eq!(mapping.container, PathBuf::from("/data"));
    }

    #[test]
    fn volume_mapping_is_normalized() {
        let mapping: VolumeMapping = "/host/./data/:/srv/../data".parse().unwrap();
        assert_eq!(mapping.host, PathBuf::from("/host/data"));
        assert_eq!(mapping.container, PathBuf::from("/data"));
    }

    #[test]
    fn rejects_malformed_volumes() {
        for bad in ["/only-one-side", "/a:/b:/c", "relative:/data", "/host:", ":/data", ""] {
            let result = bad.parse::<VolumeMapping>();
            assert!(
                matches!(result, Err(ConfigError::InvalidVolume(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn resolves_plain_base_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let config = SandboxConfig::resolve(Some(tmp.path().to_path_buf()), false, None).unwrap();
        assert_eq!(config.base_dir, tmp.path());
        assert_eq!(config.resolved_base, tmp.path().canonicalize().unwrap());
        assert!(!config.container_mode());
    }

    #[test]
    fn volume_ignored_outside_container_mode() {
        let tmp = tempfile::tempdir().unwrap();
        let config =
            SandboxConfig::resolve(Some(tmp.path().to_path_buf()), false, Some("/a:/b")).unwrap();
        assert!(config.volume.is_none());
    }

    #[test]
    fn container_mode_uses_container_side() {
        let tmp = tempfile::tempdir().unwrap();
        let volume = format!("/host/data:{}", tmp.path().display());
        let config = SandboxConfig::resolve(None, true, Some(&volume)).unwrap();
        assert_eq!(config.base_dir, tmp.path());
        assert!(config.container_mode());
        assert_eq!(config.volume.unwrap().host, PathBuf::from("/host/data"));
    }

    #[test]
    fn container_mode_requires_volume() {
        let tmp = tempfile::tempdir().unwrap();
        let result = SandboxConfig::resolve(Some(tmp.path().to_path_buf()), true, None);
        assert!(matches!(result, Err(ConfigError::MissingVolume)));
    }

    #[test]
    fn missing_dir_is_an_error() {
        let result = SandboxConfig::resolve(None, false, None);
        assert!(matches!(result, Err(ConfigError::MissingBaseDir)));
    }

    #[test]
    fn nonexistent_base_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = tmp.path().join("nope");
        let result = SandboxConfig::resolve(Some(missing), false, None);
        assert!(matches!(result, Err(ConfigError::BaseNotFound(_))));
    }

    #[test]
    fn file_base_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("f.txt");
        std::fs::write(&file, "x").unwrap();
        let result = SandboxConfig::resolve(Some(file), false, None);
        assert!(matches!(result, Err(ConfigError::BaseNotDirectory(_))));
    }
}
