//! Boot file source resolution.
//!
//! A boot document can come from raw bytes, from a read-only filesystem compiled
//! into the binary, or from the local disk. The first source yielding non-empty
//! bytes wins, in that priority order.

use sha2::{Digest, Sha256};
use std::borrow::Cow;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Default boot file name, resolved against the working directory.
pub const DEFAULT_BOOT_FILE: &str = "boot.yaml";

/// Read-only filesystem compiled into the binary.
pub trait EmbeddedFs: Send + Sync {
    /// Return the file content at `path`, or `None` when the file is not embedded.
    fn read(&self, path: &Path) -> Option<Cow<'static, [u8]>>;
}

/// `EmbeddedFs` over a static table, usually filled with `include_bytes!`.
///
/// ```rust,ignore
/// static BOOT: StaticFs = StaticFs::new(&[("boot.yaml", include_bytes!("../boot.yaml"))]);
/// ```
#[derive(Clone, Copy)]
pub struct StaticFs {
    files: &'static [(&'static str, &'static [u8])],
}

impl StaticFs {
    pub const fn new(files: &'static [(&'static str, &'static [u8])]) -> Self {
        Self { files }
    }
}

impl EmbeddedFs for StaticFs {
    fn read(&self, path: &Path) -> Option<Cow<'static, [u8]>> {
        self.files
            .iter()
            .find(|(name, _)| Path::new(name) == path)
            .map(|(_, bytes)| Cow::Borrowed(*bytes))
    }
}

/// Where a resolved boot document came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigOrigin {
    Raw,
    Embedded(PathBuf),
    File(PathBuf),
}

impl fmt::Display for ConfigOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigOrigin::Raw => write!(f, "raw bytes"),
            ConfigOrigin::Embedded(p) => write!(f, "embedded:{}", p.display()),
            ConfigOrigin::File(p) => write!(f, "file:{}", p.display()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigSourceError {
    #[error("boot config not found at {0}")]
    NotFound(PathBuf),
    #[error("failed to read boot config {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("boot config from {0} is empty")]
    Empty(ConfigOrigin),
    #[error("failed to resolve working directory")]
    WorkingDir(#[source] std::io::Error),
    #[error("failed to materialize raw boot config at {path}")]
    Materialize {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Candidate sources of the boot document.
#[derive(Clone, Default)]
pub struct BootConfigSource {
    /// Raw document bytes supplied by the caller.
    pub raw: Option<Vec<u8>>,
    /// Embedded filesystem plus path inside it.
    pub embedded: Option<(Arc<dyn EmbeddedFs>, PathBuf)>,
    /// Local path; `boot.yaml` when unset.
    pub path: Option<PathBuf>,
}

impl fmt::Debug for BootConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BootConfigSource")
            .field("raw_len", &self.raw.as_ref().map(Vec::len))
            .field("embedded", &self.embedded.as_ref().map(|(_, p)| p))
            .field("path", &self.path)
            .finish()
    }
}

/// A resolved boot document.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub raw: Vec<u8>,
    pub origin: ConfigOrigin,
    /// On-disk location of the document; raw bytes are materialized into a temp file.
    pub path: PathBuf,
    /// Directory used to resolve relative paths inside the document (log files etc.).
    pub dir: PathBuf,
}

impl BootConfigSource {
    pub fn raw(raw: impl Into<Vec<u8>>) -> Self {
        Self {
            raw: Some(raw.into()),
            ..Default::default()
        }
    }

    pub fn embedded(fs: Arc<dyn EmbeddedFs>, path: impl Into<PathBuf>) -> Self {
        Self {
            embedded: Some((fs, path.into())),
            ..Default::default()
        }
    }

    pub fn path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Default::default()
        }
    }

    /// Resolve in priority order: raw bytes → embedded filesystem → local file.
    pub fn resolve(&self) -> Result<LoadedConfig, ConfigSourceError> {
        if let Some(raw) = self.raw.as_ref().filter(|r| !r.is_empty()) {
            let path = materialize_raw(raw)?;
            let dir = path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(std::env::temp_dir);
            tracing::debug!(path = %path.display(), "Boot config resolved from raw bytes");
            return Ok(LoadedConfig {
                raw: raw.clone(),
                origin: ConfigOrigin::Raw,
                path,
                dir,
            });
        }

        if let Some((fs, path)) = &self.embedded {
            if let Some(bytes) = fs.read(path).filter(|b| !b.is_empty()) {
                let cwd = std::env::current_dir().map_err(ConfigSourceError::WorkingDir)?;
                tracing::debug!(path = %path.display(), "Boot config resolved from embedded fs");
                return Ok(LoadedConfig {
                    raw: bytes.into_owned(),
                    origin: ConfigOrigin::Embedded(path.clone()),
                    path: path.clone(),
                    dir: cwd,
                });
            }
        }

        let path = self
            .path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_BOOT_FILE));
        read_local(&path)
    }
}

fn read_local(path: &Path) -> Result<LoadedConfig, ConfigSourceError> {
    let abs = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map_err(ConfigSourceError::WorkingDir)?
            .join(path)
    };

    let raw = std::fs::read(&abs).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ConfigSourceError::NotFound(abs.clone()),
        _ => ConfigSourceError::Read {
            path: abs.clone(),
            source: e,
        },
    })?;

    if raw.is_empty() {
        return Err(ConfigSourceError::Empty(ConfigOrigin::File(abs)));
    }

    let dir = abs
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    tracing::debug!(path = %abs.display(), "Boot config resolved from local file");

    Ok(LoadedConfig {
        raw,
        origin: ConfigOrigin::File(abs.clone()),
        path: abs,
        dir,
    })
}

/// Write raw bytes to `<tmp>/rkboot/boot-<digest>.yaml`.
///
/// The name is derived from the content, so identical documents map to the same file
/// and an existing file with matching content is left untouched. New content is written
/// to a sibling temp file and renamed into place, so readers never see a partial file.
pub fn materialize_raw(raw: &[u8]) -> Result<PathBuf, ConfigSourceError> {
    let dir = std::env::temp_dir().join("rkboot");
    let digest = hex::encode(Sha256::digest(raw));
    let path = dir.join(format!("boot-{}.yaml", &digest[..16]));

    let materialize_err = |source| ConfigSourceError::Materialize {
        path: path.clone(),
        source,
    };

    if let Ok(existing) = std::fs::read(&path) {
        if existing == raw {
            return Ok(path);
        }
    }

    std::fs::create_dir_all(&dir).map_err(materialize_err)?;
    let mut staged = tempfile::NamedTempFile::new_in(&dir).map_err(materialize_err)?;
    staged.write_all(raw).map_err(materialize_err)?;
    staged
        .persist(&path)
        .map_err(|e| materialize_err(e.error))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    static EMBEDDED: StaticFs = StaticFs::new(&[
        ("testdata/boot.yaml", b"myEntry:\n  name: embedded\n"),
        ("testdata/empty.yaml", b""),
    ]);

    #[test]
    fn raw_bytes_take_priority() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("boot.yaml");
        fs::write(&file, "from: file\n").unwrap();

        let source = BootConfigSource {
            raw: Some(b"from: raw\n".to_vec()),
            embedded: Some((Arc::new(EMBEDDED), PathBuf::from("testdata/boot.yaml"))),
            path: Some(file),
        };

        let loaded = source.resolve().unwrap();
        assert_eq!(loaded.origin, ConfigOrigin::Raw);
        assert_eq!(loaded.raw, b"from: raw\n");
        assert!(loaded.path.exists());
    }

    #[test]
    fn empty_raw_falls_through_to_embedded() {
        let source = BootConfigSource {
            raw: Some(Vec::new()),
            embedded: Some((Arc::new(EMBEDDED), PathBuf::from("testdata/boot.yaml"))),
            path: None,
        };

        let loaded = source.resolve().unwrap();
        assert_eq!(
            loaded.origin,
            ConfigOrigin::Embedded(PathBuf::from("testdata/boot.yaml"))
        );
        assert_eq!(loaded.raw, b"myEntry:\n  name: embedded\n");
    }

    #[test]
    fn empty_embedded_falls_through_to_file() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("custom.yaml");
        fs::write(&file, "from: file\n").unwrap();

        let source = BootConfigSource {
            raw: None,
            embedded: Some((Arc::new(EMBEDDED), PathBuf::from("testdata/empty.yaml"))),
            path: Some(file.clone()),
        };

        let loaded = source.resolve().unwrap();
        assert_eq!(loaded.origin, ConfigOrigin::File(file.clone()));
        assert_eq!(loaded.dir, dir.path());
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempdir().unwrap();
        let source = BootConfigSource::path(dir.path().join("nope.yaml"));

        match source.resolve() {
            Err(ConfigSourceError::NotFound(p)) => assert!(p.ends_with("nope.yaml")),
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn empty_file_is_an_error() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("boot.yaml");
        fs::write(&file, "").unwrap();

        let err = BootConfigSource::path(&file).resolve().unwrap_err();
        assert!(matches!(err, ConfigSourceError::Empty(ConfigOrigin::File(_))));
    }

    #[test]
    fn materialized_raw_file_is_stable() {
        let raw = b"---\nmyEntry:\n  name: stable\n  enabled: true\n";

        let first = BootConfigSource::raw(raw.to_vec()).resolve().unwrap();
        let second = BootConfigSource::raw(raw.to_vec()).resolve().unwrap();

        assert_eq!(first.path, second.path);
        assert_eq!(fs::read(&first.path).unwrap(), fs::read(&second.path).unwrap());
        assert_eq!(fs::read(&second.path).unwrap(), raw);
    }

    #[test]
    fn different_raw_documents_do_not_collide() {
        let a = materialize_raw(b"a: 1\n").unwrap();
        let b = materialize_raw(b"a: 2\n").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn concurrent_materialization_never_exposes_partial_content() {
        let raw: Vec<u8> = format!("big: \"{}\"\n", "x".repeat(256 * 1024)).into_bytes();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let raw = raw.clone();
                std::thread::spawn(move || {
                    let path = materialize_raw(&raw).unwrap();
                    assert_eq!(fs::read(&path).unwrap(), raw);
                    path
                })
            })
            .collect();

        let paths: Vec<PathBuf> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(paths.windows(2).all(|w| w[0] == w[1]));
    }
}
