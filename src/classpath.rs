//! Classpath resolution: turning a qualified class name into class bytes.
//!
//! A classpath string is a host-separator list of entries. Each element is
//! either a directory, an archive (`.jar`/`.zip`) or, when the list has more
//! than one element, a composite that tries its members in order.
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ClassPathError {
    #[error("classpath entry does not exist: {0}")]
    MissingEntry(PathBuf),
    #[error("classpath entry is not a directory: {0}")]
    NotADirectory(PathBuf),
    #[error("archive classpath entries are not supported yet: {0}")]
    UnsupportedEntry(PathBuf),
    #[error("class {0} not found on the classpath")]
    ClassNotFound(String),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// One resolvable element of the classpath.
#[derive(Debug)]
pub enum ClassPathEntry {
    Directory(PathBuf),
    Archive(PathBuf),
    Composite(Vec<ClassPathEntry>),
}

impl ClassPathEntry {
    /// Classifies and validates a classpath string.
    pub fn new(classpath: &str) -> Result<Self, ClassPathError> {
        let elements: Vec<PathBuf> = env::split_paths(classpath).collect();
        if elements.len() > 1 {
            let entries = elements
                .iter()
                .map(|element| Self::single(element))
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(Self::Composite(entries));
        }
        Self::single(Path::new(classpath))
    }

    fn single(path: &Path) -> Result<Self, ClassPathError> {
        if !path.exists() {
            return Err(ClassPathError::MissingEntry(path.to_path_buf()));
        }
        let name = path.to_string_lossy();
        if name.ends_with(".jar") || name.ends_with(".zip") {
            return Ok(Self::Archive(path.to_path_buf()));
        }
        if !path.is_dir() {
            return Err(ClassPathError::NotADirectory(path.to_path_buf()));
        }
        Ok(Self::Directory(path.to_path_buf()))
    }

    /// Reads the class file bytes for a qualified name such as
    /// `java/lang/Object`.
    pub fn read_class(&self, qualified_name: &str) -> Result<Vec<u8>, ClassPathError> {
        match self {
            Self::Directory(dir) => {
                let path = dir.join(format!("{qualified_name}.class"));
                debug!(path = %path.display(), "reading class file");
                fs::read(&path).map_err(|source| match source.kind() {
                    std::io::ErrorKind::NotFound => {
                        ClassPathError::ClassNotFound(qualified_name.to_string())
                    }
                    _ => ClassPathError::Io { path, source },
                })
            }
            Self::Archive(path) => Err(ClassPathError::UnsupportedEntry(path.clone())),
            Self::Composite(entries) => {
                for entry in entries {
                    if let Ok(bytes) = entry.read_class(qualified_name) {
                        return Ok(bytes);
                    }
                }
                Err(ClassPathError::ClassNotFound(qualified_name.to_string()))
            }
        }
    }
}

/// Default install location for the bootstrap classpath: `JAVA_HOME`,
/// falling back to `JRE_HOME`.
pub fn java_home() -> Option<PathBuf> {
    env::var_os("JAVA_HOME")
        .filter(|value| !value.is_empty())
        .or_else(|| env::var_os("JRE_HOME").filter(|value| !value.is_empty()))
        .map(PathBuf::from)
}
