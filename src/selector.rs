use std::borrow::Cow;
use std::ffi::{OsStr, OsString};
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Extension recognized as a model artifact (compared case-insensitively)
pub const ARTIFACT_EXTENSION: &str = ".gguf";

/// A single resolved model artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelLocation {
    pub directory: PathBuf,
    /// Kept as the OS reported it so non-UTF-8 names still open
    pub filename: OsString,
}

impl ModelLocation {
    pub fn path(&self) -> PathBuf {
        self.directory.join(&self.filename)
    }

    /// File name for classification and log lines
    pub fn display_name(&self) -> Cow<'_, str> {
        self.filename.to_string_lossy()
    }
}

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("path does not exist: {}", .0.display())]
    NotFound(PathBuf),

    #[error("no artifact in directory: {} (expected *.gguf)", .0.display())]
    NoArtifact(PathBuf),

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Resolve a user-supplied path to one model artifact.
///
/// Directories resolve to their largest `.gguf` entry; equal sizes are broken
/// by the lexicographically smallest filename so the choice never depends on
/// directory listing order. Any other path must exist and is split into its
/// parent directory and file name.
pub fn resolve(path: &Path) -> Result<ModelLocation, ResolveError> {
    if path.is_dir() {
        return pick_largest_artifact(path);
    }

    if !path.exists() {
        return Err(ResolveError::NotFound(path.to_path_buf()));
    }

    let filename = path
        .file_name()
        .map(OsStr::to_os_string)
        .ok_or_else(|| ResolveError::NotFound(path.to_path_buf()))?;

    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    Ok(ModelLocation {
        directory,
        filename,
    })
}

fn pick_largest_artifact(directory: &Path) -> Result<ModelLocation, ResolveError> {
    let io_error = |source| ResolveError::Io {
        path: directory.to_path_buf(),
        source,
    };

    let mut best: Option<(u64, OsString)> = None;

    for entry in fs::read_dir(directory).map_err(io_error)? {
        let entry = entry.map_err(io_error)?;
        let filename = entry.file_name();

        if !is_artifact_name(&filename) {
            continue;
        }

        let metadata = fs::metadata(entry.path()).map_err(io_error)?;
        if !metadata.is_file() {
            continue;
        }

        let size = metadata.len();
        let replace = match &best {
            None => true,
            Some((best_size, best_name)) => {
                size > *best_size || (size == *best_size && filename < *best_name)
            }
        };

        if replace {
            best = Some((size, filename));
        }
    }

    let (_, filename) = best.ok_or_else(|| ResolveError::NoArtifact(directory.to_path_buf()))?;

    Ok(ModelLocation {
        directory: directory.to_path_buf(),
        filename,
    })
}

fn is_artifact_name(filename: &OsStr) -> bool {
    let name = filename.as_encoded_bytes();
    let suffix = ARTIFACT_EXTENSION.as_bytes();

    name.len() >= suffix.len() && name[name.len() - suffix.len()..].eq_ignore_ascii_case(suffix)
}
