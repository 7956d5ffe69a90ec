//! # Input Validation: Storage Paths
//!
//! Checks applied to the relative paths that make up a canonical archive
//! location (`<package_id>/<version>.<ext>`) before they are joined onto the
//! storage root.

use crate::validation::error::ValidationError;
use crate::validation::limits::MAX_PATH_DEPTH;
use crate::validation::result::ValidationResult;
use std::path::{Component, Path, PathBuf};

/// Validate that a relative path stays inside the directory it is joined to.
///
/// Rejects absolute paths, parent-directory components, null bytes, control
/// characters and paths deeper than [`MAX_PATH_DEPTH`].
///
/// ```
/// # use nuget_server::validation::validate_safe_path;
/// assert!(validate_safe_path("NuGetTest/0.0.1.nupkg").is_ok());
/// assert!(validate_safe_path("../../etc/passwd").is_err());
/// assert!(validate_safe_path("/etc/passwd").is_err());
/// ```
pub fn validate_safe_path<P: AsRef<Path>>(path: P) -> ValidationResult<PathBuf> {
    let path = path.as_ref();
    let path_str = path.to_string_lossy();

    if path_str.contains('\0') {
        return Err(ValidationError::NullBytes);
    }

    if path_str.chars().any(char::is_control) {
        return Err(ValidationError::ControlCharacters);
    }

    if path.is_absolute() || path_str.starts_with('\\') {
        return Err(ValidationError::AbsolutePath {
            path: path_str.to_string(),
        });
    }

    let mut depth = 0;
    for component in path.components() {
        match component {
            Component::Normal(_) => depth += 1,
            Component::CurDir => {}
            Component::ParentDir => {
                return Err(ValidationError::PathTraversal {
                    path: path_str.to_string(),
                })
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(ValidationError::AbsolutePath {
                    path: path_str.to_string(),
                })
            }
        }
    }

    if depth > MAX_PATH_DEPTH {
        return Err(ValidationError::PathTooDeep {
            actual: depth,
            max: MAX_PATH_DEPTH,
        });
    }

    Ok(path.to_path_buf())
}
