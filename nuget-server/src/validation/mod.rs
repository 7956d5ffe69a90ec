//! # Input Validation
//!
//! Validation helpers for everything an upload controls: the package id and
//! version declared in its manifest, the storage path derived from them, and
//! the size of the archive itself.

pub mod error;
pub mod limits;
pub mod manifests;
pub mod paths;
pub mod result;

pub use self::{
    error::ValidationError,
    limits::{
        validate_file_size, MAX_MANIFEST_SIZE, MAX_PACKAGE_ID_LENGTH, MAX_PATH_DEPTH,
        MAX_UPLOAD_SIZE, MAX_VERSION_LENGTH,
    },
    manifests::{is_prerelease, parse_package_version, validate_package_id, validate_version},
    paths::validate_safe_path,
    result::ValidationResult,
};
