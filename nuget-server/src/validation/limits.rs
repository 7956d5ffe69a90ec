//! # Input Validation: Size Limits
//!
//! Upper bounds applied to uploads and manifest fields.

use crate::validation::error::ValidationError;
use crate::validation::result::ValidationResult;

/// Default maximum archive size accepted for ingestion (100 MB)
pub const MAX_UPLOAD_SIZE: u64 = 100 * 1024 * 1024;

/// Maximum size of the manifest entry read out of an archive (1 MB)
pub const MAX_MANIFEST_SIZE: u64 = 1024 * 1024;

/// Maximum allowed package id length
pub const MAX_PACKAGE_ID_LENGTH: usize = 100;

/// Maximum allowed version string length
pub const MAX_VERSION_LENGTH: usize = 64;

/// Maximum allowed path depth for relative paths
pub const MAX_PATH_DEPTH: usize = 10;

/// Validate a size against a limit (defaults to [`MAX_UPLOAD_SIZE`]).
pub fn validate_file_size(size: u64, max_size: Option<u64>) -> ValidationResult<()> {
    let limit = max_size.unwrap_or(MAX_UPLOAD_SIZE);

    if size > limit {
        return Err(ValidationError::FileTooLarge {
            actual: size,
            max: limit,
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_file_size() {
        assert!(validate_file_size(1024, None).is_ok());
        assert!(validate_file_size(MAX_UPLOAD_SIZE, None).is_ok());
        assert!(validate_file_size(MAX_UPLOAD_SIZE + 1, None).is_err());
        assert!(validate_file_size(1024, Some(512)).is_err());
    }
}
