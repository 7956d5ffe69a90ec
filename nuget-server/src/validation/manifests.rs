//! # Input Validation: Package Identity
//!
//! Rules for the `id` and `version` declared by an uploaded manifest. Both
//! end up as path components of the canonical storage path, so they are
//! checked before anything touches the filesystem.

use crate::validation::error::ValidationError;
use crate::validation::limits::{MAX_PACKAGE_ID_LENGTH, MAX_VERSION_LENGTH};
use crate::validation::result::ValidationResult;
use semver::{BuildMetadata, Version};

fn check_common(input: &str, max: usize) -> ValidationResult<()> {
    if input.is_empty() {
        return Err(ValidationError::TooShort { actual: 0, min: 1 });
    }

    if input.len() > max {
        return Err(ValidationError::TooLong {
            actual: input.len(),
            max,
        });
    }

    if input.contains('\0') {
        return Err(ValidationError::NullBytes);
    }

    if input.chars().any(|c| c.is_control()) {
        return Err(ValidationError::ControlCharacters);
    }

    Ok(())
}

/// Validate a package id.
///
/// Ids are case-preserving and may contain ASCII letters, digits, `.`, `-`
/// and `_`. A leading dot or a `..` sequence is rejected because the id is
/// used as a directory name.
///
/// ```
/// # use nuget_server::validation::validate_package_id;
/// assert!(validate_package_id("Newtonsoft.Json").is_ok());
/// assert!(validate_package_id("../etc").is_err());
/// ```
pub fn validate_package_id(id: &str) -> ValidationResult<String> {
    check_common(id, MAX_PACKAGE_ID_LENGTH)?;

    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
    {
        return Err(ValidationError::InvalidCharacters {
            input: id.to_string(),
        });
    }

    if id.starts_with('.') || id.contains("..") {
        return Err(ValidationError::InvalidFormat {
            reason: "package ids cannot start with '.' or contain '..'".to_string(),
        });
    }

    Ok(id.to_string())
}

/// Parse a package version with semantic-version precedence rules.
///
/// Short forms are padded (`1.0` becomes `1.0.0`) and a fourth numeric
/// component is carried as build metadata (`1.2.3.4` becomes `1.2.3+4`), so
/// every version the feed serves can be ordered.
pub fn parse_package_version(version: &str) -> ValidationResult<Version> {
    let invalid = |reason: String| ValidationError::InvalidVersion {
        input: version.to_string(),
        reason,
    };

    if let Ok(parsed) = Version::parse(version) {
        return Ok(parsed);
    }

    // Split off prerelease/build suffixes and normalize the numeric core.
    let suffix_at = version.find(['-', '+']).unwrap_or(version.len());
    let (core, suffix) = version.split_at(suffix_at);
    let parts: Vec<&str> = core.split('.').collect();

    if parts.is_empty() || parts.len() > 4 || parts.iter().any(|p| p.is_empty()) {
        return Err(invalid(format!("expected 1 to 4 numeric parts, got '{core}'")));
    }

    let mut numbers = [0u64; 4];
    for (slot, part) in numbers.iter_mut().zip(&parts) {
        *slot = part
            .parse()
            .map_err(|_| invalid(format!("'{part}' is not a number")))?;
    }

    let padded = format!("{}.{}.{}{}", numbers[0], numbers[1], numbers[2], suffix);
    let mut parsed = Version::parse(&padded).map_err(|e| invalid(e.to_string()))?;

    if parts.len() == 4 {
        let revision = numbers[3].to_string();
        let build = if parsed.build.is_empty() {
            revision
        } else {
            format!("{revision}.{}", parsed.build)
        };
        parsed.build = BuildMetadata::new(&build).map_err(|e| invalid(e.to_string()))?;
    }

    Ok(parsed)
}

/// Validate a version string and return it unchanged.
///
/// The string keeps the form the manifest declared; only its parseability
/// and character set are checked.
pub fn validate_version(version: &str) -> ValidationResult<String> {
    check_common(version, MAX_VERSION_LENGTH)?;

    if !version
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '+'))
    {
        return Err(ValidationError::InvalidCharacters {
            input: version.to_string(),
        });
    }

    parse_package_version(version)?;
    Ok(version.to_string())
}

/// Whether the version carries a prerelease label.
pub fn is_prerelease(version: &str) -> bool {
    parse_package_version(version).is_ok_and(|v| !v.pre.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_package_id() {
        assert!(validate_package_id("NuGetTest").is_ok());
        assert!(validate_package_id("Microsoft.Extensions.Logging").is_ok());
        assert!(validate_package_id("my_package-2").is_ok());

        assert!(validate_package_id("").is_err());
        assert!(validate_package_id(".hidden").is_err());
        assert!(validate_package_id("a..b").is_err());
        assert!(validate_package_id("with/slash").is_err());
        assert!(validate_package_id("with space").is_err());
        assert!(validate_package_id(&"a".repeat(MAX_PACKAGE_ID_LENGTH + 1)).is_err());
    }

    #[test]
    fn test_validate_version() {
        assert!(validate_version("1.0.0").is_ok());
        assert!(validate_version("2.1.0-beta.1").is_ok());
        assert!(validate_version("1.0").is_ok());
        assert!(validate_version("1.0.0.4").is_ok());

        assert!(validate_version("").is_err());
        assert!(validate_version("version\0with\0nulls").is_err());
        assert!(validate_version("../1.0.0").is_err());
        assert!(validate_version("one.two").is_err());
        assert!(validate_version("1.2.3.4.5").is_err());

        let long_version = "1.0.0-".to_string() + &"a".repeat(MAX_VERSION_LENGTH);
        assert!(validate_version(&long_version).is_err());
    }

    #[test]
    fn test_parse_package_version_normalizes_short_forms() {
        assert_eq!(
            parse_package_version("1.0").expect("short form should parse"),
            Version::new(1, 0, 0)
        );
        assert_eq!(
            parse_package_version("3").expect("single part should parse"),
            Version::new(3, 0, 0)
        );

        let four = parse_package_version("1.2.3.4").expect("four parts should parse");
        assert_eq!((four.major, four.minor, four.patch), (1, 2, 3));
        assert_eq!(four.build.as_str(), "4");

        let pre = parse_package_version("1.0-rc.1").expect("short prerelease should parse");
        assert_eq!(pre.pre.as_str(), "rc.1");
    }

    #[test]
    fn test_is_prerelease() {
        assert!(is_prerelease("1.0.0-alpha"));
        assert!(is_prerelease("0.2-beta"));
        assert!(!is_prerelease("1.0.0"));
        assert!(!is_prerelease("1.0.0+build.5"));
        assert!(!is_prerelease("garbage"));
    }
}
