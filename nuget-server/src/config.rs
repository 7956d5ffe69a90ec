//! # Configuration Management
//!
//! Configuration for the registry core, loaded from a JSON file:
//!
//! - [`ServerConfig`]: public base URL and feed title
//! - [`StorageConfig`]: canonical archive root and file extensions
//! - [`LimitsConfig`]: upload size limit
//! - [`SecurityConfig`]: API keys accepted for push and delete
//!
//! Every section has defaults, so a partial file (or none at all) is valid:
//!
//! ```rust,no_run
//! # use nuget_server::config::Config;
//! let config = Config::load_or_default("nuget-server.json")?;
//! println!("serving packages from {}", config.package_root().display());
//! # Ok::<(), nuget_server::AppError>(())
//! ```

use crate::error::AppResult;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub security: SecurityConfig,
}

/// Public-facing server settings used when rendering URLs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Base URI declared as `xml:base` on feeds and prefixed to every link
    pub base_url: String,
    /// Title of the package collection
    pub feed_title: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000/api/v2/".to_string(),
            feed_title: "Packages".to_string(),
        }
    }
}

/// Canonical storage settings.
///
/// Archives live at `<server_path>/<package_dir>/<package_id>/<version>.<archive_extension>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    pub server_path: PathBuf,
    pub package_dir: PathBuf,
    pub archive_extension: String,
    pub manifest_extension: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            server_path: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("nuget-server"),
            package_dir: PathBuf::from("packagefiles"),
            archive_extension: "nupkg".to_string(),
            manifest_extension: "nuspec".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitsConfig {
    pub max_upload_size_mb: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        LimitsConfig {
            max_upload_size_mb: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub require_authentication: bool,
    pub api_keys: Vec<String>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            require_authentication: true,
            api_keys: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read or does not match the configuration
    /// format. Missing sections take their defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let config_str = fs::read_to_string(path)?;
        let config = serde_json::from_str(&config_str)?;
        Ok(config)
    }

    /// Load configuration from file, or the defaults when the file does not exist.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Base URL, always ending with `/` so relative links can be appended.
    pub fn base_url(&self) -> String {
        let base = self.server.base_url.trim();
        if base.ends_with('/') {
            base.to_string()
        } else {
            format!("{base}/")
        }
    }

    /// Root directory of the canonical archive storage.
    pub fn package_root(&self) -> PathBuf {
        self.storage.server_path.join(&self.storage.package_dir)
    }

    /// Maximum accepted archive size in bytes.
    pub fn max_upload_size_bytes(&self) -> u64 {
        self.limits.max_upload_size_mb.saturating_mul(1024 * 1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_partial_file_takes_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        fs::write(
            &path,
            r#"{"security": {"require_authentication": true, "api_keys": ["secret"]}}"#,
        )
        .unwrap();

        let config = Config::load(&path).expect("partial config should load");
        assert_eq!(config.security.api_keys, vec!["secret".to_string()]);
        assert_eq!(config.storage.archive_extension, "nupkg");
        assert_eq!(config.limits.max_upload_size_mb, 100);
    }

    #[test]
    fn test_load_or_default_without_file() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::load_or_default(temp_dir.path().join("missing.json"))
            .expect("missing file should yield defaults");
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(Config::load_or_default(&path).is_err());
    }

    #[test]
    fn test_base_url_gets_trailing_slash() {
        let mut config = Config::default();
        config.server.base_url = "https://nuget.example.com/api/v2".to_string();
        assert_eq!(config.base_url(), "https://nuget.example.com/api/v2/");

        config.server.base_url = "https://nuget.example.com/".to_string();
        assert_eq!(config.base_url(), "https://nuget.example.com/");
    }

    #[test]
    fn test_package_root_and_limits() {
        let mut config = Config::default();
        config.storage.server_path = PathBuf::from("/srv/nuget");
        config.limits.max_upload_size_mb = 2;
        assert_eq!(config.package_root(), PathBuf::from("/srv/nuget/packagefiles"));
        assert_eq!(config.max_upload_size_bytes(), 2 * 1024 * 1024);
    }

    #[test]
    fn test_huge_upload_limit_saturates() {
        let mut config = Config::default();
        config.limits.max_upload_size_mb = u64::MAX;
        assert_eq!(config.max_upload_size_bytes(), u64::MAX);
    }
}
