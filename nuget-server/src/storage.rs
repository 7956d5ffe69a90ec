//! Canonical archive layout on disk.
//!
//! Archives live at `<root>/<package_id>/<version>.<ext>`. Uploads are
//! staged under `<root>/.staging` first, on the same filesystem, so the
//! final placement is a rename.

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::manifest::PackageIdentity;
use crate::validation::validate_safe_path;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const STAGING_DIR: &str = ".staging";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageLayout {
    root: PathBuf,
    archive_extension: String,
}

impl PackageLayout {
    pub fn new(root: impl Into<PathBuf>, archive_extension: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            archive_extension: archive_extension.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.package_root(), &config.storage.archive_extension)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn archive_extension(&self) -> &str {
        &self.archive_extension
    }

    /// Scratch directory for in-flight uploads.
    pub fn staging_dir(&self) -> PathBuf {
        self.root.join(STAGING_DIR)
    }

    /// Canonical path of an archive.
    ///
    /// The relative part is checked with [`validate_safe_path`] so a crafted
    /// id or version can never resolve outside the root.
    pub fn package_path(&self, identity: &PackageIdentity) -> AppResult<PathBuf> {
        let relative = Path::new(identity.id()).join(format!(
            "{}.{}",
            identity.version(),
            self.archive_extension
        ));
        let relative = validate_safe_path(relative)?;
        Ok(self.root.join(relative))
    }

    /// Create the root and staging directories. Safe to call concurrently.
    pub fn ensure_dirs(&self) -> AppResult<()> {
        fs::create_dir_all(self.staging_dir())
            .map_err(|e| AppError::ingest_io("creating the staging directory", e))
    }

    /// Delete the canonical archive and, when it was the last one, its
    /// package directory.
    pub fn remove_package_file(&self, identity: &PackageIdentity) -> AppResult<()> {
        let path = self.package_path(identity)?;
        match fs::remove_file(&path) {
            Ok(()) => info!(path = %path.display(), "Removed package archive"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "Package archive already absent");
            }
            Err(e) => return Err(e.into()),
        }

        if let Some(dir) = path.parent() {
            // Only succeeds when empty; a sibling version keeps the directory.
            if fs::remove_dir(dir).is_ok() {
                debug!(dir = %dir.display(), "Removed empty package directory");
            }
        }
        Ok(())
    }

    /// Every archive under the root as `(package_id, version, path)`, sorted
    /// by path. The staging directory and foreign files are skipped.
    pub fn list_archives(&self) -> AppResult<Vec<(String, String, PathBuf)>> {
        let mut archives = Vec::new();
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(archives),
            Err(e) => return Err(e.into()),
        };

        for entry in entries {
            let entry = entry?;
            let package_id = entry.file_name().to_string_lossy().into_owned();
            if package_id == STAGING_DIR || !entry.file_type()?.is_dir() {
                continue;
            }

            for file in fs::read_dir(entry.path())? {
                let path = file?.path();
                let matches_extension = path
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case(&self.archive_extension));
                if !matches_extension {
                    continue;
                }
                if let Some(version) = path.file_stem().map(|s| s.to_string_lossy().into_owned())
                {
                    archives.push((package_id.clone(), version, path));
                }
            }
        }

        archives.sort_by(|a, b| a.2.cmp(&b.2));
        debug!(count = archives.len(), root = %self.root.display(), "Listed archives");
        Ok(archives)
    }
}
