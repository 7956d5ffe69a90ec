//! Manifest extraction from package archives.
//!
//! A package is a zip container that must carry exactly one manifest entry,
//! matched by its extension regardless of case or directory.

use crate::error::{AppError, AppResult};
use crate::validation::{validate_file_size, MAX_MANIFEST_SIZE};
use regex::Regex;
use std::io::{Read, Seek};
use tracing::{debug, warn};
use zip::ZipArchive;

/// The raw manifest entry pulled out of an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestDocument {
    /// Entry name inside the archive, e.g. `NuGetTest.nuspec`
    pub entry_name: String,
    pub bytes: Vec<u8>,
}

impl ManifestDocument {
    pub fn as_str(&self) -> AppResult<&str> {
        std::str::from_utf8(&self.bytes)
            .map_err(|e| AppError::BadRequest(format!("Manifest is not valid UTF-8: {e}")))
    }
}

/// Reads manifests out of package archives.
#[derive(Debug, Clone)]
pub struct ArchiveReader {
    pattern: Regex,
}

impl Default for ArchiveReader {
    fn default() -> Self {
        Self::new("nuspec")
    }
}

impl ArchiveReader {
    /// Create a reader matching entries that end with `.<extension>`, case-insensitively.
    pub fn new(extension: &str) -> Self {
        let pattern = format!(r"(?i)^.*\.{}$", regex::escape(extension));
        let pattern = Regex::new(&pattern)
            .expect("Manifest pattern should compile - the extension is escaped");
        Self { pattern }
    }

    /// Names of every archive entry that looks like a manifest.
    pub fn manifest_entries<R: Read + Seek>(&self, archive: &ZipArchive<R>) -> Vec<String> {
        archive
            .file_names()
            .filter(|name| self.pattern.is_match(name))
            .map(str::to_string)
            .collect()
    }

    /// Extract the single manifest entry from an archive.
    ///
    /// # Errors
    ///
    /// - [`AppError::ManifestNotFound`] when no entry matches
    /// - [`AppError::AmbiguousManifest`] when more than one entry matches
    /// - [`AppError::Zip`] when the input is not a readable zip container
    pub fn extract_manifest<R: Read + Seek>(&self, reader: R) -> AppResult<ManifestDocument> {
        debug!("Parsing uploaded archive");
        let mut archive = ZipArchive::new(reader)?;
        let mut matches = self.manifest_entries(&archive);

        let entry_name = match matches.len() {
            0 => {
                warn!("No manifest file found in the package");
                return Err(AppError::ManifestNotFound);
            }
            1 => matches.remove(0),
            count => {
                warn!(count, entries = ?matches, "Multiple manifest files found within the package");
                return Err(AppError::AmbiguousManifest { count });
            }
        };

        let entry = archive.by_name(&entry_name)?;
        validate_file_size(entry.size(), Some(MAX_MANIFEST_SIZE))?;

        let mut bytes = Vec::with_capacity(entry.size() as usize);
        entry
            .take(MAX_MANIFEST_SIZE + 1)
            .read_to_end(&mut bytes)?;
        validate_file_size(bytes.len() as u64, Some(MAX_MANIFEST_SIZE))?;

        debug!(entry = %entry_name, size = bytes.len(), "Extracted manifest");
        Ok(ManifestDocument { entry_name, bytes })
    }
}

/// Extract the `.nuspec` manifest from a package archive.
pub fn extract_manifest<R: Read + Seek>(reader: R) -> AppResult<ManifestDocument> {
    ArchiveReader::default().extract_manifest(reader)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    fn archive_with(entries: &[(&str, &str)]) -> Cursor<Vec<u8>> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, content) in entries {
            writer
                .start_file(*name, SimpleFileOptions::default())
                .unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        let mut cursor = writer.finish().unwrap();
        cursor.set_position(0);
        cursor
    }

    #[test]
    fn test_extracts_single_manifest() {
        let archive = archive_with(&[
            ("_rels/.rels", "<Relationships/>"),
            ("NuGetTest.nuspec", "<package/>"),
            ("lib/net45/NuGetTest.dll", "MZ"),
        ]);

        let manifest = extract_manifest(archive).expect("manifest should be found");
        assert_eq!(manifest.entry_name, "NuGetTest.nuspec");
        assert_eq!(manifest.bytes, b"<package/>");
        assert_eq!(manifest.as_str().unwrap(), "<package/>");
    }

    #[test]
    fn test_match_is_case_insensitive() {
        let archive = archive_with(&[("Content/Pkg.NuSpec", "<package/>")]);
        let manifest = extract_manifest(archive).expect("mixed-case extension should match");
        assert_eq!(manifest.entry_name, "Content/Pkg.NuSpec");
    }

    #[test]
    fn test_missing_manifest() {
        let archive = archive_with(&[("readme.txt", "hello"), ("pkg.nuspec.bak", "<package/>")]);
        assert!(matches!(
            extract_manifest(archive),
            Err(AppError::ManifestNotFound)
        ));
    }

    #[test]
    fn test_ambiguous_manifest() {
        let archive = archive_with(&[("a.nuspec", "<package/>"), ("b/B.NUSPEC", "<package/>")]);
        assert!(matches!(
            extract_manifest(archive),
            Err(AppError::AmbiguousManifest { count: 2 })
        ));
    }

    #[test]
    fn test_not_a_zip() {
        let result = extract_manifest(Cursor::new(b"definitely not a zip".to_vec()));
        assert!(matches!(result, Err(AppError::Zip(_))));
    }

    #[test]
    fn test_custom_extension() {
        let reader = ArchiveReader::new("manifest");
        let archive = archive_with(&[("pkg.manifest", "<package/>"), ("pkg.nuspec", "x")]);
        let manifest = reader.extract_manifest(archive).unwrap();
        assert_eq!(manifest.entry_name, "pkg.manifest");
    }
}
