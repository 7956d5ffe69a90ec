//! Storage collaborator interface.
//!
//! The registry core reads and writes version rows through [`PackageStore`]
//! and never owns their lifecycle. [`MemoryStore`] is an in-process
//! implementation used by the binary and the tests; it keeps nothing across
//! restarts.

use crate::error::{AppError, AppResult};
use crate::hasher::ArchiveDigest;
use crate::manifest::{encode_dependencies, Dependency, ManifestMetadata, PackageIdentity};
use crate::validation::parse_package_version;
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, error, info, warn};

/// One stored package version, as the feed and JSON renderers see it.
///
/// `package_download_count` and `latest_version` belong to the owning
/// package and are filled in by the store when the row is read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRecord {
    pub package_id: String,
    pub version: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub summary: Option<String>,
    pub release_notes: Option<String>,
    pub tags: Option<String>,
    pub license_url: Option<String>,
    pub project_url: Option<String>,
    pub icon_url: Option<String>,
    pub authors: Option<String>,
    pub owners: Option<String>,
    pub copyright: Option<String>,
    pub language: Option<String>,
    pub min_client_version: Option<String>,
    /// Encoded dependency list, see [`encode_dependencies`]
    pub dependencies: Option<String>,
    pub package_hash: String,
    pub package_hash_algorithm: String,
    pub package_size: i64,
    pub require_license_acceptance: bool,
    pub is_prerelease: bool,
    pub version_download_count: i64,
    pub created: DateTime<Utc>,
    pub package_download_count: i64,
    pub latest_version: Option<String>,
}

impl VersionRecord {
    /// Whether this row is the owning package's latest version.
    pub fn is_latest(&self) -> bool {
        self.latest_version.as_deref() == Some(self.version.as_str())
    }
}

/// Fields for a version row produced by a successful ingestion.
#[derive(Debug, Clone)]
pub struct NewVersion {
    pub identity: PackageIdentity,
    pub metadata: ManifestMetadata,
    pub dependencies: Vec<Dependency>,
    pub digest: ArchiveDigest,
}

impl NewVersion {
    /// Build the stored row, encoding the dependency blob and stamping `created`.
    pub fn into_record(self, created: DateTime<Utc>) -> AppResult<VersionRecord> {
        let dependencies = encode_dependencies(&self.dependencies)?;
        let is_prerelease = self.identity.is_prerelease();
        let metadata = self.metadata;

        Ok(VersionRecord {
            package_id: self.identity.id().to_string(),
            version: self.identity.version().to_string(),
            title: metadata.title,
            description: metadata.description,
            summary: metadata.summary,
            release_notes: metadata.release_notes,
            tags: metadata.tags,
            license_url: metadata.license_url,
            project_url: metadata.project_url,
            icon_url: metadata.icon_url,
            authors: metadata.authors,
            owners: metadata.owners,
            copyright: metadata.copyright,
            language: metadata.language,
            min_client_version: metadata.min_client_version,
            dependencies: Some(dependencies),
            package_hash: self.digest.to_base64(),
            package_hash_algorithm: self.digest.algorithm,
            package_size: self.digest.size_bytes,
            require_license_acceptance: metadata.require_license_acceptance,
            is_prerelease,
            version_download_count: 0,
            created,
            package_download_count: 0,
            latest_version: None,
        })
    }
}

/// Restricts search results to latest versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchFilter {
    IsLatestVersion,
    IsAbsoluteLatestVersion,
}

impl FromStr for SearchFilter {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "IsLatestVersion" | "is_latest_version" => Ok(Self::IsLatestVersion),
            "IsAbsoluteLatestVersion" | "is_absolute_latest_version" => {
                Ok(Self::IsAbsoluteLatestVersion)
            }
            other => Err(AppError::BadRequest(format!("Unknown filter '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OrderBy {
    /// Version download count, highest first
    #[default]
    Downloads,
    /// Package id, then newest version first
    Id,
    /// Newest upload first
    Published,
}

impl FromStr for OrderBy {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Clients send OData clauses such as "DownloadCount desc".
        let field = s.split_whitespace().next().unwrap_or_default();
        match field.to_ascii_lowercase().as_str() {
            "downloadcount" | "downloads" => Ok(Self::Downloads),
            "id" => Ok(Self::Id),
            "published" => Ok(Self::Published),
            _ => Err(AppError::BadRequest(format!("Unknown ordering '{s}'"))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchQuery {
    /// Matched case-insensitively against package id and title
    pub term: Option<String>,
    pub include_prerelease: bool,
    pub filter: Option<SearchFilter>,
    pub order_by: OrderBy,
    pub skip: usize,
    pub top: Option<usize>,
}

impl SearchQuery {
    fn matches(&self, record: &VersionRecord) -> bool {
        if !self.include_prerelease && record.is_prerelease {
            return false;
        }
        if self.filter.is_some() && !record.is_latest() {
            return false;
        }
        match self.term.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            None => true,
            Some(term) => {
                let term = term.to_lowercase();
                record.package_id.to_lowercase().contains(&term)
                    || record
                        .title
                        .as_deref()
                        .is_some_and(|title| title.to_lowercase().contains(&term))
            }
        }
    }
}

/// Record storage consumed by the registry.
///
/// Implementations are expected to be internally synchronized. Package ids
/// compare case-insensitively; versions compare as declared.
pub trait PackageStore {
    /// Versions of a package, newest first, or the single requested version.
    fn find_versions(&self, package_id: &str, version: Option<&str>)
        -> AppResult<Vec<VersionRecord>>;

    /// Insert a version row, replacing any row with the same identity.
    fn insert_version(&self, version: NewVersion) -> AppResult<()>;

    /// The package's latest-version pointer, `None` for an unknown package.
    fn package_latest_version(&self, package_id: &str) -> AppResult<Option<String>>;

    fn search(&self, query: &SearchQuery) -> AppResult<Vec<VersionRecord>>;

    fn version_exists(&self, package_id: &str, version: &str) -> AppResult<bool>;

    /// Bump both the version and the package download counters.
    fn increment_download_count(&self, package_id: &str, version: &str) -> AppResult<()>;

    fn count_packages(&self) -> AppResult<usize>;

    /// Remove a version row. Returns whether a row was removed.
    fn delete_version(&self, package_id: &str, version: &str) -> AppResult<bool>;
}

/// Version precedence, falling back to text order for unparsable versions.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    match (parse_package_version(a), parse_package_version(b)) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        _ => a.cmp(b),
    }
}

#[derive(Debug)]
struct PackageRow {
    id: String,
    download_count: i64,
    latest_version: Option<String>,
    versions: Vec<VersionRecord>,
}

impl PackageRow {
    fn refresh_latest(&mut self) {
        self.latest_version = self
            .versions
            .iter()
            .max_by(|a, b| compare_versions(&a.version, &b.version))
            .map(|record| record.version.clone());
    }

    fn snapshot(&self, record: &VersionRecord) -> VersionRecord {
        VersionRecord {
            package_download_count: self.download_count,
            latest_version: self.latest_version.clone(),
            ..record.clone()
        }
    }
}

type Packages = BTreeMap<String, PackageRow>;

/// In-process [`PackageStore`] keyed by lowercased package id.
#[derive(Debug, Default)]
pub struct MemoryStore {
    packages: RwLock<Packages>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> AppResult<RwLockReadGuard<'_, Packages>> {
        self.packages.read().map_err(|e| {
            error!("Package store lock failed: {}", e);
            AppError::Internal("package store lock poisoned".to_string())
        })
    }

    fn write(&self) -> AppResult<RwLockWriteGuard<'_, Packages>> {
        self.packages.write().map_err(|e| {
            error!("Package store lock failed: {}", e);
            AppError::Internal("package store lock poisoned".to_string())
        })
    }
}

fn key(package_id: &str) -> String {
    package_id.to_ascii_lowercase()
}

impl PackageStore for MemoryStore {
    fn find_versions(
        &self,
        package_id: &str,
        version: Option<&str>,
    ) -> AppResult<Vec<VersionRecord>> {
        let packages = self.read()?;
        let Some(row) = packages.get(&key(package_id)) else {
            return Ok(Vec::new());
        };

        let mut found: Vec<VersionRecord> = row
            .versions
            .iter()
            .filter(|record| version.map_or(true, |v| record.version == v))
            .map(|record| row.snapshot(record))
            .collect();
        found.sort_by(|a, b| compare_versions(&b.version, &a.version));
        Ok(found)
    }

    fn insert_version(&self, version: NewVersion) -> AppResult<()> {
        let record = version.into_record(Utc::now())?;
        let mut packages = self.write()?;
        let row = packages
            .entry(key(&record.package_id))
            .or_insert_with(|| PackageRow {
                id: record.package_id.clone(),
                download_count: 0,
                latest_version: None,
                versions: Vec::new(),
            });

        let package_id = row.id.clone();
        let version = record.version.clone();
        match row.versions.iter_mut().find(|r| r.version == record.version) {
            Some(existing) => {
                warn!(package_id = %package_id, version = %version, "Replacing existing version row");
                *existing = record;
            }
            None => row.versions.push(record),
        }
        row.refresh_latest();

        info!(
            package_id = %package_id,
            version = %version,
            latest = ?row.latest_version,
            "Inserted version"
        );
        Ok(())
    }

    fn package_latest_version(&self, package_id: &str) -> AppResult<Option<String>> {
        let packages = self.read()?;
        Ok(packages
            .get(&key(package_id))
            .and_then(|row| row.latest_version.clone()))
    }

    fn search(&self, query: &SearchQuery) -> AppResult<Vec<VersionRecord>> {
        let packages = self.read()?;
        let mut results: Vec<VersionRecord> = packages
            .values()
            .flat_map(|row| row.versions.iter().map(move |record| row.snapshot(record)))
            .filter(|record| query.matches(record))
            .collect();

        let by_identity = |a: &VersionRecord, b: &VersionRecord| {
            key(&a.package_id)
                .cmp(&key(&b.package_id))
                .then_with(|| compare_versions(&b.version, &a.version))
        };
        match query.order_by {
            OrderBy::Downloads => results.sort_by(|a, b| {
                b.version_download_count
                    .cmp(&a.version_download_count)
                    .then_with(|| by_identity(a, b))
            }),
            OrderBy::Id => results.sort_by(by_identity),
            OrderBy::Published => results.sort_by(|a, b| {
                b.created.cmp(&a.created).then_with(|| by_identity(a, b))
            }),
        }

        let results: Vec<VersionRecord> = results
            .into_iter()
            .skip(query.skip)
            .take(query.top.unwrap_or(usize::MAX))
            .collect();
        debug!(term = ?query.term, hits = results.len(), "Searched packages");
        Ok(results)
    }

    fn version_exists(&self, package_id: &str, version: &str) -> AppResult<bool> {
        let packages = self.read()?;
        Ok(packages
            .get(&key(package_id))
            .is_some_and(|row| row.versions.iter().any(|r| r.version == version)))
    }

    fn increment_download_count(&self, package_id: &str, version: &str) -> AppResult<()> {
        let mut packages = self.write()?;
        let row = packages
            .get_mut(&key(package_id))
            .ok_or_else(|| AppError::NotFound(format!("Package not found: {package_id}")))?;
        let record = row
            .versions
            .iter_mut()
            .find(|r| r.version == version)
            .ok_or_else(|| {
                AppError::NotFound(format!("Version not found: {package_id} {version}"))
            })?;

        record.version_download_count += 1;
        row.download_count += 1;
        Ok(())
    }

    fn count_packages(&self) -> AppResult<usize> {
        Ok(self.read()?.len())
    }

    fn delete_version(&self, package_id: &str, version: &str) -> AppResult<bool> {
        let mut packages = self.write()?;
        let package_key = key(package_id);
        let Some(row) = packages.get_mut(&package_key) else {
            return Ok(false);
        };

        let before = row.versions.len();
        row.versions.retain(|r| r.version != version);
        if row.versions.len() == before {
            return Ok(false);
        }

        if row.versions.is_empty() {
            packages.remove(&package_key);
        } else {
            row.refresh_latest();
        }
        info!(package_id = %package_id, version = %version, "Deleted version");
        Ok(true)
    }
}
