//! # Registry Service
//!
//! Wires the ingestion pipeline and the renderers to the storage and auth
//! collaborators:
//!
//! ```text
//! upload:  auth -> ArchiveReader -> manifest -> identity -> ContentHasher -> insert_version
//! query:   store -> FeedWriter (XML) | response model (JSON)
//! ```
//!
//! Every operation is synchronous. Concurrent uploads of the same
//! id/version pair must be serialized by the caller.

use crate::archive::ArchiveReader;
use crate::auth::{require_api_key, KeyValidator};
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::feed::FeedWriter;
use crate::hasher::{ArchiveDigest, ContentHasher};
use crate::manifest::{parse_manifest, PackageIdentity, ParsedManifest};
use crate::response::{MetadataResponse, SearchResponse, ServiceIndexResponse, WireObject};
use crate::storage::PackageLayout;
use crate::store::{NewVersion, PackageStore, SearchQuery};
use crate::validation::validate_file_size;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Result of a successful upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestedPackage {
    pub identity: PackageIdentity,
    pub digest: ArchiveDigest,
    pub path: PathBuf,
}

pub struct Registry<S: PackageStore, K: KeyValidator> {
    config: Config,
    store: S,
    keys: K,
    reader: ArchiveReader,
    hasher: ContentHasher,
}

impl<S: PackageStore, K: KeyValidator> Registry<S, K> {
    pub fn new(config: Config, store: S, keys: K) -> Self {
        let reader = ArchiveReader::new(&config.storage.manifest_extension);
        let hasher = ContentHasher::new(
            PackageLayout::from_config(&config),
            config.max_upload_size_bytes(),
        );
        Self {
            config,
            store,
            keys,
            reader,
            hasher,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn layout(&self) -> &PackageLayout {
        self.hasher.layout()
    }

    fn feed_writer(&self, feed_id: &str) -> FeedWriter {
        FeedWriter::from_config(feed_id, &self.config)
    }

    /// Read and parse the manifest of an archive without storing anything.
    pub fn inspect<R: Read + Seek>(&self, archive: R) -> AppResult<ParsedManifest> {
        let manifest = self.reader.extract_manifest(archive)?;
        parse_manifest(manifest.as_str()?)
    }

    /// Ingest an uploaded archive.
    ///
    /// The manifest is validated before any byte reaches storage, and the
    /// hashed upload waits in staging until the store accepts its row. A
    /// rejected row leaves the previous archive and row untouched. Ids are
    /// stored with the casing the package was first uploaded with.
    pub fn upload<R: Read + Seek>(
        &self,
        api_key: Option<&str>,
        mut archive: R,
    ) -> AppResult<IngestedPackage> {
        require_api_key(&self.keys, api_key)?;

        let size = archive
            .seek(SeekFrom::End(0))
            .map_err(|e| AppError::ingest_io("measuring the upload", e))?;
        validate_file_size(size, Some(self.config.max_upload_size_bytes()))
            .map_err(|e| AppError::UploadError(format!("Upload rejected: {e}")))?;
        archive
            .rewind()
            .map_err(|e| AppError::ingest_io("rewinding the upload", e))?;

        let parsed = self.inspect(&mut archive)?;
        let identity = self.canonical_identity(parsed.identity()?)?;
        debug!(package = %identity, "Validated manifest identity");
        let replacing = self.store.version_exists(identity.id(), identity.version())?;
        if replacing {
            warn!(package = %identity, "Version already exists, replacing it");
        }

        archive
            .rewind()
            .map_err(|e| AppError::ingest_io("rewinding the upload", e))?;
        let staged = self.hasher.stage(&mut archive, &identity)?;
        let digest = staged.digest().clone();

        // The canonical file is only swapped once the row is accepted.
        let new_version = NewVersion {
            identity: identity.clone(),
            metadata: parsed.metadata,
            dependencies: parsed.dependencies,
            digest: digest.clone(),
        };
        if let Err(e) = self.store.insert_version(new_version) {
            warn!(package = %identity, error = %e, "Store rejected version, discarding upload");
            return Err(e);
        }

        let path = match staged.commit() {
            Ok(path) => path,
            Err(e) if replacing => {
                error!(package = %identity, error = %e, "Replacement row stored but archive not placed");
                return Err(e);
            }
            Err(e) => {
                if let Err(cleanup) = self.store.delete_version(identity.id(), identity.version()) {
                    warn!(package = %identity, error = %cleanup, "Failed to remove row of unplaced archive");
                }
                return Err(e);
            }
        };

        info!(
            package_id = %identity.id(),
            version = %identity.version(),
            size = digest.size_bytes,
            "Package uploaded"
        );
        Ok(IngestedPackage {
            identity,
            digest,
            path,
        })
    }

    /// Feed of a package's versions, or of one version when `version` is given.
    pub fn find_packages_by_id(&self, package_id: &str, version: Option<&str>) -> AppResult<Vec<u8>> {
        let records = self.store.find_versions(package_id, version)?;
        let feed_id = match version {
            Some(version) if records.is_empty() => {
                return Err(AppError::NotFound(format!(
                    "Package not found: {package_id} {version}"
                )));
            }
            Some(_) => "Packages",
            None => "FindPackagesById",
        };
        self.feed_writer(feed_id).render(&records)
    }

    pub fn search_feed(&self, query: &SearchQuery) -> AppResult<Vec<u8>> {
        let records = self.store.search(query)?;
        self.feed_writer("Search").render(&records)
    }

    /// Search grouped by package. Paging applies to packages, not version rows.
    pub fn search_json(&self, query: &SearchQuery) -> AppResult<Vec<u8>> {
        let unpaged = SearchQuery {
            skip: 0,
            top: None,
            ..query.clone()
        };
        let records = self.store.search(&unpaged)?;
        let response = SearchResponse::from_records(&records, &self.config.base_url())
            .paged(query.skip, query.top);
        Ok(response.to_json()?.into_bytes())
    }

    pub fn service_index(&self) -> AppResult<Vec<u8>> {
        let index = ServiceIndexResponse::for_base_url(&self.config.base_url());
        Ok(index.to_json()?.into_bytes())
    }

    pub fn service_document(&self) -> AppResult<Vec<u8>> {
        self.feed_writer("Packages").render_service_document()
    }

    /// Version listing of a package as JSON.
    pub fn package_versions(&self, package_id: &str) -> AppResult<Vec<u8>> {
        let records = self.store.find_versions(package_id, None)?;
        if records.is_empty() {
            return Err(AppError::NotFound(format!("Package not found: {package_id}")));
        }
        Ok(MetadataResponse::from_records(&records).to_json()?.into_bytes())
    }

    /// Identity using the id casing the package was first stored with, so
    /// every version of a package shares one directory.
    fn canonical_identity(&self, identity: PackageIdentity) -> AppResult<PackageIdentity> {
        let stored = self.store.find_versions(identity.id(), None)?;
        match stored.first() {
            Some(record) if record.package_id != identity.id() => {
                debug!(
                    declared = %identity.id(),
                    stored = %record.package_id,
                    "Using stored package id casing"
                );
                PackageIdentity::new(&record.package_id, identity.version())
            }
            _ => Ok(identity),
        }
    }

    /// Stored identity of a version, with the id casing it was uploaded with.
    fn stored_identity(&self, package_id: &str, version: &str) -> AppResult<PackageIdentity> {
        PackageIdentity::new(package_id, version)?;
        let record = self
            .store
            .find_versions(package_id, Some(version))?
            .into_iter()
            .next()
            .ok_or_else(|| {
                AppError::NotFound(format!("Package not found: {package_id} {version}"))
            })?;
        PackageIdentity::new(record.package_id, record.version)
    }

    /// Resolve the stored archive of a version and count the download.
    pub fn download(&self, package_id: &str, version: &str) -> AppResult<PathBuf> {
        let identity = self.stored_identity(package_id, version)?;
        let path = self.layout().package_path(&identity)?;
        if !path.exists() {
            warn!(package = %identity, path = %path.display(), "Archive missing from storage");
            return Err(AppError::NotFound(format!(
                "Package file not found: {identity}"
            )));
        }

        self.store.increment_download_count(package_id, version)?;
        debug!(package = %identity, "Serving download");
        Ok(path)
    }

    pub fn delete(&self, api_key: Option<&str>, package_id: &str, version: &str) -> AppResult<()> {
        require_api_key(&self.keys, api_key)?;
        let identity = self.stored_identity(package_id, version)?;

        self.store.delete_version(package_id, version)?;
        self.layout().remove_package_file(&identity)?;

        info!(package_id = %identity.id(), version = %version, "Package deleted");
        Ok(())
    }

    /// Load every archive under the canonical root into the store.
    ///
    /// Archives that cannot be read, or whose manifest disagrees with their
    /// location, are skipped with a warning. Returns the number loaded.
    pub fn rebuild_from_disk(&self) -> AppResult<usize> {
        let mut loaded = 0;
        for (package_id, version, path) in self.layout().list_archives()? {
            match self.load_archive(&package_id, &version, &path) {
                Ok(()) => loaded += 1,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping stored archive");
                }
            }
        }

        info!(loaded, root = %self.layout().root().display(), "Rebuilt package index");
        Ok(loaded)
    }

    fn load_archive(&self, package_id: &str, version: &str, path: &Path) -> AppResult<()> {
        let parsed = self.inspect(File::open(path)?)?;
        let identity = parsed.identity()?;
        if !identity.id().eq_ignore_ascii_case(package_id) || identity.version() != version {
            return Err(AppError::BadRequest(format!(
                "Manifest declares {identity}, stored as {package_id} {version}"
            )));
        }

        // The directory name is the canonical casing.
        let identity = PackageIdentity::new(package_id, identity.version())?;
        let digest = ArchiveDigest::from_reader(File::open(path)?)?;
        self.store.insert_version(NewVersion {
            identity,
            metadata: parsed.metadata,
            dependencies: parsed.dependencies,
            digest,
        })
    }
}
