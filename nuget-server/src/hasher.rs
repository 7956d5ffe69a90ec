//! Content hashing and canonical placement of uploaded archives.
//!
//! An upload is streamed once into a scratch file in the staging directory
//! while a SHA-512 digest and byte count are accumulated. Only a complete,
//! within-limit stream is renamed onto its canonical path; every other exit
//! drops the scratch file, which deletes it.

use crate::error::{AppError, AppResult};
use crate::manifest::PackageIdentity;
use crate::storage::PackageLayout;
use crate::validation::validate_file_size;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use sha2::{Digest, Sha512};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, error, info};

const CHUNK_SIZE: usize = 64 * 1024;

pub const HASH_ALGORITHM: &str = "SHA512";

/// Digest and size of one ingested archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveDigest {
    pub algorithm: String,
    pub digest: Vec<u8>,
    pub size_bytes: i64,
}

impl ArchiveDigest {
    /// Digest of an in-memory buffer.
    pub fn of(bytes: &[u8]) -> Self {
        Self {
            algorithm: HASH_ALGORITHM.to_string(),
            digest: Sha512::digest(bytes).to_vec(),
            size_bytes: bytes.len() as i64,
        }
    }

    /// Digest of an already stored archive.
    pub fn from_reader<R: Read>(mut reader: R) -> io::Result<Self> {
        let mut hasher = Sha512::new();
        let size = io::copy(&mut reader, &mut hasher)?;
        Ok(Self {
            algorithm: HASH_ALGORITHM.to_string(),
            digest: hasher.finalize().to_vec(),
            size_bytes: size as i64,
        })
    }

    /// The digest as stored on the version row and compared with client checksums.
    pub fn to_base64(&self) -> String {
        BASE64.encode(&self.digest)
    }

    pub fn matches_checksum(&self, checksum: &str) -> bool {
        self.to_base64() == checksum.trim()
    }
}

/// Hashes uploads and persists them under a [`PackageLayout`].
#[derive(Debug, Clone)]
pub struct ContentHasher {
    layout: PackageLayout,
    max_size: u64,
}

impl ContentHasher {
    pub fn new(layout: PackageLayout, max_size: u64) -> Self {
        Self { layout, max_size }
    }

    pub fn layout(&self) -> &PackageLayout {
        &self.layout
    }

    /// Stream `reader` to the canonical path of `identity` and return its digest.
    ///
    /// Re-ingesting an existing identity replaces the file. Concurrent
    /// ingestion of the same identity must be serialized by the caller.
    ///
    /// # Errors
    ///
    /// - [`AppError::IngestIo`] when reading the stream or writing storage fails
    /// - [`AppError::UploadError`] when the stream exceeds the size limit
    pub fn ingest<R: Read>(
        &self,
        reader: R,
        identity: &PackageIdentity,
    ) -> AppResult<(ArchiveDigest, PathBuf)> {
        let staged = self.stage(reader, identity)?;
        let digest = staged.digest().clone();
        let path = staged.commit()?;
        Ok((digest, path))
    }

    /// Hash `reader` into a scratch file without touching the canonical path.
    ///
    /// Dropping the returned [`StagedArchive`] discards the upload.
    pub fn stage<R: Read>(&self, mut reader: R, identity: &PackageIdentity) -> AppResult<StagedArchive> {
        let destination = self.layout.package_path(identity)?;
        self.layout.ensure_dirs()?;

        let mut scratch = NamedTempFile::new_in(self.layout.staging_dir())
            .map_err(|e| AppError::ingest_io("creating a scratch file", e))?;

        let mut hasher = Sha512::new();
        let mut size: u64 = 0;
        let mut buffer = vec![0u8; CHUNK_SIZE];

        loop {
            let read = match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    error!(package = %identity, error = %e, "Failed to read upload stream");
                    return Err(AppError::ingest_io("reading the upload stream", e));
                }
            };

            size += read as u64;
            if let Err(e) = validate_file_size(size, Some(self.max_size)) {
                return Err(AppError::UploadError(format!(
                    "Package {identity} is too large: {e}"
                )));
            }

            hasher.update(&buffer[..read]);
            scratch
                .write_all(&buffer[..read])
                .map_err(|e| AppError::ingest_io("writing the scratch file", e))?;
        }

        scratch
            .as_file()
            .sync_all()
            .map_err(|e| AppError::ingest_io("flushing the scratch file", e))?;
        debug!(package = %identity, size, "Hashed upload");

        Ok(StagedArchive {
            identity: identity.clone(),
            digest: ArchiveDigest {
                algorithm: HASH_ALGORITHM.to_string(),
                digest: hasher.finalize().to_vec(),
                size_bytes: size as i64,
            },
            scratch,
            destination,
        })
    }
}

/// A fully hashed upload waiting in the staging directory.
#[derive(Debug)]
pub struct StagedArchive {
    identity: PackageIdentity,
    digest: ArchiveDigest,
    scratch: NamedTempFile,
    destination: PathBuf,
}

impl StagedArchive {
    pub fn digest(&self) -> &ArchiveDigest {
        &self.digest
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Rename the scratch file onto the canonical path, replacing any previous archive.
    pub fn commit(self) -> AppResult<PathBuf> {
        let Self {
            identity,
            digest,
            scratch,
            destination,
        } = self;

        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| AppError::ingest_io("creating the package directory", e))?;
        }

        scratch.persist(&destination).map_err(|e| {
            error!(path = %destination.display(), error = %e.error, "Failed to place archive");
            AppError::ingest_io("placing the archive", e.error)
        })?;

        info!(
            package = %identity,
            path = %destination.display(),
            size = digest.size_bytes,
            "Stored package archive"
        );
        Ok(destination)
    }
}
