//! # NuGet Package Registry Core
//!
//! Ingestion and serialization core of a NuGet v2 package registry. Uploaded
//! `.nupkg` archives are introspected, validated, hashed and placed on disk;
//! stored version rows are rendered as Atom/OData feeds or JSON responses.
//!
//! ## Features
//!
//! - **Archive introspection**: finds the single `.nuspec` manifest in a zip container
//! - **Manifest parsing**: identity, descriptive metadata and dependency groups
//! - **Content hashing**: streamed SHA-512 with atomic placement on canonical storage
//! - **Feed rendering**: byte-stable Atom feeds with typed OData properties
//! - **JSON responses**: service index and search results with wire-name tables
//!
//! ## Key Modules
//!
//! - [`archive`]: manifest extraction from package archives
//! - [`manifest`]: manifest parsing and dependency extraction
//! - [`hasher`]: upload hashing and canonical placement
//! - [`feed`]: Atom/OData feed rendering
//! - [`response`]: JSON response records
//! - [`store`]: storage collaborator interface and in-memory store
//! - [`auth`]: API key checks
//! - [`registry`]: the service wiring it all together
//! - [`validation`]: input validation for ids, versions, paths and sizes
//!
//! ## Usage
//!
//! Transport layers build a [`Registry`] once and call it per request; the
//! `nuget-server` binary (feature `standalone-binary`) drives the same
//! operations from the command line.

// Module declarations
pub mod archive;
pub mod auth;
pub mod config;
pub mod error;
pub mod feed;
pub mod hasher;
pub mod manifest;
pub mod registry;
pub mod response;
pub mod storage;
pub mod store;
pub mod validation;

// Re-export key types for convenience
pub use archive::{extract_manifest, ArchiveReader, ManifestDocument};
pub use auth::{require_api_key, ApiKeys, KeyValidator, API_KEY_HEADER};
pub use config::Config;
pub use error::{ApiErrorResponse, AppError, AppResult, ErrorCode};
pub use feed::{format_target_framework, render_dependencies, FeedWriter};
pub use hasher::{ArchiveDigest, ContentHasher, StagedArchive};
pub use manifest::{
    determine_dependencies, parse, parse_manifest, Dependency, ManifestMetadata,
    PackageIdentity, ParsedManifest,
};
pub use registry::{IngestedPackage, Registry};
pub use response::WireObject;
pub use storage::PackageLayout;
pub use store::{MemoryStore, NewVersion, OrderBy, PackageStore, SearchFilter, SearchQuery, VersionRecord};
pub use validation::{
    validate_file_size, validate_package_id, validate_safe_path, validate_version,
    ValidationError, ValidationResult, MAX_PATH_DEPTH, MAX_UPLOAD_SIZE, MAX_VERSION_LENGTH,
};
