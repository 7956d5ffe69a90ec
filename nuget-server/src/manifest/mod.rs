//! Package manifest (`.nuspec`) parsing
//!
//! This module turns the XML manifest extracted from an archive into the
//! package identity, descriptive metadata and dependency list stored on a
//! version row.

use crate::error::{AppError, AppResult};
use crate::validation;
use std::fmt;
use std::hash::{Hash, Hasher};
use tracing::{debug, warn};

mod dependencies;
mod tree;

pub use dependencies::{decode_dependencies, determine_dependencies, encode_dependencies, Dependency};
pub use tree::{parse_document, Element};

/// Namespace written by current packaging tools.
pub const NUSPEC_NAMESPACE: &str = "http://schemas.microsoft.com/packaging/2013/05/nuspec.xsd";

/// Package id and version.
///
/// The id keeps the casing the manifest declared but compares and hashes
/// case-insensitively.
#[derive(Debug, Clone, Eq)]
pub struct PackageIdentity {
    id: String,
    version: String,
}

impl PackageIdentity {
    /// Build a validated identity.
    pub fn new(id: impl Into<String>, version: impl Into<String>) -> AppResult<Self> {
        let id = validation::validate_package_id(&id.into())?;
        let version = validation::validate_version(&version.into())?;
        Ok(Self { id, version })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn is_prerelease(&self) -> bool {
        validation::is_prerelease(&self.version)
    }
}

impl PartialEq for PackageIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.id.eq_ignore_ascii_case(&other.id) && self.version == other.version
    }
}

impl Hash for PackageIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.to_ascii_lowercase().hash(state);
        self.version.hash(state);
    }
}

impl fmt::Display for PackageIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.id, self.version)
    }
}

/// Descriptive fields of the `metadata` element.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManifestMetadata {
    pub title: Option<String>,
    pub description: Option<String>,
    pub summary: Option<String>,
    pub authors: Option<String>,
    pub owners: Option<String>,
    pub tags: Option<String>,
    pub license_url: Option<String>,
    pub project_url: Option<String>,
    pub icon_url: Option<String>,
    pub release_notes: Option<String>,
    pub copyright: Option<String>,
    pub language: Option<String>,
    pub min_client_version: Option<String>,
    pub require_license_acceptance: bool,
}

impl ManifestMetadata {
    fn from_element(metadata: &Element, namespace: &str) -> Self {
        let text = |name: &str| {
            metadata
                .find(namespace, name)
                .and_then(Element::text)
                .map(str::to_string)
        };

        Self {
            title: text("title"),
            description: text("description"),
            summary: text("summary"),
            authors: text("authors"),
            owners: text("owners"),
            tags: text("tags"),
            license_url: text("licenseUrl"),
            project_url: text("projectUrl"),
            icon_url: text("iconUrl"),
            release_notes: text("releaseNotes"),
            copyright: text("copyright"),
            language: text("language"),
            min_client_version: metadata.attribute("minClientVersion").map(str::to_string),
            require_license_acceptance: text("requireLicenseAcceptance")
                .is_some_and(|flag| flag.eq_ignore_ascii_case("true")),
        }
    }
}

/// Result of parsing a manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedManifest {
    /// The `metadata` element itself, for callers needing fields not lifted below
    pub metadata_node: Element,
    pub metadata: ManifestMetadata,
    /// Text of `metadata/id`, as declared
    pub id: String,
    /// Text of `metadata/version`, as declared
    pub version: String,
    pub dependencies: Vec<Dependency>,
}

impl ParsedManifest {
    /// Validate the declared id and version.
    pub fn identity(&self) -> AppResult<PackageIdentity> {
        PackageIdentity::new(&self.id, &self.version)
    }
}

/// Parse a manifest whose elements live in `namespace`.
///
/// # Errors
///
/// - [`AppError::MetadataMissing`] when the root has no `metadata` child
/// - [`AppError::IdentityMissing`] when `metadata/id` or `metadata/version`
///   is absent or empty
pub fn parse(manifest_xml: &str, namespace: &str) -> AppResult<ParsedManifest> {
    let root = parse_document(manifest_xml)?;
    parse_root(root, namespace)
}

/// Parse a manifest using the namespace declared on its root element.
pub fn parse_manifest(manifest_xml: &str) -> AppResult<ParsedManifest> {
    let root = parse_document(manifest_xml)?;
    let namespace = root.namespace.clone().unwrap_or_default();
    debug!(namespace = %namespace, "Resolved manifest namespace");
    parse_root(root, &namespace)
}

fn parse_root(mut root: Element, namespace: &str) -> AppResult<ParsedManifest> {
    let position = root
        .children
        .iter()
        .position(|child| child.name == "metadata" && child.in_namespace(namespace));
    let Some(position) = position else {
        warn!("Unable to find the metadata element");
        return Err(AppError::MetadataMissing);
    };
    let metadata_node = root.children.swap_remove(position);

    let field = |name: &'static str| {
        metadata_node
            .find(namespace, name)
            .and_then(Element::text)
            .map(str::to_string)
            .ok_or_else(|| {
                warn!(field = name, "ID or version missing from manifest");
                AppError::IdentityMissing { field: name }
            })
    };
    let id = field("id")?;
    let version = field("version")?;

    let dependencies = determine_dependencies(&metadata_node, namespace)?;
    let metadata = ManifestMetadata::from_element(&metadata_node, namespace);

    debug!(package_id = %id, version = %version, dependencies = dependencies.len(), "Parsed manifest");
    Ok(ParsedManifest {
        metadata_node,
        metadata,
        id,
        version,
        dependencies,
    })
}
