//! # Atom/OData Package Feeds
//!
//! Renders stored version rows into the XML feed format package clients
//! consume for list, search and install queries. Each row becomes one Atom
//! `entry` whose `m:properties` children are typed OData properties in a
//! fixed order, so identical rows always produce identical bytes.

use crate::config::Config;
use crate::error::AppResult;
use crate::store::VersionRecord;
use chrono::{DateTime, Utc};
use tracing::debug;

mod node;
mod properties;

pub use node::XmlNode;
pub use properties::{
    add_meta, add_property, add_with_attributes, format_date, format_target_framework,
    render_dependencies, EdmType, PropertyValue,
};

pub const ATOM_NAMESPACE: &str = "http://www.w3.org/2005/Atom";
pub const APP_NAMESPACE: &str = "http://www.w3.org/2007/app";
pub const DATA_NAMESPACE: &str = "http://schemas.microsoft.com/ado/2007/08/dataservices";
pub const METADATA_NAMESPACE: &str =
    "http://schemas.microsoft.com/ado/2007/08/dataservices/metadata";
const SCHEME: &str = "http://schemas.microsoft.com/ado/2007/08/dataservices/scheme";
const ENTRY_TYPE: &str = "NuGetGallery.V2FeedPackage";

/// Renders feeds for one collection under a base URL.
#[derive(Debug, Clone)]
pub struct FeedWriter {
    feed_id: String,
    base_url: String,
    collection_title: String,
}

impl FeedWriter {
    /// `base_url` must end with `/`; [`Config::base_url`] guarantees it.
    pub fn new(feed_id: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            feed_id: feed_id.into(),
            base_url: base_url.into(),
            collection_title: "Packages".to_string(),
        }
    }

    pub fn from_config(feed_id: impl Into<String>, config: &Config) -> Self {
        Self {
            collection_title: config.server.feed_title.clone(),
            ..Self::new(feed_id, config.base_url())
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Render a complete feed document.
    ///
    /// The feed's `updated` stamp is the newest entry's `created`, or the
    /// epoch for an empty feed.
    pub fn render(&self, records: &[VersionRecord]) -> AppResult<Vec<u8>> {
        let updated = records
            .iter()
            .map(|record| record.created)
            .max()
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

        let mut feed = self.begin_feed(updated);
        for record in records {
            feed.add_child(self.render_entry(record));
        }

        debug!(feed = %self.feed_id, entries = records.len(), "Rendered feed");
        feed.to_document()
    }

    fn begin_feed(&self, updated: DateTime<Utc>) -> XmlNode {
        let mut feed = XmlNode::new("feed")
            .with_attribute("xml:base", &self.base_url)
            .with_attribute("xmlns", ATOM_NAMESPACE)
            .with_attribute("xmlns:d", DATA_NAMESPACE)
            .with_attribute("xmlns:m", METADATA_NAMESPACE);

        feed.add_child(XmlNode::new("id").with_text(format!("{}{}", self.base_url, self.feed_id)));
        add_with_attributes(&mut feed, "title", Some(self.feed_id.as_str()), &[("type", "text")]);
        feed.add_child(XmlNode::new("updated").with_text(format_date(&updated)));
        add_with_attributes(
            &mut feed,
            "link",
            None,
            &[("rel", "self"), ("title", self.feed_id.as_str()), ("href", self.feed_id.as_str())],
        );
        feed
    }

    /// Render one row as an Atom entry.
    pub fn render_entry(&self, record: &VersionRecord) -> XmlNode {
        let resource = format!(
            "Packages(Id='{}',Version='{}')",
            record.package_id, record.version
        );
        let created = format_date(&record.created);

        let mut entry = XmlNode::new("entry");
        entry.add_child(XmlNode::new("id").with_text(format!("{}{}", self.base_url, resource)));
        add_with_attributes(
            &mut entry,
            "category",
            None,
            &[("term", ENTRY_TYPE), ("scheme", SCHEME)],
        );
        add_with_attributes(
            &mut entry,
            "link",
            None,
            &[("rel", "edit"), ("title", "V2FeedPackage"), ("href", resource.as_str())],
        );
        add_with_attributes(&mut entry, "title", Some(record.package_id.as_str()), &[("type", "text")]);
        add_with_attributes(
            &mut entry,
            "summary",
            record.summary.as_deref(),
            &[("type", "text")],
        );
        entry.add_child(XmlNode::new("updated").with_text(created));
        entry.add_child(
            XmlNode::new("author").with_child(
                XmlNode::new("name").with_text(record.authors.clone().unwrap_or_default()),
            ),
        );
        let download = format!(
            "{}download/{}/{}",
            self.base_url, record.package_id, record.version
        );
        add_with_attributes(
            &mut entry,
            "content",
            None,
            &[("type", "application/zip"), ("src", download.as_str())],
        );

        entry.add_child(self.render_properties(record));
        entry
    }

    /// The `m:properties` block of an entry, including derived fields.
    pub fn render_properties(&self, record: &VersionRecord) -> XmlNode {
        let latest = record.is_latest();
        let gallery_url = format!(
            "{}details/{}/{}",
            self.base_url, record.package_id, record.version
        );
        let text = |value: &Option<String>| PropertyValue::text(value.as_deref());
        let empty = || PropertyValue::Text(String::new());

        let fields: [(&str, PropertyValue); 31] = [
            ("Id", PropertyValue::Text(record.package_id.clone())),
            (
                "MinClientVersion",
                PropertyValue::Text(record.min_client_version.clone().unwrap_or_default()),
            ),
            (
                "Dependencies",
                PropertyValue::Text(render_dependencies(record.dependencies.as_deref())),
            ),
            (
                "VersionDownloadCount",
                PropertyValue::Integer(record.version_download_count),
            ),
            ("ReleaseNotes", text(&record.release_notes)),
            ("Version", PropertyValue::Text(record.version.clone())),
            ("LicenseUrl", text(&record.license_url)),
            ("Tags", text(&record.tags)),
            ("Language", text(&record.language)),
            ("ProjectUrl", text(&record.project_url)),
            ("IconUrl", text(&record.icon_url)),
            (
                "PackageHashAlgorithm",
                PropertyValue::Text(record.package_hash_algorithm.clone()),
            ),
            ("PackageHash", PropertyValue::Text(record.package_hash.clone())),
            ("Title", text(&record.title)),
            ("PackageSize", PropertyValue::Integer(record.package_size)),
            (
                "DownloadCount",
                PropertyValue::Integer(record.package_download_count),
            ),
            ("NormalizedVersion", PropertyValue::Text(record.version.clone())),
            ("Created", PropertyValue::Timestamp(record.created)),
            ("Description", text(&record.description)),
            ("LicenseNames", empty()),
            ("Summary", text(&record.summary)),
            ("LastEdited", PropertyValue::Null(Some(EdmType::DateTime))),
            ("IsPrerelease", PropertyValue::Bool(record.is_prerelease)),
            (
                "RequireLicenseAcceptance",
                PropertyValue::Bool(record.require_license_acceptance),
            ),
            ("Copyright", text(&record.copyright)),
            ("ReportAbuseUrl", empty()),
            ("IsAbsoluteLatestVersion", PropertyValue::Bool(latest)),
            ("IsLatestVersion", PropertyValue::Bool(latest)),
            ("Published", PropertyValue::Timestamp(record.created)),
            ("GalleryDetailsUrl", PropertyValue::Text(gallery_url)),
            ("LicenseReportUrl", empty()),
        ];

        let mut properties = XmlNode::new("m:properties");
        for (name, value) in &fields {
            add_property(&mut properties, name, value);
        }
        properties
    }

    /// AtomPub service root advertising the `Packages` collection.
    pub fn render_service_document(&self) -> AppResult<Vec<u8>> {
        let service = XmlNode::new("service")
            .with_attribute("xml:base", &self.base_url)
            .with_attribute("xmlns", APP_NAMESPACE)
            .with_attribute("xmlns:atom", ATOM_NAMESPACE)
            .with_child(
                XmlNode::new("workspace")
                    .with_child(XmlNode::new("atom:title").with_text("Default"))
                    .with_child(
                        XmlNode::new("collection")
                            .with_attribute("href", "Packages")
                            .with_child(
                                XmlNode::new("atom:title").with_text(&self.collection_title),
                            ),
                    ),
            );
        service.to_document()
    }
}
