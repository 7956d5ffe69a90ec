//! # JSON Response Model
//!
//! Plain response records serialized to the protocol's JSON shape. Every
//! record type names its wire keys in a static table ([`WireObject::key_map`]);
//! one generic routine applies the table, drops absent fields, sorts keys and
//! recurses into nested records.
//!
//! ```rust
//! use nuget_server::response::{SearchResponse, WireObject};
//!
//! let body = SearchResponse { total_hits: 5, data: Vec::new() }.to_json()?;
//! assert_eq!(body, r#"{"data":[],"totalHits":5}"#);
//! # Ok::<(), nuget_server::AppError>(())
//! ```

use crate::error::{AppError, AppResult};
use crate::store::VersionRecord;
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;

/// Internal field name to wire key.
pub type KeyMap = &'static [(&'static str, &'static str)];

/// A field value before translation.
pub enum WireValue<'a> {
    /// Omitted from the output
    Absent,
    Str(&'a str),
    Int(i64),
    Float(f64),
    Bool(bool),
    List(Vec<WireValue<'a>>),
    Object(&'a dyn WireObject),
}

impl<'a> WireValue<'a> {
    pub fn opt_str(value: &'a Option<String>) -> Self {
        value.as_deref().map_or(WireValue::Absent, WireValue::Str)
    }

    pub fn opt_strings(values: &'a Option<Vec<String>>) -> Self {
        match values {
            Some(values) => WireValue::List(values.iter().map(|v| WireValue::Str(v)).collect()),
            None => WireValue::Absent,
        }
    }

    pub fn objects<T: WireObject>(items: &'a [T]) -> Self {
        WireValue::List(
            items
                .iter()
                .map(|item| WireValue::Object(item as &dyn WireObject))
                .collect(),
        )
    }
}

pub trait WireObject {
    /// Renamed fields; fields not listed keep their name.
    fn key_map(&self) -> KeyMap;

    /// Field names and values in declaration order.
    fn fields(&self) -> Vec<(&'static str, WireValue<'_>)>;

    fn to_json_value(&self) -> AppResult<Value>
    where
        Self: Sized,
    {
        to_json_value(self)
    }

    fn to_json(&self) -> AppResult<String>
    where
        Self: Sized,
    {
        Ok(serde_json::to_string(&to_json_value(self)?)?)
    }
}

fn encode(field: &str, value: &WireValue<'_>) -> AppResult<Option<Value>> {
    let encoded = match value {
        WireValue::Absent => return Ok(None),
        WireValue::Str(s) => Value::String((*s).to_string()),
        WireValue::Int(n) => Value::from(*n),
        WireValue::Bool(b) => Value::Bool(*b),
        WireValue::Float(f) => Value::Number(Number::from_f64(*f).ok_or_else(|| {
            AppError::UnserializableField {
                field: field.to_string(),
            }
        })?),
        WireValue::List(items) => {
            let mut encoded = Vec::with_capacity(items.len());
            for item in items {
                if let Some(item) = encode(field, item)? {
                    encoded.push(item);
                }
            }
            Value::Array(encoded)
        }
        WireValue::Object(object) => to_json_value(*object)?,
    };
    Ok(Some(encoded))
}

/// Translate a record into a JSON object with renamed, sorted keys.
pub fn to_json_value(object: &dyn WireObject) -> AppResult<Value> {
    let key_map = object.key_map();
    let mut entries = BTreeMap::new();

    for (name, value) in object.fields() {
        let Some(encoded) = encode(name, &value)? else {
            continue;
        };
        let key = key_map
            .iter()
            .find(|(field, _)| *field == name)
            .map_or(name, |(_, wire)| *wire);
        entries.insert(key.to_string(), encoded);
    }

    Ok(Value::Object(entries.into_iter().collect::<Map<_, _>>()))
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceIndexResponse {
    pub version: String,
    pub resources: Vec<ServiceIndexResourceResponse>,
}

impl ServiceIndexResponse {
    /// The resources this registry serves under `base_url`.
    pub fn for_base_url(base_url: &str) -> Self {
        Self {
            version: "3.0.0".to_string(),
            resources: vec![
                ServiceIndexResourceResponse::new(format!("{base_url}package"), "PackagePublish/2.0.0"),
                ServiceIndexResourceResponse {
                    comment: Some("Query endpoint of the search service".to_string()),
                    ..ServiceIndexResourceResponse::new(
                        format!("{base_url}query"),
                        "SearchQueryService",
                    )
                },
                ServiceIndexResourceResponse::new(
                    format!("{base_url}flatcontainer/"),
                    "PackageBaseAddress/3.0.0",
                ),
            ],
        }
    }
}

impl WireObject for ServiceIndexResponse {
    fn key_map(&self) -> KeyMap {
        &[]
    }

    fn fields(&self) -> Vec<(&'static str, WireValue<'_>)> {
        vec![
            ("version", WireValue::Str(&self.version)),
            ("resources", WireValue::objects(&self.resources)),
        ]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceIndexResourceResponse {
    pub url: String,
    pub resource_type: String,
    pub comment: Option<String>,
}

impl ServiceIndexResourceResponse {
    pub fn new(url: impl Into<String>, resource_type: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            resource_type: resource_type.into(),
            comment: None,
        }
    }
}

impl WireObject for ServiceIndexResourceResponse {
    fn key_map(&self) -> KeyMap {
        &[("url", "@id"), ("resource_type", "@type")]
    }

    fn fields(&self) -> Vec<(&'static str, WireValue<'_>)> {
        vec![
            ("url", WireValue::Str(&self.url)),
            ("resource_type", WireValue::Str(&self.resource_type)),
            ("comment", WireValue::opt_str(&self.comment)),
        ]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchResponse {
    pub total_hits: i64,
    pub data: Vec<SearchResultResponse>,
}

impl SearchResponse {
    /// Group version rows by package, keeping the order packages first appear in.
    pub fn from_records(records: &[VersionRecord], base_url: &str) -> Self {
        let mut groups: Vec<Vec<&VersionRecord>> = Vec::new();
        for record in records {
            let existing = groups
                .iter_mut()
                .find(|group| group[0].package_id.eq_ignore_ascii_case(&record.package_id));
            match existing {
                Some(group) => group.push(record),
                None => groups.push(vec![record]),
            }
        }

        let data: Vec<SearchResultResponse> = groups
            .iter()
            .map(|group| SearchResultResponse::from_group(group, base_url))
            .collect();
        Self {
            total_hits: data.len() as i64,
            data,
        }
    }

    /// Keep one page of packages. `total_hits` still counts every package.
    pub fn paged(mut self, skip: usize, top: Option<usize>) -> Self {
        let end = top.map_or(self.data.len(), |top| skip.saturating_add(top));
        self.data = self.data.into_iter().take(end).skip(skip).collect();
        self
    }
}

impl WireObject for SearchResponse {
    fn key_map(&self) -> KeyMap {
        &[("total_hits", "totalHits")]
    }

    fn fields(&self) -> Vec<(&'static str, WireValue<'_>)> {
        vec![
            ("total_hits", WireValue::Int(self.total_hits)),
            ("data", WireValue::objects(&self.data)),
        ]
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchResultResponse {
    pub id: String,
    pub version: String,
    pub versions: Vec<SearchResultVersionResponse>,
    pub description: Option<String>,
    pub authors: Option<Vec<String>>,
    pub icon_url: Option<String>,
    pub license_url: Option<String>,
    pub owners: Option<Vec<String>>,
    pub project_url: Option<String>,
    pub summary: Option<String>,
    pub tags: Option<Vec<String>>,
    pub title: Option<String>,
    pub total_downloads: Option<i64>,
    pub verified: Option<bool>,
}

fn split_list(value: &Option<String>, separator: char) -> Option<Vec<String>> {
    let items: Vec<String> = value
        .as_deref()?
        .split(separator)
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect();
    (!items.is_empty()).then_some(items)
}

impl SearchResultResponse {
    /// Build one result from the rows of a single package.
    ///
    /// Descriptive fields come from the package's latest version when it is
    /// among the rows, otherwise from the first row.
    fn from_group(group: &[&VersionRecord], base_url: &str) -> Self {
        let primary = group
            .iter()
            .copied()
            .find(|record| record.is_latest())
            .unwrap_or(group[0]);

        Self {
            id: primary.package_id.clone(),
            version: primary.version.clone(),
            versions: group
                .iter()
                .map(|record| SearchResultVersionResponse::from_record(record, base_url))
                .collect(),
            description: primary.description.clone(),
            authors: split_list(&primary.authors, ','),
            icon_url: primary.icon_url.clone(),
            license_url: primary.license_url.clone(),
            owners: split_list(&primary.owners, ','),
            project_url: primary.project_url.clone(),
            summary: primary.summary.clone(),
            tags: split_list(&primary.tags, ' '),
            title: primary.title.clone(),
            total_downloads: Some(primary.package_download_count),
            verified: None,
        }
    }
}

impl WireObject for SearchResultResponse {
    fn key_map(&self) -> KeyMap {
        &[
            ("icon_url", "iconUrl"),
            ("license_url", "licenseUrl"),
            ("project_url", "projectUrl"),
            ("total_downloads", "totalDownloads"),
        ]
    }

    fn fields(&self) -> Vec<(&'static str, WireValue<'_>)> {
        vec![
            ("id", WireValue::Str(&self.id)),
            ("version", WireValue::Str(&self.version)),
            ("versions", WireValue::objects(&self.versions)),
            ("description", WireValue::opt_str(&self.description)),
            ("authors", WireValue::opt_strings(&self.authors)),
            ("icon_url", WireValue::opt_str(&self.icon_url)),
            ("license_url", WireValue::opt_str(&self.license_url)),
            ("owners", WireValue::opt_strings(&self.owners)),
            ("project_url", WireValue::opt_str(&self.project_url)),
            ("summary", WireValue::opt_str(&self.summary)),
            ("tags", WireValue::opt_strings(&self.tags)),
            ("title", WireValue::opt_str(&self.title)),
            (
                "total_downloads",
                self.total_downloads.map_or(WireValue::Absent, WireValue::Int),
            ),
            ("verified", self.verified.map_or(WireValue::Absent, WireValue::Bool)),
        ]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchResultVersionResponse {
    pub id: String,
    pub version: String,
    pub downloads: i64,
}

impl SearchResultVersionResponse {
    fn from_record(record: &VersionRecord, base_url: &str) -> Self {
        Self {
            id: format!(
                "{base_url}Packages(Id='{}',Version='{}')",
                record.package_id, record.version
            ),
            version: record.version.clone(),
            downloads: record.version_download_count,
        }
    }
}

impl WireObject for SearchResultVersionResponse {
    fn key_map(&self) -> KeyMap {
        &[("id", "@id")]
    }

    fn fields(&self) -> Vec<(&'static str, WireValue<'_>)> {
        vec![
            ("id", WireValue::Str(&self.id)),
            ("version", WireValue::Str(&self.version)),
            ("downloads", WireValue::Int(self.downloads)),
        ]
    }
}

/// Version listing of one package, lowest version first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataResponse {
    pub versions: Vec<String>,
}

impl MetadataResponse {
    /// Versions are lowercased, as clients request them in package base URLs.
    pub fn from_records(records: &[VersionRecord]) -> Self {
        let mut versions: Vec<&VersionRecord> = records.iter().collect();
        versions.sort_by(|a, b| crate::store::compare_versions(&a.version, &b.version));
        Self {
            versions: versions
                .into_iter()
                .map(|record| record.version.to_lowercase())
                .collect(),
        }
    }
}

impl WireObject for MetadataResponse {
    fn key_map(&self) -> KeyMap {
        &[]
    }

    fn fields(&self) -> Vec<(&'static str, WireValue<'_>)> {
        vec![(
            "versions",
            WireValue::List(self.versions.iter().map(|v| WireValue::Str(v)).collect()),
        )]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    const BASE: &str = "http://localhost:5000/api/v2/";

    fn record(id: &str, version: &str, latest: &str, downloads: i64) -> VersionRecord {
        VersionRecord {
            package_id: id.to_string(),
            version: version.to_string(),
            title: Some(format!("{id} title")),
            description: Some("desc".to_string()),
            summary: None,
            release_notes: None,
            tags: Some("alpha  beta".to_string()),
            license_url: None,
            project_url: Some("https://example.com".to_string()),
            icon_url: None,
            authors: Some("Doug, Alice".to_string()),
            owners: None,
            copyright: None,
            language: None,
            min_client_version: None,
            dependencies: None,
            package_hash: String::new(),
            package_hash_algorithm: "SHA512".to_string(),
            package_size: 1,
            require_license_acceptance: false,
            is_prerelease: false,
            version_download_count: downloads,
            created: Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap(),
            package_download_count: 7,
            latest_version: Some(latest.to_string()),
        }
    }

    struct Scored {
        score: f64,
    }

    impl WireObject for Scored {
        fn key_map(&self) -> KeyMap {
            &[]
        }

        fn fields(&self) -> Vec<(&'static str, WireValue<'_>)> {
            vec![("score", WireValue::Float(self.score))]
        }
    }

    #[test]
    fn test_search_response_renames_total_hits() {
        let body = SearchResponse {
            total_hits: 5,
            data: Vec::new(),
        }
        .to_json_value()
        .unwrap();
        assert_eq!(body, json!({ "totalHits": 5, "data": [] }));
        assert!(body.get("total_hits").is_none());
    }

    #[test]
    fn test_absent_fields_are_omitted() {
        let resource = ServiceIndexResourceResponse::new("http://x/query", "SearchQueryService");
        assert_eq!(
            resource.to_json().unwrap(),
            r#"{"@id":"http://x/query","@type":"SearchQueryService"}"#
        );

        let with_comment = ServiceIndexResourceResponse {
            comment: Some("hello".to_string()),
            ..resource
        };
        assert_eq!(
            with_comment.to_json().unwrap(),
            r#"{"@id":"http://x/query","@type":"SearchQueryService","comment":"hello"}"#
        );
    }

    #[test]
    fn test_service_index_nests_resources() {
        let index = ServiceIndexResponse::for_base_url(BASE).to_json_value().unwrap();
        assert_eq!(index["version"], "3.0.0");
        let resources = index["resources"].as_array().unwrap();
        assert_eq!(resources.len(), 3);
        assert_eq!(resources[0]["@id"], "http://localhost:5000/api/v2/package");
        assert_eq!(resources[0]["@type"], "PackagePublish/2.0.0");
        assert!(resources[0].get("comment").is_none());
        assert!(resources[1]["comment"].is_string());
    }

    #[test]
    fn test_keys_are_sorted() {
        let version = SearchResultVersionResponse {
            id: "x".to_string(),
            version: "1.0.0".to_string(),
            downloads: 3,
        };
        assert_eq!(
            version.to_json().unwrap(),
            r#"{"@id":"x","downloads":3,"version":"1.0.0"}"#
        );
    }

    #[test]
    fn test_search_response_from_records() {
        let records = vec![
            record("Alpha", "1.0.0", "2.0.0", 4),
            record("Beta", "0.1.0", "0.1.0", 1),
            record("alpha", "2.0.0", "2.0.0", 3),
        ];
        let response = SearchResponse::from_records(&records, BASE);
        assert_eq!(response.total_hits, 2);

        let alpha = &response.data[0];
        assert_eq!(alpha.version, "2.0.0");
        assert_eq!(alpha.versions.len(), 2);
        assert_eq!(alpha.tags, Some(vec!["alpha".to_string(), "beta".to_string()]));
        assert_eq!(alpha.authors, Some(vec!["Doug".to_string(), "Alice".to_string()]));

        let body = response.to_json_value().unwrap();
        let first = &body["data"][0];
        assert_eq!(first["id"], "alpha");
        assert_eq!(first["totalDownloads"], 7);
        assert_eq!(first["projectUrl"], "https://example.com");
        assert!(first.get("iconUrl").is_none());
        assert!(first.get("verified").is_none());
        assert_eq!(
            first["versions"][0],
            json!({
                "@id": "http://localhost:5000/api/v2/Packages(Id='Alpha',Version='1.0.0')",
                "version": "1.0.0",
                "downloads": 4
            })
        );
    }

    #[test]
    fn test_search_response_pages_packages() {
        let records = vec![
            record("Alpha", "1.0.0", "2.0.0", 4),
            record("Alpha", "2.0.0", "2.0.0", 3),
            record("Beta", "0.1.0", "0.1.0", 1),
            record("Gamma", "1.0.0", "1.0.0", 0),
        ];
        let ids = |response: &SearchResponse| -> Vec<String> {
            response.data.iter().map(|result| result.id.clone()).collect()
        };

        let first = SearchResponse::from_records(&records, BASE).paged(0, Some(2));
        assert_eq!(first.total_hits, 3);
        assert_eq!(ids(&first), ["Alpha", "Beta"]);
        assert_eq!(first.data[0].versions.len(), 2);

        let rest = SearchResponse::from_records(&records, BASE).paged(2, None);
        assert_eq!(rest.total_hits, 3);
        assert_eq!(ids(&rest), ["Gamma"]);

        let past_end = SearchResponse::from_records(&records, BASE).paged(5, Some(usize::MAX));
        assert_eq!(past_end.total_hits, 3);
        assert!(past_end.data.is_empty());
    }

    #[test]
    fn test_metadata_response() {
        let records = vec![
            record("A", "1.0.0-RC", "1.0.0", 0),
            record("A", "1.0.0", "1.0.0", 0),
            record("A", "0.9.0", "1.0.0", 0),
        ];
        let body = MetadataResponse::from_records(&records).to_json_value().unwrap();
        assert_eq!(body, json!({ "versions": ["0.9.0", "1.0.0-rc", "1.0.0"] }));
    }

    #[test]
    fn test_non_finite_float_is_unserializable() {
        assert_eq!(
            Scored { score: 0.5 }.to_json().unwrap(),
            r#"{"score":0.5}"#
        );
        assert!(matches!(
            Scored { score: f64::NAN }.to_json(),
            Err(AppError::UnserializableField { field }) if field == "score"
        ));
    }
}
