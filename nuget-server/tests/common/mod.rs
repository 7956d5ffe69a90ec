//! Common test utilities and helpers
//!
//! Builds package archives in memory and registries backed by temporary
//! directories, so each integration test runs against its own storage root.

#![allow(dead_code)]

use anyhow::Result;
use nuget_server::{ApiKeys, Config, MemoryStore, Registry};
use std::io::{Cursor, Write};
use tempfile::TempDir;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

pub const API_KEY: &str = "test-key";
pub const BASE_URL: &str = "http://packages.example.test/api/v2/";

pub type TestRegistry = Registry<MemoryStore, ApiKeys>;

/// Test registry setup result
pub struct TestSetup {
    pub temp_dir: TempDir,
    pub registry: TestRegistry,
}

/// Config rooted in `temp_dir` with a single accepted API key.
pub fn test_config(temp_dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.server.base_url = BASE_URL.to_string();
    config.storage.server_path = temp_dir.path().to_path_buf();
    config.security.api_keys = vec![API_KEY.to_string()];
    config
}

pub fn create_test_setup() -> Result<TestSetup> {
    let temp_dir = TempDir::new()?;
    let registry = registry_for(&temp_dir);
    Ok(TestSetup { temp_dir, registry })
}

/// A fresh registry over an existing storage root.
pub fn registry_for(temp_dir: &TempDir) -> TestRegistry {
    let config = test_config(temp_dir);
    let keys = ApiKeys::from_config(&config.security);
    Registry::new(config, MemoryStore::new(), keys)
}

/// Manifest with identity, a few descriptive fields and optional extra metadata.
pub fn nuspec(id: &str, version: &str, extra_metadata: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<package xmlns="http://schemas.microsoft.com/packaging/2013/05/nuspec.xsd">
  <metadata>
    <id>{id}</id>
    <version>{version}</version>
    <title>{id} Library</title>
    <authors>Alice, Bob</authors>
    <owners>Alice</owners>
    <description>Utilities for {id}</description>
    <tags>utility test</tags>
    {extra_metadata}
  </metadata>
</package>"#
    )
}

/// Zip archive holding `entries` as (name, content) pairs.
pub fn build_archive(entries: &[(&str, &[u8])]) -> Result<Cursor<Vec<u8>>> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, content) in entries {
        writer.start_file(*name, SimpleFileOptions::default())?;
        writer.write_all(content)?;
    }
    let mut cursor = writer.finish()?;
    cursor.set_position(0);
    Ok(cursor)
}

/// A package archive with the usual layout around its manifest.
pub fn build_package(id: &str, version: &str, extra_metadata: &str) -> Result<Cursor<Vec<u8>>> {
    let manifest = nuspec(id, version, extra_metadata);
    let manifest_name = format!("{id}.nuspec");
    let assembly_name = format!("lib/net6.0/{id}.dll");
    build_archive(&[
        ("[Content_Types].xml", b"<Types/>".as_slice()),
        ("_rels/.rels", b"<Relationships/>".as_slice()),
        (manifest_name.as_str(), manifest.as_bytes()),
        (assembly_name.as_str(), b"MZ\x90\x00".as_slice()),
    ])
}

/// Upload a minimal package with the test key.
pub fn push(registry: &TestRegistry, id: &str, version: &str) -> Result<()> {
    registry.upload(Some(API_KEY), build_package(id, version, "")?)?;
    Ok(())
}
