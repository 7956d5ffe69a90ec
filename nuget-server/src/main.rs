//! Standalone registry CLI binary
//!
//! Drives the registry core against a package directory on disk: inspect an
//! archive, push it into storage, and print the feeds and search responses
//! clients would receive.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use nuget_logging::{init_subscriber, LogSettings};
use nuget_server::{
    ApiKeys, Config, MemoryStore, OrderBy, PackageStore, Registry, SearchFilter, SearchQuery,
};
use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "nuget-server")]
#[command(about = "NuGet package registry core - ingest archives and render feeds")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the JSON configuration file
    #[arg(long, default_value = "nuget-server.json", global = true)]
    config: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the identity and dependencies declared by an archive
    Inspect {
        /// Package archive (.nupkg)
        archive: PathBuf,
    },

    /// Validate, hash and store an archive
    Push {
        /// Package archive (.nupkg)
        archive: PathBuf,

        /// API key checked against the configured keys
        #[arg(long)]
        api_key: Option<String>,
    },

    /// Print the Atom feed for stored packages
    Feed {
        /// Restrict the feed to one package id
        #[arg(long)]
        id: Option<String>,

        /// Restrict the feed to one version (requires --id)
        #[arg(long, requires = "id")]
        version: Option<String>,
    },

    /// Search stored packages
    Search {
        /// Substring matched against package id and title
        term: Option<String>,

        /// Include prerelease versions
        #[arg(long)]
        prerelease: bool,

        /// Only the latest version of each package
        #[arg(long)]
        latest: bool,

        /// Ordering clause, e.g. "DownloadCount desc"
        #[arg(long)]
        order_by: Option<String>,

        #[arg(long, default_value = "0")]
        skip: usize,

        #[arg(long)]
        top: Option<usize>,

        /// Print the JSON search response instead of the Atom feed
        #[arg(long)]
        json: bool,
    },

    /// Print the service index document
    Index,
}

fn main() -> Result<()> {
    let settings = LogSettings::from_env();
    let _guard = init_subscriber(&settings);

    let cli = Cli::parse();
    let config = Config::load_or_default(&cli.config)
        .with_context(|| format!("Failed to load config from {}", cli.config.display()))?;
    let keys = ApiKeys::from_config(&config.security);
    let registry = Registry::new(config, MemoryStore::new(), keys);

    match cli.command {
        Commands::Inspect { archive } => {
            let file = File::open(&archive)
                .with_context(|| format!("Failed to open {}", archive.display()))?;
            let parsed = registry.inspect(file)?;
            let identity = parsed.identity()?;
            println!("{} {}", identity.id(), identity.version());
            if parsed.dependencies.is_empty() {
                println!("  (no dependencies)");
            }
            for dependency in &parsed.dependencies {
                match &dependency.framework {
                    Some(framework) => println!(
                        "  {} {} [{}]",
                        dependency.id, dependency.version_range, framework
                    ),
                    None => println!("  {} {}", dependency.id, dependency.version_range),
                }
            }
        }
        Commands::Push { archive, api_key } => {
            let file = File::open(&archive)
                .with_context(|| format!("Failed to open {}", archive.display()))?;
            let ingested = registry.upload(api_key.as_deref(), file)?;
            info!(package = %ingested.identity, "Pushed package");
            println!(
                "Stored {} at {} ({} bytes, {} {})",
                ingested.identity,
                ingested.path.display(),
                ingested.digest.size_bytes,
                ingested.digest.algorithm,
                ingested.digest.to_base64()
            );
        }
        Commands::Feed { id, version } => {
            load_packages(&registry)?;
            let body = match id {
                Some(id) => registry.find_packages_by_id(&id, version.as_deref())?,
                None => registry.search_feed(&SearchQuery {
                    include_prerelease: true,
                    ..SearchQuery::default()
                })?,
            };
            write_body(&body)?;
        }
        Commands::Search {
            term,
            prerelease,
            latest,
            order_by,
            skip,
            top,
            json,
        } => {
            load_packages(&registry)?;
            let query = SearchQuery {
                term,
                include_prerelease: prerelease,
                filter: latest.then_some(SearchFilter::IsLatestVersion),
                order_by: order_by
                    .as_deref()
                    .map(str::parse::<OrderBy>)
                    .transpose()?
                    .unwrap_or_default(),
                skip,
                top,
            };
            let body = if json {
                registry.search_json(&query)?
            } else {
                registry.search_feed(&query)?
            };
            write_body(&body)?;
        }
        Commands::Index => {
            write_body(&registry.service_index()?)?;
        }
    }

    Ok(())
}

fn load_packages<S: PackageStore>(registry: &Registry<S, ApiKeys>) -> Result<()> {
    let loaded = registry
        .rebuild_from_disk()
        .context("Failed to load stored packages")?;
    info!(packages = loaded, "Loaded packages from disk");
    Ok(())
}

fn write_body(body: &[u8]) -> Result<()> {
    let mut stdout = io::stdout().lock();
    stdout.write_all(body)?;
    writeln!(stdout)?;
    Ok(())
}
