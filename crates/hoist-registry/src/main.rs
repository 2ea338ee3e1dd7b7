//! hoist-registry - Artifact Store and Manifest Service
//!
//! Serves releases over HTTP and offers the publishing side of the workflow:
//! - `serve`: run the HTTP API
//! - `pack`: build a bundle from an installation tree
//! - `publish`: add a bundle to a channel (local store or remote registry)
//! - `list`: show the versions on a channel

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use hoist_common::bundle::pack_dir;
use hoist_common::paths::read_installed_version;
use hoist_common::release::{Release, DEFAULT_CHANNEL};
use hoist_common::state::format_age;
use hoist_registry::server::{self, ServeOptions, DEFAULT_MAX_UPLOAD_BYTES};
use hoist_registry::{ArtifactStore, ManifestService};
use std::fs;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

const DEFAULT_ROOT: &str = "/var/lib/hoist-registry";

#[derive(Parser)]
#[command(name = "hoist-registry")]
#[command(about = "Release registry for hoist self-updating services", long_about = None)]
#[command(version)]
struct Cli {
    /// Store root (releases live under <root>/<channel>/<version>/)
    #[arg(long, global = true, default_value = DEFAULT_ROOT)]
    root: PathBuf,

    /// Comma-separated closed set of channels
    #[arg(long, global = true, value_delimiter = ',', default_value = "stable,testing")]
    channels: Vec<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API
    Serve {
        /// Listen address
        #[arg(long, default_value = "0.0.0.0:8080")]
        listen: String,

        /// Largest accepted upload, in MiB
        #[arg(long, default_value_t = DEFAULT_MAX_UPLOAD_BYTES / (1024 * 1024))]
        max_upload_mb: usize,
    },

    /// Build a bundle (tar.gz) from an installation tree with a VERSION file
    Pack {
        /// Installation tree
        dir: PathBuf,
        /// Output file
        out: PathBuf,
    },

    /// Publish a bundle on a channel
    Publish {
        /// Bundle to publish
        artifact: PathBuf,

        #[arg(long, default_value = DEFAULT_CHANNEL)]
        channel: String,

        /// Release version (must match the bundle's VERSION file)
        #[arg(long)]
        version: String,

        /// File containing release notes
        #[arg(long)]
        notes: Option<PathBuf>,

        /// Publish through a running registry instead of the local store
        #[arg(long)]
        server: Option<String>,
    },

    /// List versions on a channel, newest first
    List {
        #[arg(long, default_value = DEFAULT_CHANNEL)]
        channel: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Serve {
            listen,
            max_upload_mb,
        } => {
            server::run(ServeOptions {
                listen,
                root: cli.root,
                channels: cli.channels,
                max_upload_bytes: max_upload_mb.saturating_mul(1024 * 1024),
            })
            .await
        }
        Commands::Pack { dir, out } => {
            let version = read_installed_version(&dir)
                .with_context(|| format!("{} has no VERSION file", dir.display()))?;
            pack_dir(&dir, &out).with_context(|| format!("packing {}", dir.display()))?;
            let size = fs::metadata(&out)?.len();
            println!("Packed {} ({}) -> {} ({} bytes)", dir.display(), version, out.display(), size);
            Ok(())
        }
        Commands::Publish {
            artifact,
            channel,
            version,
            notes,
            server,
        } => {
            let bytes = fs::read(&artifact)
                .with_context(|| format!("reading {}", artifact.display()))?;
            let notes = match notes {
                Some(path) => fs::read_to_string(&path)
                    .with_context(|| format!("reading notes {}", path.display()))?,
                None => String::new(),
            };

            let release = match server {
                Some(url) => publish_remote(&url, &channel, &version, bytes, &notes).await?,
                None => {
                    let manifest = ManifestService::new(ArtifactStore::new(&cli.root), cli.channels);
                    manifest.publish(&channel, &version, &bytes, &notes).await?
                }
            };
            println!(
                "Published {} on {} ({} bytes, sha256 {})",
                release.version, release.channel, release.size_bytes, release.checksum
            );
            Ok(())
        }
        Commands::List { channel } => {
            let manifest = ManifestService::new(ArtifactStore::new(&cli.root), cli.channels);
            let listing = manifest.list(&channel)?;
            if listing.versions.is_empty() {
                println!("No releases on {}", channel);
                return Ok(());
            }
            let now = chrono::Utc::now();
            for entry in listing.versions {
                let age = (now - entry.published_at).num_seconds().max(0) as u64;
                println!(
                    "{:<14} {:>12} bytes  {}",
                    entry.version,
                    entry.size_bytes,
                    format_age(age)
                );
            }
            Ok(())
        }
    }
}

async fn publish_remote(
    base_url: &str,
    channel: &str,
    version: &str,
    bytes: Vec<u8>,
    notes: &str,
) -> Result<Release> {
    let url = format!(
        "{}/api/publish/{}/{}",
        base_url.trim_end_matches('/'),
        channel,
        version
    );
    let response = reqwest::Client::new()
        .post(&url)
        .query(&[("notes", notes)])
        .header(reqwest::header::CONTENT_TYPE, "application/gzip")
        .body(bytes)
        .send()
        .await
        .with_context(|| format!("POST {}", url))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        bail!("registry refused publish ({}): {}", status, body);
    }
    Ok(response.json().await?)
}
