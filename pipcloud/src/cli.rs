//! CLI interface for pipcloud: argument parsing and the per-invocation
//! pipeline. Build the archives, discover what the build produced, then hand
//! everything to the release coordinator in `pipcloud-core` with one
//! explicitly constructed [`S3Client`].
//!
//! The async [`run`] entrypoint is kept separate from `main` so integration
//! tests can invoke it programmatically with a constructed [`Cli`].

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use pipcloud_core::release::release;

use crate::dist::{self, BuildOptions};
use crate::s3::S3Client;

/// CLI for pipcloud: build a Python package and publish it to an S3-backed
/// pip repository.
#[derive(Parser)]
#[clap(
    name = "pipcloud",
    version,
    about = "Build a Python package and publish it to an S3-backed pip repository"
)]
pub struct Cli {
    /// S3 region
    #[clap(short = 'r', long)]
    pub region: Option<String>,

    /// Overwrite existing packages
    #[clap(short = 'f', long)]
    pub force: bool,

    /// Don't build a wheel
    #[clap(short = 'n', long)]
    pub no_wheel: bool,

    /// Only build a wheel
    #[clap(short = 's', long, conflicts_with = "no_wheel")]
    pub wheel_only: bool,

    /// Verbose output
    #[clap(short = 'v', long)]
    pub verbose: bool,

    /// Path to setup.py
    #[clap(short = 'p', long, default_value = "setup.py")]
    pub setup_path: PathBuf,

    /// Package name
    pub name: String,

    /// S3 bucket name
    pub bucket: String,
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    info!(package = %cli.name, bucket = %cli.bucket, "Starting pipcloud invocation");

    // A failing build is fatal before any upload is attempted.
    dist::build(&BuildOptions {
        setup_path: cli.setup_path.clone(),
        no_wheel: cli.no_wheel,
        wheel_only: cli.wheel_only,
    })
    .await?;

    let files = dist::discover_artifacts(Path::new("dist"))?;
    info!(artifacts = files.len(), "Discovered build artifacts");

    let store = S3Client::new(&cli.bucket, cli.region.as_deref())
        .context("failed to construct the S3 client")?;

    let report = release(&store, &cli.name, &files, cli.force).await?;
    for artifact in &report.artifacts {
        info!(
            file = %artifact.file_name,
            path = %artifact.remote_path,
            content_type = %artifact.content_type,
            "Published artifact"
        );
    }
    info!(
        package = %report.package,
        artifacts = report.artifacts.len(),
        "Release complete"
    );
    Ok(())
}
