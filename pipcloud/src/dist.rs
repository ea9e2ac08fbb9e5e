//! External build step: shells out to `python setup.py` to produce the
//! distributable archives, then collects whatever landed in `dist/`.
//!
//! The build tool's output is not parsed for anything; the package name is an
//! explicit CLI argument, so the build step's only contract is its exit
//! status and the files it leaves behind.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tokio::process::Command;
use tracing::{debug, info};

/// Which archive formats the build step should produce.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub setup_path: PathBuf,
    pub no_wheel: bool,
    pub wheel_only: bool,
}

/// Assembles the `python setup.py ...` argv for the flag combination:
/// an sdist tarball unless `--wheel-only`, a wheel unless `--no-wheel`.
pub fn build_command(options: &BuildOptions) -> Vec<String> {
    let mut argv = vec![
        "python".to_string(),
        options.setup_path.display().to_string(),
    ];
    if !options.wheel_only {
        argv.extend(["sdist", "--formats", "gztar"].map(String::from));
    }
    if !options.no_wheel || options.wheel_only {
        argv.push("bdist_wheel".to_string());
    }
    argv
}

/// Runs the build command. Any non-zero exit (or failure to spawn) is fatal
/// and aborts the invocation before anything is uploaded.
pub async fn build(options: &BuildOptions) -> Result<()> {
    let argv = build_command(options);
    info!(command = %argv.join(" "), "Running build step");

    let output = Command::new(&argv[0])
        .args(&argv[1..])
        .output()
        .await
        .with_context(|| format!("failed to run build command {:?}", argv.join(" ")))?;

    debug!(status = ?output.status, "Build step finished");
    if !output.status.success() {
        bail!(
            "build step {:?} failed with {}: {}",
            argv.join(" "),
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(())
}

/// Lists the artifact files the build left under `dist_dir`, sorted by name
/// for a deterministic upload order. A successful build that produced
/// nothing is an error.
pub fn discover_artifacts(dist_dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dist_dir)
        .with_context(|| format!("failed to read build output directory {}", dist_dir.display()))?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry
            .with_context(|| format!("failed to read an entry in {}", dist_dir.display()))?;
        if entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
            files.push(entry.path());
        }
    }
    files.sort();

    if files.is_empty() {
        bail!("build produced no artifacts in {}", dist_dir.display());
    }
    Ok(files)
}
