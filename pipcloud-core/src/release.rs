//! High-level pipeline: orchestrates one package release against the bucket.
//!
//! [`release`] is the single entrypoint the CLI calls per invocation. It runs
//! the steps in a fixed order:
//!   - Existence guard: unless forced, every remote artifact path is checked
//!     first and a single hit aborts the whole operation before any upload.
//!   - Artifact upload: each local file is written to
//!     `/<package>/<basename>`, content type chosen by extension.
//!   - Index update: load → merge → save of the manifest under a bounded
//!     compare-and-swap retry, then both HTML index documents are regenerated
//!     and written.
//!
//! # Failure semantics
//! The guard is all-or-nothing before any upload begins. Uploads and the
//! index update are best-effort sequential: a failure partway leaves the
//! bucket partially updated with no rollback, and re-running (with `force`,
//! since the guard will now trip) is the recovery path.

use std::path::PathBuf;

use tracing::{error, info, warn};

use crate::index::{self, IndexError, NO_STALE_CACHE};
use crate::render::{self, RenderError};
use crate::store::{Headers, ObjectStore, Precondition, StoreError};

/// Attempts at the load-merge-save cycle before giving up on a contended
/// manifest.
const MAX_INDEX_ATTEMPTS: u32 = 3;

/// Outcome report for one release, returned to the CLI for logging.
#[derive(Debug)]
pub struct ReleaseReport {
    pub package: String,
    pub artifacts: Vec<UploadedArtifact>,
}

#[derive(Debug)]
pub struct UploadedArtifact {
    pub file_name: String,
    pub remote_path: String,
    pub content_type: String,
}

/// Error type for the release pipeline.
#[derive(Debug, thiserror::Error)]
pub enum ReleaseError {
    #[error("artifact {path} already exists in the bucket; pass --force to overwrite")]
    ArtifactExists { path: String },
    #[error("artifact path {path} has no file name")]
    InvalidArtifact { path: PathBuf },
    #[error("failed to read artifact {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("manifest update lost the race {attempts} times, giving up")]
    IndexConflict { attempts: u32 },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error(transparent)]
    Render(#[from] RenderError),
}

/// Publishes one release: uploads `files` under `package` and folds their
/// names into the catalog.
pub async fn release<S>(
    store: &S,
    package: &str,
    files: &[PathBuf],
    force: bool,
) -> Result<ReleaseReport, ReleaseError>
where
    S: ObjectStore + ?Sized,
{
    info!(package, files = files.len(), force, "Starting release");

    let artifacts = plan_artifacts(package, files)?;

    if force {
        warn!(package, "Force set, skipping existence checks");
    } else {
        for artifact in &artifacts {
            if store.exists(&artifact.remote_path).await? {
                error!(path = %artifact.remote_path, "Artifact already published");
                return Err(ReleaseError::ArtifactExists {
                    path: artifact.remote_path.clone(),
                });
            }
            info!(path = %artifact.remote_path, "Artifact not yet published");
        }
    }

    for artifact in &artifacts {
        let data = tokio::fs::read(&artifact.local_path)
            .await
            .map_err(|source| ReleaseError::Read {
                path: artifact.local_path.clone(),
                source,
            })?;
        info!(
            file = %artifact.file_name,
            path = %artifact.remote_path,
            bytes = data.len(),
            "Uploading artifact"
        );
        store
            .put(
                &artifact.remote_path,
                data,
                Headers::with_content_type(artifact.content_type),
                Precondition::None,
            )
            .await?;
    }

    let file_names: Vec<String> = artifacts.iter().map(|a| a.file_name.clone()).collect();
    update_index(store, package, &file_names).await?;

    Ok(ReleaseReport {
        package: package.to_string(),
        artifacts: artifacts
            .into_iter()
            .map(|a| UploadedArtifact {
                file_name: a.file_name,
                remote_path: a.remote_path,
                content_type: a.content_type.to_string(),
            })
            .collect(),
    })
}

/// Folds `files` into the manifest and rewrites both index documents.
///
/// The manifest write is conditional on the version token observed at load;
/// losing the race re-runs the whole load-merge-save cycle, bounded by
/// [`MAX_INDEX_ATTEMPTS`].
async fn update_index<S>(store: &S, package: &str, files: &[String]) -> Result<(), ReleaseError>
where
    S: ObjectStore + ?Sized,
{
    let mut manifest = None;
    for attempt in 1..=MAX_INDEX_ATTEMPTS {
        let mut loaded = index::load(store).await?;
        index::merge(&mut loaded.manifest, package, files);
        match index::save(store, &loaded.manifest, loaded.version.as_deref()).await {
            Ok(()) => {
                manifest = Some(loaded.manifest);
                break;
            }
            Err(IndexError::Store(StoreError::PreconditionFailed { path })) => {
                warn!(attempt, path = %path, "Manifest changed underneath us, retrying");
            }
            Err(other) => return Err(other.into()),
        }
    }
    let manifest = manifest.ok_or(ReleaseError::IndexConflict {
        attempts: MAX_INDEX_ATTEMPTS,
    })?;

    let repo_index = render::render_repo_index(&manifest)?;
    let package_index = render::render_package_index(&manifest, package)?;

    let html = || Headers::with_content_type("text/html").cache_control(NO_STALE_CACHE);
    store
        .put("/index.html", repo_index.into_bytes(), html(), Precondition::None)
        .await?;
    store
        .put(
            &format!("/{package}/index.html"),
            package_index.into_bytes(),
            html(),
            Precondition::None,
        )
        .await?;
    info!(package, "Index documents regenerated");
    Ok(())
}

#[derive(Debug)]
struct PlannedArtifact {
    local_path: PathBuf,
    file_name: String,
    remote_path: String,
    content_type: &'static str,
}

fn plan_artifacts(package: &str, files: &[PathBuf]) -> Result<Vec<PlannedArtifact>, ReleaseError> {
    files
        .iter()
        .map(|path| {
            let file_name = path
                .file_name()
                .and_then(|name| name.to_str())
                .ok_or_else(|| ReleaseError::InvalidArtifact { path: path.clone() })?
                .to_string();
            Ok(PlannedArtifact {
                remote_path: format!("/{package}/{file_name}"),
                content_type: artifact_content_type(&file_name),
                file_name,
                local_path: path.clone(),
            })
        })
        .collect()
}

/// Content type by extension. Mutable documents get revalidation-forcing
/// cache headers elsewhere; artifacts are immutable and carry none.
pub fn artifact_content_type(file_name: &str) -> &'static str {
    let lower = file_name.to_ascii_lowercase();
    if lower.ends_with(".whl") {
        "application/zip"
    } else if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") || lower.ends_with(".gz") {
        "application/x-gzip"
    } else {
        "application/octet-stream"
    }
}
