//! Persisted package manifest: the catalog mapping package names to artifact
//! file names, stored as a single JSON object at [`MANIFEST_PATH`].
//!
//! The manifest is the mutable source of truth for the repository, so it is
//! written with revalidation-forcing cache directives and a conditional-write
//! precondition: [`load`] records the version token the store reported, and
//! [`save`] only succeeds if that token is still current. Callers re-run the
//! load → [`merge`] → save cycle on conflict.

use indexmap::IndexMap;
use tracing::{debug, info};

use crate::store::{Headers, ObjectStore, Precondition, StoreError, MANIFEST_PATH};

/// Package name → artifact file names, in insertion order.
pub type Manifest = IndexMap<String, Vec<String>>;

/// Cache-control directives for every generated/mutable document (manifest
/// and index pages): cacheable, but revalidated on every fetch.
pub const NO_STALE_CACHE: &str = "public, must-revalidate, proxy-revalidate, max-age=0";

/// A manifest together with the version token observed when it was loaded.
#[derive(Debug, Clone)]
pub struct LoadedIndex {
    pub manifest: Manifest,
    /// `None` when the manifest object did not exist yet (or the store does
    /// not report version tokens); [`save`] then requires the path to still
    /// be absent.
    pub version: Option<String>,
}

/// Error type for manifest load/save.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("manifest at {MANIFEST_PATH} is not valid JSON: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Fetches the manifest. An absent object yields an empty manifest; stored
/// content that is not valid JSON propagates as [`IndexError::Malformed`].
pub async fn load<S>(store: &S) -> Result<LoadedIndex, IndexError>
where
    S: ObjectStore + ?Sized,
{
    match store.get(MANIFEST_PATH).await? {
        Some(object) => {
            let manifest: Manifest = serde_json::from_slice(&object.data)?;
            info!(
                packages = manifest.len(),
                version = ?object.version,
                "Loaded package manifest"
            );
            Ok(LoadedIndex {
                manifest,
                version: object.version,
            })
        }
        None => {
            info!("No manifest found, starting from an empty catalog");
            Ok(LoadedIndex {
                manifest: Manifest::new(),
                version: None,
            })
        }
    }
}

/// Appends `files` to `manifest[package]`, creating the entry if absent.
///
/// Purely additive: entries for other packages are untouched and nothing is
/// reordered or dropped. Duplicate file names are skipped so re-merging the
/// same release is idempotent, with first-seen order preserved.
pub fn merge(manifest: &mut Manifest, package: &str, files: &[String]) {
    let entry = manifest.entry(package.to_string()).or_default();
    for file in files {
        if !entry.iter().any(|existing| existing == file) {
            entry.push(file.clone());
        }
    }
    debug!(
        package,
        files = entry.len(),
        "Merged release files into manifest"
    );
}

/// Serializes the full manifest and writes it back, conditional on `version`
/// still being current (or on the path still being absent when the manifest
/// was missing at load time). A lost race surfaces as
/// [`StoreError::PreconditionFailed`] inside [`IndexError::Store`].
pub async fn save<S>(store: &S, manifest: &Manifest, version: Option<&str>) -> Result<(), IndexError>
where
    S: ObjectStore + ?Sized,
{
    let data = serde_json::to_vec(manifest)?;
    let precondition = match version {
        Some(token) => Precondition::IfMatch(token.to_string()),
        None => Precondition::IfAbsent,
    };
    store
        .put(
            MANIFEST_PATH,
            data,
            Headers::with_content_type("application/json").cache_control(NO_STALE_CACHE),
            precondition,
        )
        .await?;
    info!(packages = manifest.len(), "Saved package manifest");
    Ok(())
}
