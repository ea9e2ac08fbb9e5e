//! Scenario tests for the release pipeline, driven against an in-memory
//! object store fake (versioned, precondition-aware) and against mockall
//! mocks where call counts are the point.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use tempfile::TempDir;

use pipcloud_core::index::{self, Manifest};
use pipcloud_core::release::{release, ReleaseError};
use pipcloud_core::store::{
    Headers, MockObjectStore, ObjectStore, Precondition, StoreError, StoredObject, MANIFEST_PATH,
};

#[derive(Clone)]
struct Entry {
    data: Vec<u8>,
    content_type: String,
    version: u64,
}

/// Precondition-aware in-memory store: every write bumps a version counter
/// that doubles as the ETag, so the manifest CAS path is exercised for real.
#[derive(Default)]
struct InMemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    objects: HashMap<String, Entry>,
    next_version: u64,
}

impl InMemoryStore {
    fn object(&self, path: &str) -> Option<Entry> {
        self.inner.lock().unwrap().objects.get(path).cloned()
    }

    fn object_count(&self) -> usize {
        self.inner.lock().unwrap().objects.len()
    }

    fn manifest(&self) -> Option<Manifest> {
        self.object(MANIFEST_PATH)
            .map(|entry| serde_json::from_slice(&entry.data).unwrap())
    }
}

#[async_trait]
impl ObjectStore for InMemoryStore {
    async fn get(&self, path: &str) -> Result<Option<StoredObject>, StoreError> {
        Ok(self.object(path).map(|entry| StoredObject {
            data: entry.data,
            version: Some(entry.version.to_string()),
        }))
    }

    async fn put(
        &self,
        path: &str,
        data: Vec<u8>,
        headers: Headers,
        precondition: Precondition,
    ) -> Result<(), StoreError> {
        let content_type = headers.require_content_type()?.to_string();
        let mut inner = self.inner.lock().unwrap();
        let current = inner.objects.get(path).map(|entry| entry.version);
        let holds = match &precondition {
            Precondition::None => true,
            Precondition::IfAbsent => current.is_none(),
            Precondition::IfMatch(token) => {
                current.map(|v| v.to_string()).as_deref() == Some(token.as_str())
            }
        };
        if !holds {
            return Err(StoreError::PreconditionFailed {
                path: path.to_string(),
            });
        }
        inner.next_version += 1;
        let version = inner.next_version;
        inner.objects.insert(
            path.to_string(),
            Entry {
                data,
                content_type,
                version,
            },
        );
        Ok(())
    }

    async fn exists(&self, path: &str) -> Result<bool, StoreError> {
        Ok(self.object(path).is_some())
    }
}

/// Writes artifact files into a temp dir and returns their paths.
fn local_artifacts(dir: &TempDir, names: &[&str]) -> Vec<PathBuf> {
    names
        .iter()
        .map(|name| {
            let path = dir.path().join(name);
            std::fs::write(&path, format!("archive bytes of {name}")).unwrap();
            path
        })
        .collect()
}

#[tokio::test]
async fn release_into_empty_bucket_uploads_and_indexes() {
    let store = InMemoryStore::default();
    let dist = TempDir::new().unwrap();
    let files = local_artifacts(&dist, &["acme-1.0.tar.gz"]);

    let report = release(&store, "acme", &files, false).await.unwrap();
    assert_eq!(report.package, "acme");
    assert_eq!(report.artifacts.len(), 1);
    assert_eq!(report.artifacts[0].remote_path, "/acme/acme-1.0.tar.gz");

    let artifact = store.object("/acme/acme-1.0.tar.gz").unwrap();
    assert_eq!(artifact.data, b"archive bytes of acme-1.0.tar.gz");
    assert_eq!(artifact.content_type, "application/x-gzip");

    let manifest = store.manifest().unwrap();
    assert_eq!(manifest["acme"], vec!["acme-1.0.tar.gz"]);

    let repo = store.object("/index.html").unwrap();
    assert_eq!(repo.content_type, "text/html");
    assert!(String::from_utf8(repo.data).unwrap().contains("acme"));

    let package = store.object("/acme/index.html").unwrap();
    assert!(String::from_utf8(package.data)
        .unwrap()
        .contains("acme-1.0.tar.gz"));
}

#[tokio::test]
async fn rerelease_without_force_is_a_conflict_and_changes_nothing() {
    let store = InMemoryStore::default();
    let dist = TempDir::new().unwrap();
    let files = local_artifacts(&dist, &["acme-1.0.tar.gz"]);

    release(&store, "acme", &files, false).await.unwrap();
    let artifact_before = store.object("/acme/acme-1.0.tar.gz").unwrap();
    let manifest_before = store.manifest().unwrap();
    let objects_before = store.object_count();

    let err = release(&store, "acme", &files, false).await.unwrap_err();
    assert!(matches!(err, ReleaseError::ArtifactExists { .. }));

    assert_eq!(store.object_count(), objects_before);
    assert_eq!(
        store.object("/acme/acme-1.0.tar.gz").unwrap().version,
        artifact_before.version
    );
    assert_eq!(store.manifest().unwrap(), manifest_before);
}

#[tokio::test]
async fn force_overwrite_appends_to_the_manifest() {
    let store = InMemoryStore::default();
    let dist = TempDir::new().unwrap();

    let first = local_artifacts(&dist, &["acme-1.0.tar.gz"]);
    release(&store, "acme", &first, false).await.unwrap();

    let second = local_artifacts(&dist, &["acme-1.1.tar.gz"]);
    release(&store, "acme", &second, true).await.unwrap();

    let manifest = store.manifest().unwrap();
    assert_eq!(manifest["acme"], vec!["acme-1.0.tar.gz", "acme-1.1.tar.gz"]);
    assert!(store.object("/acme/acme-1.1.tar.gz").is_some());
}

#[tokio::test]
async fn manifest_round_trips_through_the_store() {
    let store = InMemoryStore::default();
    let mut manifest = Manifest::new();
    manifest.insert("acme".to_string(), vec!["acme-1.0.tar.gz".to_string()]);
    manifest.insert(
        "widget".to_string(),
        vec!["widget-0.3.tar.gz".to_string(), "widget-0.3-py3-none-any.whl".to_string()],
    );

    index::save(&store, &manifest, None).await.unwrap();
    let loaded = index::load(&store).await.unwrap();

    assert_eq!(loaded.manifest, manifest);
    assert!(loaded.version.is_some());
}

#[tokio::test]
async fn malformed_manifest_is_a_fatal_error() {
    let store = InMemoryStore::default();
    store
        .put(
            MANIFEST_PATH,
            b"not json".to_vec(),
            Headers::with_content_type("application/json"),
            Precondition::None,
        )
        .await
        .unwrap();

    let dist = TempDir::new().unwrap();
    let files = local_artifacts(&dist, &["acme-1.0.tar.gz"]);
    let err = release(&store, "acme", &files, false).await.unwrap_err();
    assert!(matches!(
        err,
        ReleaseError::Index(index::IndexError::Malformed(_))
    ));
}

#[tokio::test]
async fn existence_guard_short_circuits_uploads() {
    let mut store = MockObjectStore::new();
    store
        .expect_exists()
        .withf(|path| path == "/acme/acme-1.0.tar.gz")
        .times(1)
        .returning(|_| Ok(true));
    // No put or get may be issued once the guard trips.
    store.expect_put().times(0);
    store.expect_get().times(0);

    let dist = TempDir::new().unwrap();
    let files = local_artifacts(&dist, &["acme-1.0.tar.gz"]);
    let err = release(&store, "acme", &files, false).await.unwrap_err();
    assert!(matches!(err, ReleaseError::ArtifactExists { .. }));
}

#[tokio::test]
async fn manifest_update_retries_after_losing_the_race() {
    let mut store = MockObjectStore::new();

    // Artifact upload (force skips the existence checks).
    store
        .expect_put()
        .withf(|path, _, _, _| path == "/acme/acme-1.0.tar.gz")
        .times(1)
        .returning(|_, _, _, _| Ok(()));

    // First load observes version 1; the conditional save loses the race.
    store
        .expect_get()
        .withf(|path| path == MANIFEST_PATH)
        .times(1)
        .returning(|_| {
            Ok(Some(StoredObject {
                data: b"{}".to_vec(),
                version: Some("1".to_string()),
            }))
        });
    store
        .expect_put()
        .withf(|path, _, _, pre| {
            path == MANIFEST_PATH && *pre == Precondition::IfMatch("1".to_string())
        })
        .times(1)
        .returning(|path, _, _, _| {
            Err(StoreError::PreconditionFailed {
                path: path.to_string(),
            })
        });

    // Second cycle sees the concurrent writer's manifest and wins.
    store
        .expect_get()
        .withf(|path| path == MANIFEST_PATH)
        .times(1)
        .returning(|_| {
            Ok(Some(StoredObject {
                data: br#"{"other":["other-2.0.tar.gz"]}"#.to_vec(),
                version: Some("2".to_string()),
            }))
        });
    store
        .expect_put()
        .withf(|path, data, _, pre| {
            path == MANIFEST_PATH
                && *pre == Precondition::IfMatch("2".to_string())
                && serde_json::from_slice::<Manifest>(data)
                    .map(|m| m.contains_key("other") && m.contains_key("acme"))
                    .unwrap_or(false)
        })
        .times(1)
        .returning(|_, _, _, _| Ok(()));

    store
        .expect_put()
        .withf(|path, _, _, _| path == "/index.html")
        .times(1)
        .returning(|_, _, _, _| Ok(()));
    store
        .expect_put()
        .withf(|path, _, _, _| path == "/acme/index.html")
        .times(1)
        .returning(|_, _, _, _| Ok(()));

    let dist = TempDir::new().unwrap();
    let files = local_artifacts(&dist, &["acme-1.0.tar.gz"]);
    release(&store, "acme", &files, true).await.unwrap();
}
