//! # store: object-store contract
//!
//! This module defines a single trait ([`ObjectStore`]) and the supporting
//! types for reading and writing named blobs in a remote bucket. The trait is
//! implemented by the real S3 client in the `pipcloud` binary crate and by
//! mocks/fakes in tests.
//!
//! ## Semantics
//! - An absent object is a normal value (`Ok(None)`), never an error. Only a
//!   genuine store failure surfaces as [`StoreError`].
//! - Every write requires a content type and is made publicly readable: the
//!   index documents and artifacts are meant to be fetchable by pip without
//!   credentials.
//! - Writes may carry a [`Precondition`] so the manifest can be updated with
//!   compare-and-swap semantics instead of a blind overwrite.
//!
//! ## Mocking & Testing
//! - The trait is annotated for `mockall` so consumers can generate
//!   deterministic mocks for unit/integration tests.

use async_trait::async_trait;

use mockall::automock;

/// Well-known remote path of the persisted package manifest.
pub const MANIFEST_PATH: &str = "/.pipcloud.json";

/// An object fetched from the store: its body plus the version token (ETag)
/// the store reported for it, when it reports one.
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub data: Vec<u8>,
    pub version: Option<String>,
}

/// Metadata headers attached to a write.
///
/// A content type is mandatory for every `put`; implementations must reject a
/// header set without one before issuing any network call.
#[derive(Debug, Clone, Default)]
pub struct Headers {
    pub content_type: Option<String>,
    pub cache_control: Option<String>,
}

impl Headers {
    pub fn with_content_type(content_type: impl Into<String>) -> Self {
        Headers {
            content_type: Some(content_type.into()),
            cache_control: None,
        }
    }

    pub fn cache_control(mut self, directives: impl Into<String>) -> Self {
        self.cache_control = Some(directives.into());
        self
    }

    /// The shared fail-fast guard for implementations: a missing content type
    /// is a configuration error, caught before any request is built.
    pub fn require_content_type(&self) -> Result<&str, StoreError> {
        self.content_type
            .as_deref()
            .ok_or(StoreError::MissingContentType)
    }
}

/// Condition attached to a write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Precondition {
    /// Unconditional write: overwrites whatever is at the path.
    None,
    /// Write only if the stored version token still matches.
    IfMatch(String),
    /// Write only if no object exists at the path yet.
    IfAbsent,
}

/// Error type for object-store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("at least the Content-Type header is required")]
    MissingContentType,
    #[error("precondition failed writing {path}")]
    PreconditionFailed { path: String },
    #[error("object store request failed: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    /// Wraps a transport/service failure from a concrete client.
    pub fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        StoreError::Backend(Box::new(err))
    }
}

/// Trait for reading and writing objects in the bucket backing the package
/// repository. One instance is constructed per invocation and passed into the
/// index store and upload coordinator.
///
/// The trait is `Send + Sync` and intended for async/await usage; it is
/// implemented by real clients and by test mocks.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch the object at `path`. A "not found" response from the store is
    /// translated into `Ok(None)`; any other failure is a [`StoreError`].
    async fn get(&self, path: &str) -> Result<Option<StoredObject>, StoreError>;

    /// Write `data` to `path` with the given metadata headers, publicly
    /// readable. Fails with [`StoreError::MissingContentType`] before any
    /// network call when `headers` lacks a content type, and with
    /// [`StoreError::PreconditionFailed`] when `precondition` does not hold.
    async fn put(
        &self,
        path: &str,
        data: Vec<u8>,
        headers: Headers,
        precondition: Precondition,
    ) -> Result<(), StoreError>;

    /// Metadata-only existence check for `path`, without downloading a body.
    async fn exists(&self, path: &str) -> Result<bool, StoreError>;
}
