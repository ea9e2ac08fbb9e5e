//! Concrete object-store client: bridges the `pipcloud-core` store contract
//! to the S3 REST API over plain HTTPS.
//!
//! One client is constructed per invocation (keyed by bucket and region) and
//! injected into the release pipeline. Buckets are addressed virtual-hosted
//! style; setting `PIPCLOUD_ENDPOINT` switches to path-style addressing
//! against an S3-compatible endpoint (useful for MinIO and test stores).
//! Requests are unauthenticated: the target is a bucket that accepts public
//! writes, and credential management is out of scope.
//!
//! Idempotent reads (GET/HEAD) are retried with linear backoff; writes are
//! never retried, since a failed write may already have mutated the bucket.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CACHE_CONTROL, CONTENT_TYPE, ETAG, IF_MATCH, IF_NONE_MATCH};
use reqwest::{Client, Response, StatusCode};
use tracing::{debug, info, warn};

use pipcloud_core::store::{Headers, ObjectStore, Precondition, StoreError, StoredObject};

const READ_ATTEMPTS: u32 = 3;
const RETRY_BASE: Duration = Duration::from_millis(250);

pub struct S3Client {
    http: Client,
    base_url: String,
}

impl S3Client {
    pub fn new(bucket: &str, region: Option<&str>) -> Result<Self, StoreError> {
        let endpoint = std::env::var("PIPCLOUD_ENDPOINT").ok();
        let base_url = base_url(bucket, region, endpoint.as_deref());
        let http = Client::builder().build().map_err(StoreError::backend)?;
        info!(bucket, %base_url, "Initialized S3 client");
        Ok(S3Client { http, base_url })
    }

    fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

fn base_url(bucket: &str, region: Option<&str>, endpoint: Option<&str>) -> String {
    match endpoint {
        Some(endpoint) => format!("{}/{bucket}", endpoint.trim_end_matches('/')),
        None => match region {
            Some(region) => format!("https://{bucket}.s3.{region}.amazonaws.com"),
            None => format!("https://{bucket}.s3.amazonaws.com"),
        },
    }
}

fn status_error(op: &str, path: &str, status: StatusCode) -> StoreError {
    StoreError::Backend(format!("{op} {path} returned {status}").into())
}

/// S3 quotes ETag header values; the version token is stored unquoted and
/// re-quoted when sent back in `If-Match`.
fn normalize_etag(raw: &str) -> String {
    raw.trim_matches('"').to_string()
}

fn etag_of(response: &Response) -> Option<String> {
    response
        .headers()
        .get(ETAG)
        .and_then(|value| value.to_str().ok())
        .map(normalize_etag)
}

#[async_trait]
impl ObjectStore for S3Client {
    async fn get(&self, path: &str) -> Result<Option<StoredObject>, StoreError> {
        let url = self.url_for(path);
        debug!(path, "Getting object");

        let mut last_err = None;
        for attempt in 1..=READ_ATTEMPTS {
            if attempt > 1 {
                tokio::time::sleep(RETRY_BASE * (attempt - 1)).await;
            }
            match self.http.get(url.as_str()).send().await {
                Ok(response) if response.status() == StatusCode::NOT_FOUND => return Ok(None),
                Ok(response) if response.status().is_success() => {
                    let version = etag_of(&response);
                    let data = response.bytes().await.map_err(StoreError::backend)?.to_vec();
                    debug!(path, bytes = data.len(), ?version, "Got object");
                    return Ok(Some(StoredObject { data, version }));
                }
                Ok(response) if response.status().is_server_error() => {
                    warn!(path, attempt, status = %response.status(), "Retrying get");
                    last_err = Some(status_error("get", path, response.status()));
                }
                Ok(response) => return Err(status_error("get", path, response.status())),
                Err(e) => {
                    warn!(path, attempt, error = %e, "Retrying get after transport error");
                    last_err = Some(StoreError::backend(e));
                }
            }
        }
        Err(last_err
            .unwrap_or_else(|| StoreError::Backend("get retries exhausted".into())))
    }

    async fn put(
        &self,
        path: &str,
        data: Vec<u8>,
        headers: Headers,
        precondition: Precondition,
    ) -> Result<(), StoreError> {
        // Fail fast before any request is built.
        let content_type = headers.require_content_type()?.to_string();

        let url = self.url_for(path);
        info!(path, bytes = data.len(), %content_type, "Putting object");

        let mut request = self
            .http
            .put(url.as_str())
            .header(CONTENT_TYPE, content_type)
            .header("x-amz-acl", "public-read");
        if let Some(cache_control) = &headers.cache_control {
            request = request.header(CACHE_CONTROL, cache_control.as_str());
        }
        request = match &precondition {
            Precondition::None => request,
            Precondition::IfMatch(token) => request.header(IF_MATCH, format!("\"{token}\"")),
            Precondition::IfAbsent => request.header(IF_NONE_MATCH, "*"),
        };

        let response = request.body(data).send().await.map_err(StoreError::backend)?;
        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::PRECONDITION_FAILED | StatusCode::CONFLICT => {
                Err(StoreError::PreconditionFailed {
                    path: path.to_string(),
                })
            }
            status => Err(status_error("put", path, status)),
        }
    }

    async fn exists(&self, path: &str) -> Result<bool, StoreError> {
        let url = self.url_for(path);
        debug!(path, "Checking object existence");

        let mut last_err = None;
        for attempt in 1..=READ_ATTEMPTS {
            if attempt > 1 {
                tokio::time::sleep(RETRY_BASE * (attempt - 1)).await;
            }
            match self.http.head(url.as_str()).send().await {
                Ok(response) if response.status() == StatusCode::NOT_FOUND => return Ok(false),
                Ok(response) if response.status().is_success() => return Ok(true),
                Ok(response) if response.status().is_server_error() => {
                    warn!(path, attempt, status = %response.status(), "Retrying existence check");
                    last_err = Some(status_error("head", path, response.status()));
                }
                Ok(response) => return Err(status_error("head", path, response.status())),
                Err(e) => {
                    warn!(path, attempt, error = %e, "Retrying existence check after transport error");
                    last_err = Some(StoreError::backend(e));
                }
            }
        }
        Err(last_err
            .unwrap_or_else(|| StoreError::Backend("head retries exhausted".into())))
    }
}
