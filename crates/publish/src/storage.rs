//! Object storage backends.

use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::io::ReaderStream;
use tracing::debug;

use crate::error::{PublishError, StorageError};

/// A streamed upload body.
pub type ObjectBody = Box<dyn AsyncRead + Send + Sync + Unpin>;

/// Write access to durable object storage.
///
/// Implementations must stream `body` rather than buffer it whole where the
/// backend allows it. `size` is the exact length of `body` in bytes.
pub trait ObjectStore: Send + Sync {
    fn put(
        &self,
        key: &str,
        content_type: &str,
        size: u64,
        body: ObjectBody,
    ) -> Pin<Box<dyn Future<Output = Result<(), StorageError>> + Send + '_>>;
}

/// Where and how artifacts are stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Base URL of the storage service.
    pub endpoint: String,

    /// Target bucket.
    pub bucket: String,

    /// Write credential. Absent means uploads cannot happen.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,

    /// Forces dry-run on or off. Unset means dry-run when no token is set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dry_run: Option<bool>,

    /// Maximum uploads in flight. 1 uploads sequentially.
    pub upload_concurrency: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            bucket: String::new(),
            access_token: None,
            dry_run: None,
            upload_concurrency: 1,
        }
    }
}

impl StorageConfig {
    fn token(&self) -> Option<&str> {
        self.access_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }

    /// Whether uploads are simulated.
    ///
    /// Forcing dry-run off without a token is a configuration error.
    pub fn is_dry_run(&self) -> Result<bool, PublishError> {
        match (self.dry_run, self.token()) {
            (Some(true), _) => Ok(true),
            (None, None) => Ok(true),
            (Some(false), None) => Err(PublishError::MissingCredentials),
            (_, Some(_)) => Ok(false),
        }
    }
}

/// Uploads over HTTP with `PUT {endpoint}/{bucket}/{key}` and a bearer token.
pub struct HttpObjectStore {
    client: reqwest::Client,
    endpoint: String,
    bucket: String,
    token: String,
}

impl HttpObjectStore {
    pub fn new(client: reqwest::Client, config: &StorageConfig) -> Result<Self, PublishError> {
        let token = config.token().ok_or(PublishError::MissingCredentials)?;
        if config.endpoint.trim().is_empty() {
            return Err(PublishError::MissingEndpoint);
        }
        if config.bucket.trim().is_empty() {
            return Err(PublishError::MissingBucket);
        }

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            bucket: config.bucket.trim_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/{}/{}", self.endpoint, self.bucket, key)
    }

    /// A streamed PUT with an explicit length, so the body is not sent
    /// chunked.
    fn put_request(
        &self,
        key: &str,
        content_type: &str,
        size: u64,
        body: ObjectBody,
    ) -> reqwest::RequestBuilder {
        self.client
            .put(self.object_url(key))
            .bearer_auth(&self.token)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .header(reqwest::header::CONTENT_LENGTH, size)
            .body(reqwest::Body::wrap_stream(ReaderStream::new(body)))
    }
}

impl ObjectStore for HttpObjectStore {
    fn put(
        &self,
        key: &str,
        content_type: &str,
        size: u64,
        body: ObjectBody,
    ) -> Pin<Box<dyn Future<Output = Result<(), StorageError>> + Send + '_>> {
        let key = key.to_string();
        let request = self.put_request(&key, content_type, size, body);

        Box::pin(async move {
            debug!(key = %key, size, "storage put");

            let response = request.send().await?;

            if !response.status().is_success() {
                return Err(StorageError::Status {
                    status: response.status().as_u16(),
                    key,
                });
            }

            Ok(())
        })
    }
}

/// An object captured by [`MemoryObjectStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub key: String,
    pub content_type: String,
    pub body: Vec<u8>,
}

/// In-process store that keeps every put, for tests and local runs.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: Mutex<Vec<StoredObject>>,
    reject: Mutex<Vec<String>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes puts whose key ends with `suffix` fail.
    pub fn reject_keys_ending_with(&self, suffix: impl Into<String>) {
        if let Ok(mut reject) = self.reject.lock() {
            reject.push(suffix.into());
        }
    }

    /// Every stored object, in completion order.
    pub fn objects(&self) -> Vec<StoredObject> {
        self.objects
            .lock()
            .map(|objects| objects.clone())
            .unwrap_or_default()
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects().into_iter().map(|o| o.key).collect()
    }

    fn is_rejected(&self, key: &str) -> bool {
        self.reject
            .lock()
            .map(|reject| reject.iter().any(|suffix| key.ends_with(suffix.as_str())))
            .unwrap_or(false)
    }
}

impl ObjectStore for MemoryObjectStore {
    fn put(
        &self,
        key: &str,
        content_type: &str,
        size: u64,
        mut body: ObjectBody,
    ) -> Pin<Box<dyn Future<Output = Result<(), StorageError>> + Send + '_>> {
        let key = key.to_string();
        let content_type = content_type.to_string();

        Box::pin(async move {
            if self.is_rejected(&key) {
                return Err(StorageError::Rejected(key));
            }

            let mut data = Vec::new();
            body.read_to_end(&mut data).await?;
            if data.len() as u64 != size {
                return Err(StorageError::LengthMismatch {
                    key,
                    expected: size,
                    actual: data.len() as u64,
                });
            }

            if let Ok(mut objects) = self.objects.lock() {
                objects.push(StoredObject {
                    key,
                    content_type,
                    body: data,
                });
            }
            Ok(())
        })
    }
}
