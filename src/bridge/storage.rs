//! Object storage for uploaded clips.

use crate::error::{GuidecastError, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Reference to a stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub url: String,
}

/// External object storage. Callers validate type and size first.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn upload(&self, name: &str, bytes: &[u8], mime_type: &str) -> Result<StoredObject>;
}

#[async_trait]
impl<T: ObjectStorage + ?Sized> ObjectStorage for Arc<T> {
    async fn upload(&self, name: &str, bytes: &[u8], mime_type: &str) -> Result<StoredObject> {
        (**self).upload(name, bytes, mime_type).await
    }
}

/// Mock storage for testing. Clones share the upload counter.
#[derive(Debug, Clone, Default)]
pub struct MockObjectStorage {
    uploads: Arc<AtomicUsize>,
    should_fail: bool,
}

impl MockObjectStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure the mock to fail on upload
    pub fn with_failure(mut self) -> Self {
        self.should_fail = true;
        self
    }

    pub fn upload_count(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectStorage for MockObjectStorage {
    async fn upload(&self, name: &str, _bytes: &[u8], _mime_type: &str) -> Result<StoredObject> {
        let n = self.uploads.fetch_add(1, Ordering::SeqCst) + 1;
        if self.should_fail {
            return Err(GuidecastError::Transport {
                message: "mock upload failure".to_string(),
            });
        }
        Ok(StoredObject {
            url: format!("mock://clips/{}/{}", n, name),
        })
    }
}

#[cfg(feature = "http")]
pub use self::http::HttpObjectStorage;

#[cfg(feature = "http")]
mod http {
    use super::{ObjectStorage, StoredObject};
    use crate::config::StorageConfig;
    use crate::error::{GuidecastError, Result};
    use async_trait::async_trait;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct UploadResponse {
        #[serde(alias = "Location", alias = "url")]
        location: Option<String>,
    }

    /// Uploads with `PUT {endpoint}/{name}`.
    ///
    /// The object URL is taken from a JSON `location` field, then the
    /// `Location` header, then the request URL itself.
    pub struct HttpObjectStorage {
        client: reqwest::Client,
        endpoint: reqwest::Url,
        api_key: Option<String>,
    }

    impl HttpObjectStorage {
        pub fn new(endpoint: &str, api_key: Option<String>) -> Result<Self> {
            let endpoint = reqwest::Url::parse(endpoint).map_err(|e| {
                GuidecastError::ConfigInvalidValue {
                    key: "storage.endpoint".to_string(),
                    message: e.to_string(),
                }
            })?;
            if endpoint.cannot_be_a_base() {
                return Err(GuidecastError::ConfigInvalidValue {
                    key: "storage.endpoint".to_string(),
                    message: format!("{} cannot hold object paths", endpoint),
                });
            }

            let client = reqwest::Client::builder()
                .build()
                .map_err(|e| GuidecastError::Transport {
                    message: format!("Failed to create HTTP client: {}", e),
                })?;

            Ok(Self {
                client,
                endpoint,
                api_key,
            })
        }

        pub fn from_config(config: &StorageConfig) -> Result<Option<Self>> {
            config
                .endpoint
                .as_deref()
                .map(|endpoint| Self::new(endpoint, config.api_key.clone()))
                .transpose()
        }

        /// URL an object named `name` is written to.
        pub fn object_url(&self, name: &str) -> reqwest::Url {
            let mut url = self.endpoint.clone();
            if let Ok(mut segments) = url.path_segments_mut() {
                segments.pop_if_empty();
                for part in name.split('/').filter(|p| !p.is_empty()) {
                    segments.push(part);
                }
            }
            url
        }
    }

    #[async_trait]
    impl ObjectStorage for HttpObjectStorage {
        async fn upload(&self, name: &str, bytes: &[u8], mime_type: &str) -> Result<StoredObject> {
            let url = self.object_url(name);
            let mut request = self
                .client
                .put(url.clone())
                .header(reqwest::header::CONTENT_TYPE, mime_type)
                .body(bytes.to_vec());
            if let Some(key) = &self.api_key {
                request = request.bearer_auth(key);
            }

            let response = request.send().await.map_err(|e| GuidecastError::Transport {
                message: format!("Failed to reach object storage: {}", e),
            })?;

            let status = response.status();
            if !status.is_success() {
                let error_text = response.text().await.unwrap_or_default();
                return Err(GuidecastError::Transport {
                    message: format!("Object storage returned {} {}", status, error_text),
                });
            }

            let header_location = response
                .headers()
                .get(reqwest::header::LOCATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let body = response.text().await.unwrap_or_default();
            let body_location = serde_json::from_str::<UploadResponse>(&body)
                .ok()
                .and_then(|r| r.location);

            Ok(StoredObject {
                url: body_location
                    .or(header_location)
                    .unwrap_or_else(|| url.to_string()),
            })
        }
    }

}
