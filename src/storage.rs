//! Object storage for uploaded images.
//!
//! [`ObjectStore`] is the narrow interface the service needs: write-once puts,
//! reads, and time-limited presigned GET URLs. [`LocalObjectStore`] keeps
//! objects on the local filesystem and signs URLs with HMAC-SHA256.

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use url::Url;

type HmacSha256 = Hmac<Sha256>;

/// Suffix of the sidecar file holding an object's content type.
const CONTENT_TYPE_SUFFIX: &str = ".content-type";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object already exists: {0}")]
    AlreadyExists(String),
    #[error("object not found: {0}")]
    NotFound(String),
    #[error("invalid object key: {0}")]
    InvalidKey(String),
    #[error("presigned url is invalid or expired")]
    InvalidSignature,
    #[error("invalid public base url: {0}")]
    BaseUrl(#[from] url::ParseError),
    #[error("storage i/o failed for {key}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
}

/// A stored object's bytes and content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `bytes` under `key`. Fails with [`StorageError::AlreadyExists`] if taken.
    async fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<(), StorageError>;

    async fn get(&self, key: &str) -> Result<StoredObject, StorageError>;

    /// Remove `key`. Removing a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// A URL that serves `key` until `ttl` elapses.
    fn presigned_get(&self, key: &str, ttl: Duration) -> Result<String, StorageError>;

    /// Check the `expires` and `signature` parameters of a URL from [`ObjectStore::presigned_get`].
    ///
    /// Only stores whose URLs point back at this service need to implement this.
    fn verify_presigned(&self, _key: &str, _expires: i64, _signature: &str) -> Result<(), StorageError> {
        Err(StorageError::InvalidSignature)
    }
}

/// Filesystem-backed object store.
pub struct LocalObjectStore {
    root: PathBuf,
    signing_key: Vec<u8>,
    base_url: String,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>, signing_key: impl Into<Vec<u8>>, base_url: &str) -> Self {
        Self {
            root: root.into(),
            signing_key: signing_key.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, key: &str) -> Result<PathBuf, StorageError> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }

    fn signature(&self, key: &str, expires: i64) -> Result<String, StorageError> {
        let mut mac =
            HmacSha256::new_from_slice(&self.signing_key).map_err(|_| StorageError::InvalidSignature)?;
        mac.update(key.as_bytes());
        mac.update(b"\n");
        mac.update(expires.to_string().as_bytes());
        Ok(URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes()))
    }

    fn verify_presigned_at(
        &self,
        key: &str,
        expires: i64,
        signature: &str,
        now: i64,
    ) -> Result<(), StorageError> {
        validate_key(key)?;
        if expires < now {
            return Err(StorageError::InvalidSignature);
        }
        let sig = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| StorageError::InvalidSignature)?;
        let mut mac =
            HmacSha256::new_from_slice(&self.signing_key).map_err(|_| StorageError::InvalidSignature)?;
        mac.update(key.as_bytes());
        mac.update(b"\n");
        mac.update(expires.to_string().as_bytes());
        mac.verify_slice(&sig).map_err(|_| StorageError::InvalidSignature)
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<(), StorageError> {
        let path = self.object_path(key)?;
        let io_err = |source| StorageError::Io {
            key: key.to_string(),
            source,
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }

        let mut file = match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(StorageError::AlreadyExists(key.to_string()));
            }
            Err(e) => return Err(io_err(e)),
        };
        file.write_all(bytes).await.map_err(io_err)?;
        file.flush().await.map_err(io_err)?;

        tokio::fs::write(sidecar_path(&path), content_type)
            .await
            .map_err(io_err)?;

        tracing::debug!(key, size = bytes.len(), "object stored");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<StoredObject, StorageError> {
        let path = self.object_path(key)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(key.to_string()));
            }
            Err(source) => {
                return Err(StorageError::Io {
                    key: key.to_string(),
                    source,
                })
            }
        };
        let content_type = tokio::fs::read_to_string(sidecar_path(&path))
            .await
            .unwrap_or_else(|_| "application/octet-stream".to_string());
        Ok(StoredObject {
            bytes,
            content_type,
        })
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let path = self.object_path(key)?;
        for target in [sidecar_path(&path), path] {
            match tokio::fs::remove_file(&target).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(source) => {
                    return Err(StorageError::Io {
                        key: key.to_string(),
                        source,
                    })
                }
            }
        }
        tracing::debug!(key, "object deleted");
        Ok(())
    }

    fn presigned_get(&self, key: &str, ttl: Duration) -> Result<String, StorageError> {
        validate_key(key)?;
        let expires = chrono::Utc::now().timestamp() + ttl.as_secs() as i64;
        let signature = self.signature(key, expires)?;

        // each key segment is pushed separately so `#`, `?` and `%` are escaped
        let mut url = Url::parse(&self.base_url)?;
        url.path_segments_mut()
            .map_err(|()| StorageError::BaseUrl(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .pop_if_empty()
            .push("objects")
            .extend(key.split('/'));
        url.query_pairs_mut()
            .append_pair("expires", &expires.to_string())
            .append_pair("signature", &signature);
        Ok(url.into())
    }

    fn verify_presigned(&self, key: &str, expires: i64, signature: &str) -> Result<(), StorageError> {
        self.verify_presigned_at(key, expires, signature, chrono::Utc::now().timestamp())
    }
}

fn sidecar_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(CONTENT_TYPE_SUFFIX);
    PathBuf::from(name)
}

/// Keys are relative `/`-separated paths with no empty, `.` or `..` segments.
pub fn validate_key(key: &str) -> Result<(), StorageError> {
    let invalid = || StorageError::InvalidKey(key.to_string());
    if key.is_empty() || key.starts_with('/') || key.ends_with(CONTENT_TYPE_SUFFIX) {
        return Err(invalid());
    }
    if key.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..") {
        return Err(invalid());
    }
    if key.contains('\\') || key.contains('\0') {
        return Err(invalid());
    }
    let all_normal = Path::new(key)
        .components()
        .all(|c| matches!(c, Component::Normal(_)));
    if !all_normal {
        return Err(invalid());
    }
    Ok(())
}
