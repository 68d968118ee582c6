// src/blob_store.rs
use futures::future::BoxFuture;
use reqwest::StatusCode;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BlobError {
    #[error("Blob not found: {0}")]
    NotFound(String),
    #[error("Invalid blob path: {0}")]
    InvalidPath(String),
    #[error("Blob I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("Blob request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Blob store answered {status} for {path}")]
    Status { status: u16, path: String },
    #[error("Failed to acquire blob store lock")]
    LockPoisoned,
}

/// Opaque object storage addressed by relative paths.
pub trait BlobStore: Send + Sync {
    /// Stores bytes and returns a URL for the stored object.
    fn put<'a>(&'a self, path: &'a str, bytes: Vec<u8>) -> BoxFuture<'a, Result<String, BlobError>>;
    fn get<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<Vec<u8>, BlobError>>;
    fn exists<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<bool, BlobError>>;
    fn delete<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<(), BlobError>>;
}

fn check_path(path: &str) -> Result<&str, BlobError> {
    let trimmed = path.trim_start_matches('/');
    let escapes = Path::new(trimmed)
        .components()
        .any(|c| !matches!(c, Component::Normal(_)));
    if trimmed.is_empty() || escapes {
        return Err(BlobError::InvalidPath(path.to_string()));
    }
    Ok(trimmed)
}

// --- LOCAL DISK ---

pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, BlobError> {
        Ok(self.root.join(check_path(path)?))
    }
}

impl BlobStore for LocalBlobStore {
    fn put<'a>(&'a self, path: &'a str, bytes: Vec<u8>) -> BoxFuture<'a, Result<String, BlobError>> {
        Box::pin(async move {
            let target = self.resolve(path)?;
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&target, bytes).await?;
            Ok(format!("file://{}", target.display()))
        })
    }

    fn get<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<Vec<u8>, BlobError>> {
        Box::pin(async move {
            let target = self.resolve(path)?;
            match tokio::fs::read(&target).await {
                Ok(bytes) => Ok(bytes),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    Err(BlobError::NotFound(path.to_string()))
                }
                Err(e) => Err(e.into()),
            }
        })
    }

    fn exists<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<bool, BlobError>> {
        Box::pin(async move {
            let target = self.resolve(path)?;
            Ok(tokio::fs::try_exists(&target).await?)
        })
    }

    fn delete<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<(), BlobError>> {
        Box::pin(async move {
            let target = self.resolve(path)?;
            match tokio::fs::remove_file(&target).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(e.into()),
            }
        })
    }
}

// --- HTTP OBJECT STORE ---

/// Talks to an object store that accepts plain PUT/GET/HEAD/DELETE on
/// `{base_url}/{path}`, optionally with a bearer token.
pub struct HttpBlobStore {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpBlobStore {
    pub fn new(base_url: &str, token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    fn url_for(&self, path: &str) -> Result<String, BlobError> {
        Ok(format!("{}/{}", self.base_url, check_path(path)?))
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

fn status_error(status: StatusCode, path: &str) -> BlobError {
    BlobError::Status {
        status: status.as_u16(),
        path: path.to_string(),
    }
}

impl BlobStore for HttpBlobStore {
    fn put<'a>(&'a self, path: &'a str, bytes: Vec<u8>) -> BoxFuture<'a, Result<String, BlobError>> {
        Box::pin(async move {
            let url = self.url_for(path)?;
            let response = self
                .request(reqwest::Method::PUT, &url)
                .body(bytes)
                .send()
                .await?;
            if !response.status().is_success() {
                return Err(status_error(response.status(), path));
            }
            log::info!("☁️ Uploaded blob {}", url);
            Ok(url)
        })
    }

    fn get<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<Vec<u8>, BlobError>> {
        Box::pin(async move {
            let url = self.url_for(path)?;
            let response = self.request(reqwest::Method::GET, &url).send().await?;
            match response.status() {
                StatusCode::NOT_FOUND => Err(BlobError::NotFound(path.to_string())),
                s if s.is_success() => Ok(response.bytes().await?.to_vec()),
                s => Err(status_error(s, path)),
            }
        })
    }

    fn exists<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<bool, BlobError>> {
        Box::pin(async move {
            let url = self.url_for(path)?;
            let response = self.request(reqwest::Method::HEAD, &url).send().await?;
            match response.status() {
                StatusCode::NOT_FOUND => Ok(false),
                s if s.is_success() => Ok(true),
                s => Err(status_error(s, path)),
            }
        })
    }

    fn delete<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<(), BlobError>> {
        Box::pin(async move {
            let url = self.url_for(path)?;
            let response = self.request(reqwest::Method::DELETE, &url).send().await?;
            match response.status() {
                StatusCode::NOT_FOUND => Ok(()),
                s if s.is_success() => Ok(()),
                s => Err(status_error(s, path)),
            }
        })
    }
}

// --- IN MEMORY ---

#[derive(Default)]
pub struct MemoryBlobStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self
            .objects
            .lock()
            .map(|o| o.keys().cloned().collect())
            .unwrap_or_default();
        paths.sort();
        paths
    }
}

impl BlobStore for MemoryBlobStore {
    fn put<'a>(&'a self, path: &'a str, bytes: Vec<u8>) -> BoxFuture<'a, Result<String, BlobError>> {
        Box::pin(async move {
            let key = check_path(path)?.to_string();
            let url = format!("memory://{}", key);
            self.objects
                .lock()
                .map_err(|_| BlobError::LockPoisoned)?
                .insert(key, bytes);
            Ok(url)
        })
    }

    fn get<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<Vec<u8>, BlobError>> {
        Box::pin(async move {
            let key = check_path(path)?;
            self.objects
                .lock()
                .map_err(|_| BlobError::LockPoisoned)?
                .get(key)
                .cloned()
                .ok_or_else(|| BlobError::NotFound(path.to_string()))
        })
    }

    fn exists<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<bool, BlobError>> {
        Box::pin(async move {
            let key = check_path(path)?;
            Ok(self
                .objects
                .lock()
                .map_err(|_| BlobError::LockPoisoned)?
                .contains_key(key))
        })
    }

    fn delete<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<(), BlobError>> {
        Box::pin(async move {
            let key = check_path(path)?;
            self.objects
                .lock()
                .map_err(|_| BlobError::LockPoisoned)?
                .remove(key);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_local_store_lifecycle() {
        let root = std::env::temp_dir().join(format!("cutline-blobs-{}", uuid::Uuid::new_v4()));
        let store = LocalBlobStore::new(&root);

        let url = store.put("exports/p1/out.mp4", b"data".to_vec()).await.unwrap();
        assert!(url.starts_with("file://"));
        assert!(store.exists("exports/p1/out.mp4").await.unwrap());
        assert_eq!(store.get("exports/p1/out.mp4").await.unwrap(), b"data");

        store.delete("exports/p1/out.mp4").await.unwrap();
        assert!(!store.exists("exports/p1/out.mp4").await.unwrap());
        assert!(matches!(
            store.get("exports/p1/out.mp4").await,
            Err(BlobError::NotFound(_))
        ));

        let _ = std::fs::remove_dir_all(root);
    }

    #[tokio::test]
    async fn test_paths_cannot_escape() {
        let store = MemoryBlobStore::new();
        assert!(matches!(
            store.put("../secret", vec![]).await,
            Err(BlobError::InvalidPath(_))
        ));
        assert!(store.put("", vec![]).await.is_err());
        assert_eq!(
            store.put("/a/b.txt", vec![1]).await.unwrap(),
            "memory://a/b.txt"
        );
        assert_eq!(store.paths(), vec!["a/b.txt".to_string()]);
    }
}
