//! File store clients answering existence probes.

use std::{collections::HashSet, path::Path};

use tracing::trace;

use crate::{config, probe::ExistenceClient};

#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    #[error("transport error: {0}")]
    Transport(reqwest::Error),
    #[error("unexpected status {code} for {path}")]
    Status {
        code: reqwest::StatusCode,
        path: String,
    },
}

/// Probes files served over HTTP with `HEAD` requests.
pub struct HttpClient {
    client: reqwest::Client,
}

impl HttpClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ExistenceClient for HttpClient {
    type Error = HttpError;

    async fn exists(&self, path: &str) -> Result<bool, Self::Error> {
        let response = self
            .client
            .head(path)
            .send()
            .await
            .map_err(HttpError::Transport)?;
        let code = response.status();
        trace!(%code, path, "probe");
        existence_from_status(code, path)
    }
}

/// `2xx` means the file exists, `404` and `410` that it does not.
fn existence_from_status(code: reqwest::StatusCode, path: &str) -> Result<bool, HttpError> {
    if code.is_success() {
        Ok(true)
    } else if code == reqwest::StatusCode::NOT_FOUND || code == reqwest::StatusCode::GONE {
        Ok(false)
    } else {
        Err(HttpError::Status {
            code,
            path: path.to_owned(),
        })
    }
}

/// Probes files stored in a local directory.
#[derive(Default)]
pub struct LocalClient {}

impl ExistenceClient for LocalClient {
    type Error = std::io::Error;

    async fn exists(&self, path: &str) -> Result<bool, Self::Error> {
        tokio::fs::try_exists(Path::new(path)).await
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    #[error("unreachable: {0}")]
    Unreachable(String),
}

/// In-memory file store, for dry runs and tests.
#[derive(Default)]
pub struct MemoryClient {
    paths: HashSet<String>,
    failures: HashSet<String>,
}

impl MemoryClient {
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.paths.insert(path.into());
        self
    }

    /// Make probes of `path` fail.
    pub fn with_failure(mut self, path: impl Into<String>) -> Self {
        self.failures.insert(path.into());
        self
    }
}

impl ExistenceClient for MemoryClient {
    type Error = MemoryError;

    async fn exists(&self, path: &str) -> Result<bool, Self::Error> {
        if self.failures.contains(path) {
            return Err(MemoryError::Unreachable(path.to_owned()));
        }
        Ok(self.paths.contains(path))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("http: {0}")]
    Http(HttpError),
    #[error("local: {0}")]
    Local(std::io::Error),
}

/// Client selected by configuration.
pub enum StorageClient {
    Http(HttpClient),
    Local(LocalClient),
}

impl StorageClient {
    pub fn from_config(storage: &config::FileStorage) -> Self {
        match storage {
            config::FileStorage::Http { .. } => Self::Http(HttpClient::new()),
            config::FileStorage::Local { .. } => Self::Local(LocalClient::default()),
        }
    }
}

impl ExistenceClient for StorageClient {
    type Error = StorageError;

    async fn exists(&self, path: &str) -> Result<bool, Self::Error> {
        match self {
            Self::Http(client) => client.exists(path).await.map_err(StorageError::Http),
            Self::Local(client) => client.exists(path).await.map_err(StorageError::Local),
        }
    }
}
