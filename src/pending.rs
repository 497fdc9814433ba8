//! File association store
//!
//! Uploads picked or dropped during an editing session are staged here,
//! keyed by the leaf's file id and the page they belong to, until the session
//! is submitted.

use std::path::{Path, PathBuf};

use derive_debug::Dbg;
use indexmap::IndexMap;
use tracing::trace;

use crate::hierarchy::{FileId, PageId};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to read upload ({path:?}): {error}")]
    Read {
        error: std::io::Error,
        path: PathBuf,
    },
}

#[derive(Dbg, Clone, PartialEq, Eq)]
pub struct PendingFile {
    pub name: String,
    pub content_type: String,
    pub hash: blake3::Hash,
    #[dbg(skip)]
    pub body: bytes::Bytes,
}

impl PendingFile {
    pub fn new(name: impl Into<String>, body: impl Into<bytes::Bytes>) -> Self {
        let name = name.into();
        let body = body.into();
        let content_type = mime_guess::from_path(&name)
            .first_or_octet_stream()
            .essence_str()
            .to_owned();
        Self {
            hash: blake3::hash(&body),
            content_type,
            name,
            body,
        }
    }

    pub async fn load(path: &Path) -> Result<Self, Error> {
        let body = tokio::fs::read(path).await.map_err(|error| Error::Read {
            error,
            path: path.to_owned(),
        })?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        trace!(?path, size = body.len(), "loaded upload");
        Ok(Self::new(name, body))
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct PendingFiles {
    files: IndexMap<FileId, IndexMap<PageId, PendingFile>>,
}

impl PendingFiles {
    pub fn get(&self, file_id: &FileId, page: &PageId) -> Option<&PendingFile> {
        self.files.get(file_id)?.get(page)
    }

    pub fn contains(&self, file_id: &FileId, page: &PageId) -> bool {
        self.get(file_id, page).is_some()
    }

    /// Number of pages holding a staged upload for `file_id`.
    pub fn count(&self, file_id: &FileId) -> usize {
        self.files.get(file_id).map(IndexMap::len).unwrap_or(0)
    }

    pub fn pages(&self, file_id: &FileId) -> impl Iterator<Item = &PageId> {
        self.files.get(file_id).into_iter().flat_map(IndexMap::keys)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FileId, &PageId, &PendingFile)> {
        self.files
            .iter()
            .flat_map(|(file_id, pages)| pages.iter().map(move |(page, file)| (file_id, page, file)))
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn insert(&mut self, file_id: FileId, page: PageId, file: PendingFile) -> Option<PendingFile> {
        self.files.entry(file_id).or_default().insert(page, file)
    }

    pub fn remove(&mut self, file_id: &FileId, page: &PageId) -> Option<PendingFile> {
        let pages = self.files.get_mut(file_id)?;
        let removed = pages.shift_remove(page);
        if pages.is_empty() {
            self.files.shift_remove(file_id);
        }
        removed
    }

    pub fn remove_all(&mut self, file_id: &FileId) -> usize {
        self.files
            .shift_remove(file_id)
            .map(|pages| pages.len())
            .unwrap_or(0)
    }
}
