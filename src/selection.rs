//! Page selection model and deletion intents
//!
//! Every leaf tracks which pages its file currently covers, together with the
//! existence status reported by the existence probe. Removals of persisted
//! files are only staged here and applied by the backend on submit.

use std::fmt;

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

use crate::hierarchy::{FileId, PageId};

/// Separator used by the backend for composite page/file deletion markers.
pub const PAGE_FILE_SEPARATOR: &str = "<<&&>>";

/// A single page of a persisted file.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PageFileRef {
    pub page: PageId,
    pub file_id: FileId,
}

impl PageFileRef {
    pub fn new(page: PageId, file_id: FileId) -> Self {
        Self { page, file_id }
    }
}

impl fmt::Display for PageFileRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{PAGE_FILE_SEPARATOR}{}", self.page, self.file_id)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("malformed page file marker: {0}")]
pub struct ParsePageFileRefError(String);

impl std::str::FromStr for PageFileRef {
    type Err = ParsePageFileRefError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (page, file_id) = s
            .split_once(PAGE_FILE_SEPARATOR)
            .ok_or_else(|| ParsePageFileRefError(s.to_owned()))?;
        Ok(Self::new(PageId::new(page), FileId::new(file_id)))
    }
}

impl Serialize for PageFileRef {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PageFileRef {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Removals collected during editing and applied on submit.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DeletionIntents {
    files_to_delete: IndexSet<FileId>,
    delete_files_of_pages: IndexSet<PageFileRef>,
}

impl DeletionIntents {
    pub fn files_to_delete(&self) -> impl Iterator<Item = &FileId> {
        self.files_to_delete.iter()
    }

    pub fn delete_files_of_pages(&self) -> impl Iterator<Item = &PageFileRef> {
        self.delete_files_of_pages.iter()
    }

    pub fn is_file_staged(&self, file_id: &FileId) -> bool {
        self.files_to_delete.contains(file_id)
    }

    pub fn is_page_staged(&self, page: &PageId, file_id: &FileId) -> bool {
        self.delete_files_of_pages
            .contains(&PageFileRef::new(page.clone(), file_id.clone()))
    }

    pub fn is_empty(&self) -> bool {
        self.files_to_delete.is_empty() && self.delete_files_of_pages.is_empty()
    }

    pub(crate) fn stage_file(&mut self, file_id: FileId) {
        self.delete_files_of_pages
            .retain(|marker| marker.file_id != file_id);
        self.files_to_delete.insert(file_id);
    }

    pub(crate) fn stage_page(&mut self, marker: PageFileRef) {
        self.delete_files_of_pages.insert(marker);
    }

    pub(crate) fn unstage_page(&mut self, marker: &PageFileRef) -> bool {
        self.delete_files_of_pages.shift_remove(marker)
    }

    pub(crate) fn forget_file(&mut self, file_id: &FileId) {
        self.delete_files_of_pages
            .retain(|marker| &marker.file_id != file_id);
    }
}

/// Pages covered by one leaf's file.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LeafPages {
    pub selected: IndexSet<PageId>,
    pub existing: IndexMap<PageId, bool>,
}

impl LeafPages {
    pub fn is_selected(&self, page: &PageId) -> bool {
        self.selected.contains(page)
    }

    /// Whether the probe found a persisted file for `page`.
    pub fn exists(&self, page: &PageId) -> bool {
        self.existing.get(page).copied().unwrap_or(false)
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct PageSelections {
    leaves: IndexMap<FileId, LeafPages>,
}

impl PageSelections {
    pub fn get(&self, file_id: &FileId) -> Option<&LeafPages> {
        self.leaves.get(file_id)
    }

    pub fn selected_count(&self, file_id: &FileId) -> usize {
        self.leaves
            .get(file_id)
            .map(|pages| pages.selected.len())
            .unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FileId, &LeafPages)> {
        self.leaves.iter()
    }

    pub(crate) fn entry(&mut self, file_id: &FileId) -> &mut LeafPages {
        self.leaves.entry(file_id.clone()).or_default()
    }

    pub(crate) fn insert(&mut self, file_id: FileId, pages: LeafPages) {
        self.leaves.insert(file_id, pages);
    }

    pub(crate) fn remove(&mut self, file_id: &FileId) -> Option<LeafPages> {
        self.leaves.shift_remove(file_id)
    }

    pub(crate) fn retain(&mut self, mut keep: impl FnMut(&FileId) -> bool) {
        self.leaves.retain(|file_id, _| keep(file_id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_file_marker_wire_format() {
        let marker = PageFileRef::new(PageId::new("front"), FileId::new("f1"));
        assert_eq!(marker.to_string(), "front<<&&>>f1");
        assert_eq!(serde_json::to_value(&marker).unwrap(), "front<<&&>>f1");
        let parsed: PageFileRef = serde_json::from_str("\"side<<&&>>f2\"").unwrap();
        assert_eq!(parsed, PageFileRef::new(PageId::new("side"), FileId::new("f2")));
        assert!("no-separator".parse::<PageFileRef>().is_err());
    }

    #[test]
    fn test_staging_whole_file_supersedes_page_markers() {
        let mut intents = DeletionIntents::default();
        let f1 = FileId::new("f1");
        intents.stage_page(PageFileRef::new(PageId::new("front"), f1.clone()));
        intents.stage_page(PageFileRef::new(PageId::new("front"), FileId::new("f2")));
        intents.stage_file(f1.clone());
        assert!(intents.is_file_staged(&f1));
        assert!(!intents.is_page_staged(&PageId::new("front"), &f1));
        assert!(intents.is_page_staged(&PageId::new("front"), &FileId::new("f2")));
    }

    #[test]
    fn test_markers_are_deduplicated() {
        let mut intents = DeletionIntents::default();
        let marker = PageFileRef::new(PageId::new("top"), FileId::new("f1"));
        intents.stage_page(marker.clone());
        intents.stage_page(marker.clone());
        assert_eq!(intents.delete_files_of_pages().count(), 1);
        assert!(intents.unstage_page(&marker));
        assert!(intents.is_empty());
    }
}
