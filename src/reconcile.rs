//! File-count reconciliation
//!
//! Compares, per leaf, the number of selected pages with the number of pages
//! that will have a file after submission. A leaf with fewer files than
//! selected pages blocks submission.

use crate::{
    hierarchy::{FileId, OptionPath},
    state::EditorState,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileCount {
    pub path: OptionPath,
    pub file_id: FileId,
    /// Selected pages with a staged upload or a persisted file that is kept.
    pub file_uploads: usize,
    pub selected_pages: usize,
}

impl FileCount {
    pub fn is_complete(&self) -> bool {
        self.file_uploads >= self.selected_pages
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("\"{name}\": selected {selected} pages, uploaded {uploaded} files")]
pub struct Shortfall {
    pub path: OptionPath,
    pub name: String,
    pub selected: usize,
    pub uploaded: usize,
}

/// Counts for a single file id; `(file_uploads, selected_pages)`.
pub fn count_files(state: &EditorState, file_id: &FileId) -> (usize, usize) {
    let Some(pages) = state.selections().get(file_id) else {
        return (0, 0);
    };
    let file_uploads = pages
        .selected
        .iter()
        .filter(|page| {
            state.pending().contains(file_id, page)
                || (pages.exists(page) && !state.intents().is_page_staged(page, file_id))
        })
        .count();
    (file_uploads, pages.selected.len())
}

/// Counts for every leaf whose pages have been probed or edited.
pub fn reconcile(state: &EditorState) -> Vec<FileCount> {
    state
        .hierarchy()
        .leaves()
        .into_iter()
        .filter(|(_, leaf)| state.selections().get(&leaf.file_id).is_some())
        .map(|(path, leaf)| {
            let (file_uploads, selected_pages) = count_files(state, &leaf.file_id);
            FileCount {
                path,
                file_id: leaf.file_id.clone(),
                file_uploads,
                selected_pages,
            }
        })
        .collect()
}

/// First leaf that would be submitted with missing files.
pub fn ensure_complete(state: &EditorState) -> Result<(), Shortfall> {
    match reconcile(state).into_iter().find(|count| !count.is_complete()) {
        Some(count) => Err(Shortfall {
            name: count.path.name().unwrap_or_default().to_owned(),
            path: count.path,
            selected: count.selected_pages,
            uploaded: count.file_uploads,
        }),
        None => Ok(()),
    }
}
