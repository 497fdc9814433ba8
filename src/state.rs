//! Editor state snapshots
//!
//! An [`EditorState`] bundles the working hierarchy with the pending file
//! map, page selections and deletion intents. Snapshots are immutable; every
//! edit produces a new one and leaves the previous snapshot untouched.

use std::{collections::HashSet, sync::Arc};

use tracing::debug;

use crate::{
    hierarchy::{FileId, Hierarchy},
    pending::PendingFiles,
    probe::ProbeReport,
    selection::{DeletionIntents, LeafPages, PageSelections},
};

#[derive(Clone, Debug, Default, PartialEq)]
pub struct EditorState {
    pub(crate) hierarchy: Hierarchy,
    pub(crate) pending: Arc<PendingFiles>,
    pub(crate) selections: Arc<PageSelections>,
    pub(crate) intents: Arc<DeletionIntents>,
    pub(crate) persisted: Arc<HashSet<FileId>>,
}

impl EditorState {
    /// Start editing a hierarchy loaded from the backend.
    pub fn load(hierarchy: Hierarchy) -> Self {
        let persisted = leaf_ids(&hierarchy);
        Self {
            hierarchy,
            persisted: Arc::new(persisted),
            ..Default::default()
        }
    }

    pub fn hierarchy(&self) -> &Hierarchy {
        &self.hierarchy
    }

    pub fn pending(&self) -> &PendingFiles {
        &self.pending
    }

    pub fn selections(&self) -> &PageSelections {
        &self.selections
    }

    pub fn intents(&self) -> &DeletionIntents {
        &self.intents
    }

    /// Whether `file_id` belongs to a leaf that exists on the backend.
    pub fn is_persisted(&self, file_id: &FileId) -> bool {
        self.persisted.contains(file_id)
    }

    /// Record existence results of a leaf.
    ///
    /// Pages found in the file store join the selection unless their deletion
    /// is staged. Pages selected or deselected since the report was requested
    /// keep their current state; staged uploads are read from this snapshot.
    pub fn apply_probe(&self, report: &ProbeReport) -> Self {
        let Some(file_id) = &report.file_id else {
            return self.clone();
        };
        let current = self.selections.get(file_id);
        let found = report
            .existence
            .iter()
            .filter_map(|(page, exists)| exists.then_some(page))
            .filter(|page| !self.intents.is_page_staged(page, file_id));
        let selected = current
            .into_iter()
            .flat_map(|pages| pages.selected.iter())
            .chain(found)
            .chain(self.pending.pages(file_id))
            .cloned()
            .collect();
        let mut existing = current
            .map(|pages| pages.existing.clone())
            .unwrap_or_default();
        existing.extend(report.existence.iter().map(|(page, exists)| (page.clone(), *exists)));
        let mut next = self.clone();
        Arc::make_mut(&mut next.selections)
            .insert(file_id.clone(), LeafPages { selected, existing });
        next
    }

    /// State after the backend accepted a submission of this snapshot.
    pub(crate) fn committed(&self) -> Self {
        let persisted = leaf_ids(&self.hierarchy);
        let mut selections = PageSelections::clone(&self.selections);
        for (file_id, page, _) in self.pending.iter() {
            selections
                .entry(file_id)
                .existing
                .insert(page.clone(), true);
        }
        for marker in self.intents.delete_files_of_pages() {
            selections
                .entry(&marker.file_id)
                .existing
                .insert(marker.page.clone(), false);
        }
        selections.retain(|file_id| persisted.contains(file_id));
        debug!(leaves = persisted.len(), "committed editor state");
        Self {
            hierarchy: self.hierarchy.clone(),
            pending: Default::default(),
            selections: Arc::new(selections),
            intents: Default::default(),
            persisted: Arc::new(persisted),
        }
    }
}

fn leaf_ids(hierarchy: &Hierarchy) -> HashSet<FileId> {
    hierarchy
        .leaves()
        .into_iter()
        .map(|(_, leaf)| leaf.file_id.clone())
        .collect()
}
