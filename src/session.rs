//! Editing session
//!
//! A [`Session`] owns the snapshot loaded from the backend and the working
//! snapshot being edited. Edits are applied strictly in call order; nothing
//! reaches the backend until [`Session::submit`], and [`Session::cancel`]
//! throws away the working snapshot together with every staged upload and
//! deletion intent.

use std::{
    collections::{HashMap, HashSet},
    fmt,
};

use futures::future::join_all;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::{
    hierarchy::{FileId, Hierarchy, Node, OptionPath, PageId},
    mutation::EditError,
    pending::{PendingFile, PendingFiles},
    probe::{ExistenceClient, FileLayout, ProbeKey, ProbeReport, probe_leaf},
    reconcile::{self, Shortfall},
    state::EditorState,
    submit::{Backend, SubmitRequest, SubmitResponse},
};

/// Edit a node is currently undergoing in the editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Add,
    Update,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operation::Add => "add",
            Operation::Update => "update",
            Operation::Delete => "delete",
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SubmitError<E> {
    #[error("{0}")]
    Incomplete(Shortfall),
    #[error("backend: {0}")]
    Backend(E),
    #[error("backend rejected the submission: {message}")]
    Rejected { message: String },
}

/// Probe that still has to be run for one leaf.
#[derive(Debug, Clone)]
pub struct ProbeRequest {
    key: ProbeKey,
    layout: FileLayout,
    pending: PendingFiles,
}

impl ProbeRequest {
    pub fn file_id(&self) -> &FileId {
        &self.key.file_id
    }

    pub async fn run<C: ExistenceClient>(self, client: &C) -> ProbeReport {
        probe_leaf(
            client,
            &self.layout,
            Some(&self.key.file_id),
            &self.key.pages,
            &self.pending,
        )
        .await
    }
}

pub struct Session {
    pages: Vec<PageId>,
    layout: FileLayout,
    baseline: EditorState,
    state: EditorState,
    operations: HashMap<OptionPath, Operation>,
    /// Drafted leaves not added yet, with the parent they will be added under.
    drafts: IndexMap<FileId, OptionPath>,
    probed: HashSet<ProbeKey>,
}

impl Session {
    pub fn new(hierarchy: Hierarchy, pages: Vec<PageId>, layout: FileLayout) -> Self {
        let state = EditorState::load(hierarchy);
        Self {
            pages,
            layout,
            baseline: state.clone(),
            state,
            operations: HashMap::new(),
            drafts: IndexMap::new(),
            probed: HashSet::new(),
        }
    }

    pub fn state(&self) -> &EditorState {
        &self.state
    }

    pub fn hierarchy(&self) -> &Hierarchy {
        self.state.hierarchy()
    }

    pub fn pages(&self) -> &[PageId] {
        &self.pages
    }

    /// Whether the working snapshot differs from the one last loaded or saved.
    pub fn is_dirty(&self) -> bool {
        self.state != self.baseline
    }

    pub fn should_render(&self, path: &OptionPath) -> bool {
        self.state.hierarchy().should_render(path)
    }

    pub fn operation(&self, path: &OptionPath) -> Option<Operation> {
        self.operations.get(path).copied()
    }

    /// Mark `path` as undergoing `operation`. Siblings are not affected.
    pub fn begin(&mut self, path: &OptionPath, operation: Operation) -> Result<(), EditError> {
        if let Some(current) = self.operations.get(path) {
            return Err(EditError::OperationInProgress {
                path: path.clone(),
                operation: *current,
            });
        }
        self.operations.insert(path.clone(), operation);
        Ok(())
    }

    pub fn end(&mut self, path: &OptionPath) -> Option<Operation> {
        self.operations.remove(path)
    }

    fn check_page(&self, page: &PageId) -> Result<(), EditError> {
        if self.pages.contains(page) {
            Ok(())
        } else {
            Err(EditError::UnknownPage { page: page.clone() })
        }
    }

    fn leaf_file_id(&self, path: &OptionPath) -> Result<FileId, EditError> {
        match self.state.hierarchy().get(path) {
            Some(Node::Leaf(leaf)) => Ok(leaf.file_id.clone()),
            Some(Node::Branch(_)) => Err(EditError::NotALeaf { path: path.clone() }),
            None => Err(EditError::NotFound { path: path.clone() }),
        }
    }

    fn forget_operations_under(&mut self, path: &OptionPath) {
        self.operations.retain(|marked, _| !marked.starts_with(path));
    }

    pub fn rename(&mut self, path: &OptionPath, new_name: &str) -> Result<(), EditError> {
        self.state = self.state.rename(path, new_name)?;
        if let (Some(parent), Some(name)) = (path.parent(), path.name()) {
            let renamed = parent.child(new_name.trim());
            if renamed.name() != Some(name) {
                self.operations = self
                    .operations
                    .drain()
                    .map(|(marked, op)| (marked.rebase(path, &renamed).unwrap_or(marked), op))
                    .collect();
                for parent in self.drafts.values_mut() {
                    if let Some(rebased) = parent.rebase(path, &renamed) {
                        *parent = rebased;
                    }
                }
            }
            if self.operation(&renamed) == Some(Operation::Update) {
                self.end(&renamed);
            }
        }
        Ok(())
    }

    pub fn add_branch(&mut self, parent: &OptionPath, name: &str) -> Result<(), EditError> {
        self.state = self.state.add_branch(parent, name)?;
        if !self.drafts.values().any(|draft_parent| draft_parent == parent) {
            self.end(parent);
        }
        Ok(())
    }

    /// Start drafting a new leaf under `parent` and return its file id.
    pub fn begin_leaf_draft(&mut self, parent: &OptionPath) -> Result<FileId, EditError> {
        if self.state.hierarchy().children(parent).is_none() {
            return Err(match self.state.hierarchy().get(parent) {
                Some(_) => EditError::NotABranch {
                    path: parent.clone(),
                },
                None => EditError::NotFound {
                    path: parent.clone(),
                },
            });
        }
        self.begin(parent, Operation::Add)?;
        let file_id = FileId::generate();
        debug!(%parent, %file_id, "drafting leaf");
        self.drafts.insert(file_id.clone(), parent.clone());
        Ok(file_id)
    }

    pub fn is_draft(&self, file_id: &FileId) -> bool {
        self.drafts.contains_key(file_id)
    }

    /// Drop a draft together with its staged uploads.
    pub fn cancel_leaf_draft(&mut self, file_id: &FileId) -> Result<(), EditError> {
        let parent = self
            .drafts
            .shift_remove(file_id)
            .ok_or_else(|| EditError::UnknownDraft {
                file_id: file_id.clone(),
            })?;
        self.state = self.state.discard_file(file_id);
        self.end(&parent);
        Ok(())
    }

    pub fn add_leaf(
        &mut self,
        parent: &OptionPath,
        name: &str,
        file_id: &FileId,
    ) -> Result<(), EditError> {
        self.state = self.state.add_leaf(parent, name, file_id)?;
        if let Some(draft_parent) = self.drafts.shift_remove(file_id) {
            self.end(&draft_parent);
        }
        Ok(())
    }

    pub fn delete(&mut self, path: &OptionPath) -> Result<(), EditError> {
        self.state = self.state.delete(path)?;
        self.forget_operations_under(path);
        let orphaned = self
            .drafts
            .iter()
            .filter(|(_, parent)| parent.starts_with(path))
            .map(|(file_id, _)| file_id.clone())
            .collect::<Vec<_>>();
        for file_id in orphaned {
            self.drafts.shift_remove(&file_id);
            self.state = self.state.discard_file(&file_id);
        }
        Ok(())
    }

    pub fn toggle_page(&mut self, path: &OptionPath, page: &PageId) -> Result<(), EditError> {
        self.check_page(page)?;
        self.state = self.state.toggle_page_selection(path, page)?;
        Ok(())
    }

    pub fn toggle_draft_page(&mut self, file_id: &FileId, page: &PageId) -> Result<(), EditError> {
        self.check_page(page)?;
        if !self.is_draft(file_id) {
            return Err(EditError::UnknownDraft {
                file_id: file_id.clone(),
            });
        }
        self.state = self.state.toggle_page(file_id, page);
        Ok(())
    }

    /// Stage an upload (picked or dropped) for a draft or an existing leaf.
    pub fn attach_file(
        &mut self,
        file_id: &FileId,
        page: &PageId,
        file: PendingFile,
    ) -> Result<(), EditError> {
        self.check_page(page)?;
        if !self.is_draft(file_id) && self.state.hierarchy().find_leaf(file_id).is_none() {
            return Err(EditError::UnknownFile {
                file_id: file_id.clone(),
            });
        }
        self.state = self.state.attach_file(file_id, page, file);
        Ok(())
    }

    pub fn attach_leaf_file(
        &mut self,
        path: &OptionPath,
        page: &PageId,
        file: PendingFile,
    ) -> Result<(), EditError> {
        let file_id = self.leaf_file_id(path)?;
        self.attach_file(&file_id, page, file)
    }

    pub fn detach_file(&mut self, file_id: &FileId, page: &PageId) {
        self.state = self.state.detach_file(file_id, page);
    }

    /// Probe needed for the leaf at `path`, or `None` when this leaf was
    /// already probed for the configured pages.
    pub fn probe_request(&mut self, path: &OptionPath) -> Result<Option<ProbeRequest>, EditError> {
        let file_id = self.leaf_file_id(path)?;
        if file_id.is_blank() {
            return Ok(None);
        }
        let key = ProbeKey {
            file_id,
            pages: self.pages.clone(),
        };
        if !self.probed.insert(key.clone()) {
            return Ok(None);
        }
        Ok(Some(ProbeRequest {
            key,
            layout: self.layout.clone(),
            pending: self.state.pending().clone(),
        }))
    }

    /// Record a finished probe in the working snapshot and in the snapshot
    /// [`Session::cancel`] restores. A snapshot that no longer holds the leaf
    /// ignores the report.
    pub fn apply_probe(&mut self, report: &ProbeReport) {
        let Some(file_id) = &report.file_id else {
            return;
        };
        if self.baseline.hierarchy().find_leaf(file_id).is_some() {
            self.baseline = self.baseline.apply_probe(report);
        }
        if self.state.hierarchy().find_leaf(file_id).is_some() {
            self.state = self.state.apply_probe(report);
        } else {
            debug!(%file_id, "leaf removed while probing");
        }
    }

    /// Probe every leaf not probed yet, concurrently.
    pub async fn probe_all<C: ExistenceClient>(&mut self, client: &C) -> usize {
        let paths = self
            .state
            .hierarchy()
            .leaves()
            .into_iter()
            .map(|(path, _)| path)
            .collect::<Vec<_>>();
        let requests = paths
            .into_iter()
            .filter_map(|path| self.probe_request(&path).ok().flatten())
            .collect::<Vec<_>>();
        let reports = join_all(requests.into_iter().map(|request| request.run(client))).await;
        for report in &reports {
            self.apply_probe(report);
        }
        reports.len()
    }

    /// Throw away every edit since the last load or save.
    pub fn cancel(&mut self) {
        info!("discarding edits");
        self.state = self.baseline.clone();
        self.operations.clear();
        self.drafts.clear();
        let selections = self.state.selections();
        self.probed.retain(|key| selections.get(&key.file_id).is_some());
    }

    /// Send the working snapshot to the backend.
    ///
    /// On any failure the working snapshot is kept as it is so the user can
    /// retry.
    pub async fn submit<B: Backend>(
        &mut self,
        backend: &B,
    ) -> Result<SubmitResponse, SubmitError<B::Error>>
    where
        B::Error: fmt::Display,
    {
        reconcile::ensure_complete(&self.state)
            .map_err(SubmitError::Incomplete)
            .inspect_err(|error| error!(%error, "submission blocked"))?;
        let request = SubmitRequest::from_state(&self.state);
        let response = backend
            .submit(&request)
            .await
            .map_err(SubmitError::Backend)
            .inspect_err(|error| error!(%error, "failed to submit"))?;
        if !response.success {
            error!(reason = %response.message, "backend rejected submission");
            return Err(SubmitError::Rejected {
                message: response.message,
            });
        }
        info!(
            uploads = request.uploads.len(),
            files_to_delete = request.files_to_delete.len(),
            delete_files_of_pages = request.delete_files_of_pages.len(),
            "submitted"
        );
        self.state = self.state.committed();
        self.baseline = self.state.clone();
        self.operations.clear();
        self.drafts.clear();
        Ok(response)
    }
}
