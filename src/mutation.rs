//! Node mutation engine
//!
//! Structural edits of the option hierarchy. Each edit takes a snapshot and
//! returns a new one; only the nodes along the edited path are rebuilt, every
//! other subtree is shared with the previous snapshot. Validation failures
//! leave the input snapshot as it was.

use std::sync::Arc;

use tracing::debug;

use crate::{
    hierarchy::{FileId, Hierarchy, NONE_SELECTION, Node, OptionPath, Options, PageId, Selection},
    pending::PendingFile,
    selection::PageFileRef,
    session::Operation,
    state::EditorState,
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EditError {
    #[error("Option name must not be empty")]
    EmptyName,
    #[error("\"{name}\" is reserved and cannot be used as an option name")]
    ReservedName { name: String },
    #[error("An option named \"{name}\" already exists in {parent}")]
    NameTaken { parent: OptionPath, name: String },
    #[error("{path} does not exist")]
    NotFound { path: OptionPath },
    #[error("{path} cannot hold child options")]
    NotABranch { path: OptionPath },
    #[error("{path} is not bound to a file")]
    NotALeaf { path: OptionPath },
    #[error("The root cannot be renamed or deleted")]
    RootPath,
    #[error("Select at least one page for \"{name}\"")]
    NoPagesSelected { name: String },
    #[error("\"{name}\": selected {selected} pages, uploaded {uploaded} files")]
    UploadMismatch {
        name: String,
        selected: usize,
        uploaded: usize,
    },
    #[error("File {file_id} is already bound to {path}")]
    FileIdInUse { file_id: FileId, path: OptionPath },
    #[error("Page {page} is not configured")]
    UnknownPage { page: PageId },
    #[error("{path} already has a pending {operation} operation")]
    OperationInProgress {
        path: OptionPath,
        operation: Operation,
    },
    #[error("No draft exists for file {file_id}")]
    UnknownDraft { file_id: FileId },
    #[error("File {file_id} is not bound to any option or draft")]
    UnknownFile { file_id: FileId },
}

fn validate_name(name: &str) -> Result<&str, EditError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(EditError::EmptyName);
    }
    if name == NONE_SELECTION {
        return Err(EditError::ReservedName {
            name: name.to_owned(),
        });
    }
    Ok(name)
}

fn split_path(path: &OptionPath) -> Result<(OptionPath, &str), EditError> {
    match (path.parent(), path.name()) {
        (Some(parent), Some(name)) => Ok((parent, name)),
        _ => Err(EditError::RootPath),
    }
}

/// Rebuild the hierarchy along `parent` and run `edit` on its children.
///
/// `edit` also receives the selection of `parent`, or `None` when `parent` is
/// the root.
fn edit_children<T>(
    hierarchy: &Hierarchy,
    parent: &OptionPath,
    edit: impl FnOnce(&mut Options, Option<&mut Selection>) -> Result<T, EditError>,
) -> Result<(Hierarchy, T), EditError> {
    fn descend<T>(
        options: &mut Options,
        selected: Option<&mut Selection>,
        rest: &[String],
        parent: &OptionPath,
        edit: impl FnOnce(&mut Options, Option<&mut Selection>) -> Result<T, EditError>,
    ) -> Result<T, EditError> {
        let Some((head, tail)) = rest.split_first() else {
            return edit(options, selected);
        };
        let child = options.get_mut(head).ok_or_else(|| EditError::NotFound {
            path: parent.clone(),
        })?;
        match Arc::make_mut(child) {
            Node::Branch(branch) => descend(
                &mut branch.options,
                Some(&mut branch.selected),
                tail,
                parent,
                edit,
            ),
            Node::Leaf(_) => Err(EditError::NotABranch {
                path: parent.clone(),
            }),
        }
    }

    let mut roots = Options::clone(&hierarchy.roots);
    let out = descend(&mut roots, None, parent.segments(), parent, edit)?;
    Ok((
        Hierarchy {
            roots: Arc::new(roots),
        },
        out,
    ))
}

impl EditorState {
    fn with_hierarchy(&self, hierarchy: Hierarchy) -> Self {
        Self {
            hierarchy,
            ..self.clone()
        }
    }

    /// Move the node at `path` under `new_name`, keeping its position.
    pub fn rename(&self, path: &OptionPath, new_name: &str) -> Result<Self, EditError> {
        let (parent, old_name) = split_path(path)?;
        let new_name = validate_name(new_name)?;
        if new_name == old_name {
            return if self.hierarchy.should_render(path) {
                Ok(self.clone())
            } else {
                Err(EditError::NotFound { path: path.clone() })
            };
        }
        let (hierarchy, ()) = edit_children(&self.hierarchy, &parent, |options, selected| {
            let index = options
                .get_index_of(old_name)
                .ok_or_else(|| EditError::NotFound { path: path.clone() })?;
            if options.contains_key(new_name) {
                return Err(EditError::NameTaken {
                    parent: parent.clone(),
                    name: new_name.to_owned(),
                });
            }
            let (_, node) = options
                .shift_remove_index(index)
                .ok_or_else(|| EditError::NotFound { path: path.clone() })?;
            options.shift_insert(index, new_name.to_owned(), node);
            if let Some(selected) = selected
                && selected.is(old_name)
            {
                *selected = Selection::Chosen(new_name.to_owned());
            }
            Ok(())
        })?;
        debug!(%path, new_name, "renamed option");
        Ok(self.with_hierarchy(hierarchy))
    }

    /// Bind a new leaf named `name` under `parent` to the staged uploads of `file_id`.
    pub fn add_leaf(
        &self,
        parent: &OptionPath,
        name: &str,
        file_id: &FileId,
    ) -> Result<Self, EditError> {
        let name = validate_name(name)?;
        let selected = self.selections.selected_count(file_id);
        if selected == 0 {
            return Err(EditError::NoPagesSelected {
                name: name.to_owned(),
            });
        }
        let uploaded = self.pending.count(file_id);
        if uploaded != selected {
            return Err(EditError::UploadMismatch {
                name: name.to_owned(),
                selected,
                uploaded,
            });
        }
        if let Some(path) = self.hierarchy.find_leaf(file_id) {
            return Err(EditError::FileIdInUse {
                file_id: file_id.clone(),
                path,
            });
        }
        let (hierarchy, ()) = edit_children(&self.hierarchy, parent, |options, _| {
            if options.contains_key(name) {
                return Err(EditError::NameTaken {
                    parent: parent.clone(),
                    name: name.to_owned(),
                });
            }
            options.insert(name.to_owned(), Arc::new(Node::leaf(file_id.clone())));
            Ok(())
        })?;
        debug!(%parent, name, %file_id, pages = selected, "added leaf");
        Ok(self.with_hierarchy(hierarchy))
    }

    /// Add an empty branch named `name` under `parent`.
    pub fn add_branch(&self, parent: &OptionPath, name: &str) -> Result<Self, EditError> {
        let name = validate_name(name)?;
        let (hierarchy, ()) = edit_children(&self.hierarchy, parent, |options, _| {
            if options.contains_key(name) {
                return Err(EditError::NameTaken {
                    parent: parent.clone(),
                    name: name.to_owned(),
                });
            }
            let selected = Selection::unset_at_depth(parent.depth() + 1);
            options.insert(name.to_owned(), Arc::new(Node::branch(selected)));
            Ok(())
        })?;
        debug!(%parent, name, "added branch");
        Ok(self.with_hierarchy(hierarchy))
    }

    /// Remove the node at `path` together with its subtree.
    ///
    /// Persisted files of removed leaves are staged for deletion; uploads
    /// staged for them are dropped.
    pub fn delete(&self, path: &OptionPath) -> Result<Self, EditError> {
        let (parent, name) = split_path(path)?;
        let (hierarchy, removed) = edit_children(&self.hierarchy, &parent, |options, selected| {
            let removed = options
                .shift_remove(name)
                .ok_or_else(|| EditError::NotFound { path: path.clone() })?;
            if let Some(selected) = selected
                && selected.is(name)
            {
                *selected = Selection::unset_at_depth(parent.depth());
            }
            Ok(removed)
        })?;
        let mut next = self.with_hierarchy(hierarchy);
        for file_id in removed.leaf_file_ids() {
            Arc::make_mut(&mut next.pending).remove_all(&file_id);
            Arc::make_mut(&mut next.selections).remove(&file_id);
            let intents = Arc::make_mut(&mut next.intents);
            if self.is_persisted(&file_id) {
                intents.stage_file(file_id);
            } else {
                intents.forget_file(&file_id);
            }
        }
        debug!(%path, "deleted option");
        Ok(next)
    }

    /// Toggle whether the leaf at `path` covers `page`.
    pub fn toggle_page_selection(&self, path: &OptionPath, page: &PageId) -> Result<Self, EditError> {
        match self.hierarchy.get(path) {
            Some(Node::Leaf(leaf)) => Ok(self.toggle_page(&leaf.file_id, page)),
            Some(Node::Branch(_)) => Err(EditError::NotALeaf { path: path.clone() }),
            None => Err(EditError::NotFound { path: path.clone() }),
        }
    }

    /// Toggle `page` for `file_id`, which may belong to a leaf not yet added.
    pub fn toggle_page(&self, file_id: &FileId, page: &PageId) -> Self {
        let mut next = self.clone();
        let pages = Arc::make_mut(&mut next.selections).entry(file_id);
        let marker = PageFileRef::new(page.clone(), file_id.clone());
        if pages.is_selected(page) {
            pages.selected.shift_remove(page);
            Arc::make_mut(&mut next.pending).remove(file_id, page);
            if pages.exists(page) {
                Arc::make_mut(&mut next.intents).stage_page(marker);
            }
            debug!(%file_id, %page, "deselected page");
        } else {
            Arc::make_mut(&mut next.intents).unstage_page(&marker);
            pages.selected.insert(page.clone());
            debug!(%file_id, %page, "selected page");
        }
        next
    }

    /// Stage an upload for `page`, selecting the page if needed.
    pub fn attach_file(&self, file_id: &FileId, page: &PageId, file: PendingFile) -> Self {
        let mut next = self.clone();
        debug!(%file_id, %page, ?file, "attached file");
        Arc::make_mut(&mut next.pending).insert(file_id.clone(), page.clone(), file);
        Arc::make_mut(&mut next.selections)
            .entry(file_id)
            .selected
            .insert(page.clone());
        Arc::make_mut(&mut next.intents)
            .unstage_page(&PageFileRef::new(page.clone(), file_id.clone()));
        next
    }

    /// Drop the staged upload for `page`; the page stays selected.
    pub fn detach_file(&self, file_id: &FileId, page: &PageId) -> Self {
        let mut next = self.clone();
        if Arc::make_mut(&mut next.pending).remove(file_id, page).is_some() {
            debug!(%file_id, %page, "detached file");
        }
        next
    }

    /// Forget uploads and page selection of a file that never became a leaf.
    pub(crate) fn discard_file(&self, file_id: &FileId) -> Self {
        let mut next = self.clone();
        Arc::make_mut(&mut next.pending).remove_all(file_id);
        Arc::make_mut(&mut next.selections).remove(file_id);
        next
    }
}
