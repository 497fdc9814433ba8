//! Edit scripts
//!
//! A YAML list of edits replayed against a [`Session`] in order, standing in
//! for the clicks of an interactive editor:
//!
//! ```yaml
//! - op: add_branch
//!   parent: []
//!   name: Color
//! - op: add_leaf
//!   parent: [Color]
//!   name: Red
//!   files:
//!     front: red/front.svg
//! ```

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Deserialize;
use tracing::{debug, info};

use crate::{
    hierarchy::{OptionPath, PageId},
    mutation::EditError,
    pending::{self, PendingFile},
    session::Session,
};

#[derive(Debug, thiserror::Error)]
#[error("edit #{index}: {detail}")]
pub struct Error {
    pub index: usize,
    pub detail: ErrorDetail,
}

#[derive(Debug, thiserror::Error)]
pub enum ErrorDetail {
    #[error("{0}")]
    Edit(EditError),
    #[error("{0}")]
    Load(pending::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("Failed to read script {}: {error}", path.display())]
    Read {
        error: std::io::Error,
        path: PathBuf,
    },
    #[error("Failed to parse YAML script: {0}")]
    Parse(serde_yaml::Error),
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Edit {
    Rename {
        path: OptionPath,
        name: String,
    },
    AddBranch {
        parent: OptionPath,
        name: String,
    },
    /// New leaf with one upload per page it covers.
    AddLeaf {
        parent: OptionPath,
        name: String,
        files: IndexMap<PageId, PathBuf>,
    },
    Delete {
        path: OptionPath,
    },
    TogglePage {
        path: OptionPath,
        page: PageId,
    },
    Attach {
        path: OptionPath,
        page: PageId,
        file: PathBuf,
    },
}

pub fn parse(yaml: &str) -> Result<Vec<Edit>, LoadError> {
    serde_yaml::from_str(yaml).map_err(LoadError::Parse)
}

pub async fn load(path: &Path) -> Result<Vec<Edit>, LoadError> {
    let yaml = tokio::fs::read_to_string(path)
        .await
        .map_err(|error| LoadError::Read {
            error,
            path: path.to_owned(),
        })?;
    parse(&yaml)
}

async fn apply(session: &mut Session, edit: &Edit, base_dir: &Path) -> Result<(), ErrorDetail> {
    match edit {
        Edit::Rename { path, name } => session.rename(path, name).map_err(ErrorDetail::Edit),
        Edit::AddBranch { parent, name } => {
            session.add_branch(parent, name).map_err(ErrorDetail::Edit)
        }
        Edit::AddLeaf {
            parent,
            name,
            files,
        } => {
            let file_id = session.begin_leaf_draft(parent).map_err(ErrorDetail::Edit)?;
            let mut result = Ok(());
            for (page, file) in files {
                result = match PendingFile::load(&base_dir.join(file)).await {
                    Ok(file) => session
                        .attach_file(&file_id, page, file)
                        .map_err(ErrorDetail::Edit),
                    Err(error) => Err(ErrorDetail::Load(error)),
                };
                if result.is_err() {
                    break;
                }
            }
            let result =
                result.and_then(|()| session.add_leaf(parent, name, &file_id).map_err(ErrorDetail::Edit));
            if result.is_err() {
                session.cancel_leaf_draft(&file_id).map_err(ErrorDetail::Edit)?;
            }
            result
        }
        Edit::Delete { path } => session.delete(path).map_err(ErrorDetail::Edit),
        Edit::TogglePage { path, page } => session.toggle_page(path, page).map_err(ErrorDetail::Edit),
        Edit::Attach { path, page, file } => {
            let file = PendingFile::load(&base_dir.join(file))
                .await
                .map_err(ErrorDetail::Load)?;
            session
                .attach_leaf_file(path, page, file)
                .map_err(ErrorDetail::Edit)
        }
    }
}

/// Apply `edits` in order, resolving upload paths against `base_dir`.
/// Stops at the first edit that fails; earlier edits stay applied.
pub async fn replay(session: &mut Session, edits: &[Edit], base_dir: &Path) -> Result<(), Error> {
    for (index, edit) in edits.iter().enumerate() {
        debug!(index, ?edit, "replaying edit");
        apply(session, edit, base_dir)
            .await
            .map_err(|detail| Error { index, detail })?;
    }
    info!(edits = edits.len(), "replayed script");
    Ok(())
}
