//! Existence probe
//!
//! Checks, page by page, whether a leaf's file already exists in the file
//! store. Probes run concurrently and a failing probe only marks its own page
//! as missing.

use futures::future::join_all;
use indexmap::{IndexMap, IndexSet};
use tracing::{debug, warn};

use crate::{
    hierarchy::{FileId, PageId},
    pending::PendingFiles,
};

pub trait ExistenceClient {
    type Error: std::fmt::Display;

    /// Whether a resource exists at the fully qualified `path`.
    fn exists(&self, path: &str) -> impl Future<Output = Result<bool, Self::Error>> + Send;
}

/// Where persisted page files live: `<base_path>/<page>/<file_id>.<extension>`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileLayout {
    pub base_path: String,
    pub extension: String,
}

impl FileLayout {
    pub fn new(base_path: impl Into<String>, extension: impl Into<String>) -> Self {
        Self {
            base_path: base_path.into(),
            extension: extension.into(),
        }
    }

    pub fn path(&self, page: &PageId, file_id: &FileId) -> String {
        format!(
            "{}/{page}/{file_id}.{}",
            self.base_path.trim_end_matches('/'),
            self.extension
        )
    }
}

/// Identity of one probe run; a leaf is probed once per distinct key.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ProbeKey {
    pub file_id: FileId,
    pub pages: Vec<PageId>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProbeReport {
    pub file_id: Option<FileId>,
    pub existence: IndexMap<PageId, bool>,
    /// Pages with a persisted file or a staged upload.
    pub selected: IndexSet<PageId>,
}

/// Probe every page in `pages` for `file_id`.
pub async fn probe_leaf<C: ExistenceClient>(
    client: &C,
    layout: &FileLayout,
    file_id: Option<&FileId>,
    pages: &[PageId],
    pending: &PendingFiles,
) -> ProbeReport {
    let Some(file_id) = file_id.filter(|file_id| !file_id.is_blank()) else {
        return ProbeReport::default();
    };
    let probes = pages.iter().map(|page| async move {
        let path = layout.path(page, file_id);
        match client.exists(&path).await {
            Ok(exists) => (page.clone(), exists),
            Err(error) => {
                warn!(%error, %path, "existence probe failed, treating page as missing");
                (page.clone(), false)
            }
        }
    });
    let existence = join_all(probes).await.into_iter().collect::<IndexMap<_, _>>();
    let selected = existence
        .iter()
        .filter_map(|(page, exists)| exists.then(|| page.clone()))
        .chain(pending.pages(file_id).cloned())
        .collect::<IndexSet<_>>();
    debug!(%file_id, ?existence, ?selected, "probed leaf");
    ProbeReport {
        file_id: Some(file_id.clone()),
        existence,
        selected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{pending::PendingFile, storage::MemoryClient};

    fn pages() -> Vec<PageId> {
        ["front", "side", "top"].map(PageId::new).to_vec()
    }

    #[test]
    fn test_layout_path() {
        let layout = FileLayout::new("https://files.example/gad/", "svg");
        assert_eq!(
            layout.path(&PageId::new("front"), &FileId::new("f1")),
            "https://files.example/gad/front/f1.svg"
        );
    }

    #[tokio::test]
    async fn test_failing_probe_does_not_abort_batch() {
        let layout = FileLayout::new("/files", "svg");
        let client = MemoryClient::default()
            .with_path("/files/front/f1.svg")
            .with_path("/files/top/f1.svg")
            .with_failure("/files/side/f1.svg");
        let report = probe_leaf(
            &client,
            &layout,
            Some(&FileId::new("f1")),
            &pages(),
            &PendingFiles::default(),
        )
        .await;
        assert_eq!(report.existence.get(&PageId::new("front")), Some(&true));
        assert_eq!(report.existence.get(&PageId::new("side")), Some(&false));
        assert_eq!(report.existence.get(&PageId::new("top")), Some(&true));
        assert_eq!(
            report.selected,
            IndexSet::from([PageId::new("front"), PageId::new("top")])
        );
    }

    #[tokio::test]
    async fn test_selected_includes_pending_uploads() {
        let layout = FileLayout::new("/files", "svg");
        let client = MemoryClient::default().with_path("/files/front/f1.svg");
        let mut pending = PendingFiles::default();
        pending.insert(
            FileId::new("f1"),
            PageId::new("side"),
            PendingFile::new("side.svg", b"<svg/>".to_vec()),
        );
        let report = probe_leaf(&client, &layout, Some(&FileId::new("f1")), &pages(), &pending).await;
        assert_eq!(
            report.selected,
            IndexSet::from([PageId::new("front"), PageId::new("side")])
        );
        assert_eq!(report.existence.get(&PageId::new("side")), Some(&false));
    }

    #[tokio::test]
    async fn test_missing_file_id_short_circuits() {
        let layout = FileLayout::new("/files", "svg");
        let client = MemoryClient::default().with_failure("/files/front/.svg");
        let report = probe_leaf(&client, &layout, None, &pages(), &PendingFiles::default()).await;
        assert_eq!(report, ProbeReport::default());
        let blank = FileId::new("");
        let report =
            probe_leaf(&client, &layout, Some(&blank), &pages(), &PendingFiles::default()).await;
        assert!(report.existence.is_empty());
    }
}
