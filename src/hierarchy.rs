//! Option hierarchy
//!
//! This module defines the tree of customizable design options. Every node is
//! either a leaf bound to a per-page file or a branch holding named children
//! and the name of the currently selected child.

use std::{fmt, sync::Arc};

use indexmap::IndexMap;
use itertools::Itertools as _;
use serde::{Deserialize, Serialize};

/// Selection sentinel used by nested branches.
pub const BLANK_SELECTION: &str = " ";
/// Selection sentinel used by top-level components.
pub const NONE_SELECTION: &str = "none";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Failed to parse hierarchy: {0}")]
    Parse(serde_json::Error),
    #[error("{path}: selected option \"{selected}\" does not exist")]
    DanglingSelection { path: OptionPath, selected: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(String);

impl FileId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Allocate a fresh identifier for a leaf that is being created.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageId(String);

impl PageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Sequence of option names leading from the root to a node.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OptionPath(Vec<String>);

impl OptionPath {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn new<S: Into<String>>(segments: impl IntoIterator<Item = S>) -> Self {
        Self(segments.into_iter().map(Into::into).collect())
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    /// Last segment, `None` for the root.
    pub fn name(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    pub fn parent(&self) -> Option<Self> {
        let (_, parent) = self.0.split_last()?;
        Some(Self(parent.to_vec()))
    }

    pub fn child(&self, name: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(name.into());
        Self(segments)
    }

    pub fn starts_with(&self, prefix: &OptionPath) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// Replace the `from` prefix of this path with `to`.
    pub fn rebase(&self, from: &OptionPath, to: &OptionPath) -> Option<Self> {
        let rest = self.0.strip_prefix(from.0.as_slice())?;
        Some(Self(to.0.iter().chain(rest).cloned().collect()))
    }
}

impl fmt::Display for OptionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            f.write_str("<root>")
        } else {
            write!(f, "{}", self.0.iter().join("/"))
        }
    }
}

/// Currently active child of a branch.
///
/// The two "nothing chosen" sentinels are kept apart on purpose: top-level
/// components store `"none"` while nested branches store a single space.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Selection {
    Chosen(String),
    Blank,
    NoneChosen,
}

impl Selection {
    /// Sentinel for a branch found at `depth` (1 is a top-level component).
    pub fn unset_at_depth(depth: usize) -> Self {
        if depth <= 1 {
            Self::NoneChosen
        } else {
            Self::Blank
        }
    }

    pub fn chosen(&self) -> Option<&str> {
        match self {
            Self::Chosen(name) => Some(name.as_str()),
            Self::Blank | Self::NoneChosen => None,
        }
    }

    pub fn is(&self, name: &str) -> bool {
        self.chosen() == Some(name)
    }

    pub fn as_wire(&self) -> &str {
        match self {
            Self::Chosen(name) => name.as_str(),
            Self::Blank => BLANK_SELECTION,
            Self::NoneChosen => NONE_SELECTION,
        }
    }

    /// An empty string reads as [`Selection::Blank`] and is written back as
    /// `" "`, so `""` does not survive a round trip.
    fn from_wire(value: String) -> Self {
        match value.as_str() {
            "" | BLANK_SELECTION => Self::Blank,
            NONE_SELECTION => Self::NoneChosen,
            _ => Self::Chosen(value),
        }
    }
}

impl Serialize for Selection {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_wire())
    }
}

impl<'de> Deserialize<'de> for Selection {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::from_wire)
    }
}

pub type Options = IndexMap<String, Arc<Node>>;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Leaf {
    pub file_id: FileId,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Branch {
    pub selected: Selection,
    #[serde(default)]
    pub options: Options,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Node {
    Leaf(Leaf),
    Branch(Branch),
}

impl Node {
    pub fn leaf(file_id: FileId) -> Self {
        Self::Leaf(Leaf { file_id })
    }

    pub fn branch(selected: Selection) -> Self {
        Self::Branch(Branch {
            selected,
            options: Options::new(),
        })
    }

    /// File ids of this node and every leaf below it.
    pub fn leaf_file_ids(&self) -> Vec<FileId> {
        let mut ids = Vec::new();
        self.collect_file_ids(&mut ids);
        ids
    }

    fn collect_file_ids(&self, ids: &mut Vec<FileId>) {
        match self {
            Node::Leaf(leaf) => ids.push(leaf.file_id.clone()),
            Node::Branch(branch) => branch
                .options
                .values()
                .for_each(|child| child.collect_file_ids(ids)),
        }
    }
}

/// Immutable snapshot of the whole option tree.
///
/// Cloning is cheap: subtrees are reference counted and shared between
/// snapshots until one of them is edited.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Hierarchy {
    pub(crate) roots: Arc<Options>,
}

impl Hierarchy {
    pub fn from_json(json: &str) -> Result<Self, Error> {
        serde_json::from_str(json).map_err(Error::Parse)
    }

    pub fn options(&self) -> &Options {
        &self.roots
    }

    pub fn get(&self, path: &OptionPath) -> Option<&Node> {
        let (first, rest) = path.segments().split_first()?;
        let mut node = self.roots.get(first)?.as_ref();
        for name in rest {
            match node {
                Node::Branch(branch) => node = branch.options.get(name)?.as_ref(),
                Node::Leaf(_) => return None,
            }
        }
        Some(node)
    }

    /// Whether a row keyed by `path` still points at a live node.
    pub fn should_render(&self, path: &OptionPath) -> bool {
        self.get(path).is_some()
    }

    /// Children of the root or of a branch; `None` for leaves and missing paths.
    pub fn children(&self, parent: &OptionPath) -> Option<&Options> {
        if parent.is_root() {
            return Some(&self.roots);
        }
        match self.get(parent)? {
            Node::Branch(branch) => Some(&branch.options),
            Node::Leaf(_) => None,
        }
    }

    /// Every leaf in depth-first order together with its path.
    pub fn leaves(&self) -> Vec<(OptionPath, &Leaf)> {
        fn walk<'a>(options: &'a Options, path: &OptionPath, out: &mut Vec<(OptionPath, &'a Leaf)>) {
            for (name, node) in options {
                let path = path.child(name.clone());
                match node.as_ref() {
                    Node::Leaf(leaf) => out.push((path, leaf)),
                    Node::Branch(branch) => walk(&branch.options, &path, out),
                }
            }
        }
        let mut out = Vec::new();
        walk(&self.roots, &OptionPath::root(), &mut out);
        out
    }

    pub fn find_leaf(&self, file_id: &FileId) -> Option<OptionPath> {
        self.leaves()
            .into_iter()
            .find_map(|(path, leaf)| (&leaf.file_id == file_id).then_some(path))
    }

    /// Report branches whose selection names a child that does not exist.
    pub fn check(&self) -> Vec<Error> {
        fn walk(options: &Options, path: &OptionPath, problems: &mut Vec<Error>) {
            for (name, node) in options {
                let Node::Branch(branch) = node.as_ref() else {
                    continue;
                };
                let path = path.child(name.clone());
                if let Some(selected) = branch.selected.chosen()
                    && !branch.options.contains_key(selected)
                {
                    problems.push(Error::DanglingSelection {
                        path: path.clone(),
                        selected: selected.to_owned(),
                    });
                }
                walk(&branch.options, &path, problems);
            }
        }
        let mut problems = Vec::new();
        walk(&self.roots, &OptionPath::root(), &mut problems);
        problems
    }
}
