use std::collections::BTreeMap;
use std::ffi::{OsStr, OsString};
use std::path::PathBuf;

use derive_more::Display;

use super::tree::{EntryKind, SnapshotNode};

/// Why a node is part of a change tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ChangeStatus {
    /// Not present in the baseline
    #[display("added")]
    Added,
    /// Leaf whose modification time differs from the baseline
    #[display("modified")]
    Modified,
    /// Present in the baseline with another kind
    #[display("replaced")]
    Replaced,
    /// Directory present in both snapshots with changes somewhere below
    #[display("contains changes")]
    Contains,
}

/// Sparse tree holding only the additions and modifications between two snapshots.
///
/// A `ChangeNode` is never empty: a directory only appears when something below
/// it changed, or when it is itself new. "No changes" is expressed as `None` by
/// [`SnapshotNode::changes_since`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeNode {
    name: OsString,
    kind: EntryKind,
    status: ChangeStatus,
    children: BTreeMap<OsString, ChangeNode>,
}

impl ChangeNode {
    /// The whole `node` subtree, every entry marked as added
    fn added(node: &SnapshotNode) -> Self {
        Self::wholesale(node, ChangeStatus::Added)
    }

    /// `node` replaced an entry of a different kind; its descendants are all new
    fn replaced(node: &SnapshotNode) -> Self {
        Self::wholesale(node, ChangeStatus::Replaced)
    }

    fn wholesale(node: &SnapshotNode, status: ChangeStatus) -> Self {
        Self {
            name: node.name().to_os_string(),
            kind: node.kind(),
            status,
            children: node
                .children()
                .map(|child| (child.name().to_os_string(), Self::added(child)))
                .collect(),
        }
    }

    fn modified(node: &SnapshotNode) -> Self {
        Self {
            name: node.name().to_os_string(),
            kind: node.kind(),
            status: ChangeStatus::Modified,
            children: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &OsStr {
        &self.name
    }

    pub fn kind(&self) -> EntryKind {
        self.kind
    }

    pub fn status(&self) -> ChangeStatus {
        self.status
    }

    pub fn is_directory(&self) -> bool {
        self.kind.is_directory()
    }

    pub fn child(&self, name: impl AsRef<OsStr>) -> Option<&ChangeNode> {
        self.children.get(name.as_ref())
    }

    pub fn children(&self) -> impl Iterator<Item = &ChangeNode> {
        self.children.values()
    }

    /// Number of files and symlinks in the change tree
    pub fn count_leaves(&self) -> usize {
        if self.is_directory() {
            self.children().map(ChangeNode::count_leaves).sum()
        } else {
            1
        }
    }

    /// Paths of every node below the root, relative to it, in depth-first order.
    pub fn paths(&self) -> Vec<PathBuf> {
        let mut paths = Vec::new();
        for child in self.children() {
            child.collect_paths(PathBuf::new(), &mut paths);
        }
        paths
    }

    fn collect_paths(&self, parent: PathBuf, paths: &mut Vec<PathBuf>) {
        let path = parent.join(&self.name);
        paths.push(path.clone());
        for child in self.children() {
            child.collect_paths(path.clone(), paths);
        }
    }
}

impl SnapshotNode {
    /// Computes what was added or modified in `self` relative to `before`.
    ///
    /// Deleted entries are not represented. Directory modification times are
    /// ignored; a directory is only part of the result through its contents,
    /// unless it is new. The root names of the two trees are not compared.
    pub fn changes_since(&self, before: &SnapshotNode) -> Option<ChangeNode> {
        match (before.kind(), self.kind()) {
            (EntryKind::Directory, EntryKind::Directory) => {
                let children = self
                    .children()
                    .filter_map(|after_child| match before.child(after_child.name()) {
                        None => Some(ChangeNode::added(after_child)),
                        Some(before_child) => after_child.changes_since(before_child),
                    })
                    .map(|change| (change.name.clone(), change))
                    .collect::<BTreeMap<_, _>>();

                if children.is_empty() {
                    return None;
                }

                Some(ChangeNode {
                    name: self.name().to_os_string(),
                    kind: EntryKind::Directory,
                    status: ChangeStatus::Contains,
                    children,
                })
            }
            (before_kind, after_kind) if before_kind == after_kind => {
                (before.modified_time() != self.modified_time()).then(|| ChangeNode::modified(self))
            }
            _ => Some(ChangeNode::replaced(self)),
        }
    }
}
