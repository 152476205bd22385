use std::collections::BTreeMap;
use std::ffi::{OsStr, OsString};
use std::fs::{self, FileType};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use derive_more::Display;
use snafu::{ResultExt, Snafu};
use tracing::debug;

use crate::ext::BestEffortPathExt;

/// Represents the type of a filesystem node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum EntryKind {
    #[display("file")]
    File,
    #[display("directory")]
    Directory,
    /// Symbolic links are recorded as opaque leaves and never followed
    #[display("symlink")]
    Symlink,
}

impl EntryKind {
    pub fn is_directory(self) -> bool {
        self == EntryKind::Directory
    }
}

impl From<FileType> for EntryKind {
    fn from(file_type: FileType) -> Self {
        if file_type.is_symlink() {
            EntryKind::Symlink
        } else if file_type.is_dir() {
            EntryKind::Directory
        } else {
            EntryKind::File
        }
    }
}

/// Immutable record of one filesystem entry and, for directories, everything below it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotNode {
    name: OsString,
    kind: EntryKind,
    modified_time: SystemTime,
    children: BTreeMap<OsString, SnapshotNode>,
}

impl SnapshotNode {
    /// Recursively captures `path`.
    ///
    /// Any failure to stat or list an entry aborts the whole capture; a partial
    /// tree is never returned.
    pub fn capture(path: &Path) -> Result<Self, FilesystemError> {
        let metadata = fs::symlink_metadata(path).context(StatSnafu { path })?;
        let kind = EntryKind::from(metadata.file_type());
        let modified_time = metadata.modified().context(StatSnafu { path })?;

        let mut children = BTreeMap::new();
        if kind.is_directory() {
            for entry in fs::read_dir(path).context(ListSnafu { path })? {
                let entry = entry.context(ListSnafu { path })?;
                let child = Self::capture(&entry.path())?;
                children.insert(child.name.clone(), child);
            }
        }

        debug!(
            "Captured {} {} ({} children)",
            kind,
            path.display(),
            children.len()
        );

        Ok(Self {
            name: entry_name(path),
            kind,
            modified_time,
            children,
        })
    }

    pub fn name(&self) -> &OsStr {
        &self.name
    }

    pub fn kind(&self) -> EntryKind {
        self.kind
    }

    pub fn is_directory(&self) -> bool {
        self.kind.is_directory()
    }

    pub fn modified_time(&self) -> SystemTime {
        self.modified_time
    }

    pub fn child(&self, name: impl AsRef<OsStr>) -> Option<&SnapshotNode> {
        self.children.get(name.as_ref())
    }

    pub fn children(&self) -> impl Iterator<Item = &SnapshotNode> {
        self.children.values()
    }

    /// Number of nodes in this subtree, including this one
    pub fn len(&self) -> usize {
        1 + self.children().map(SnapshotNode::len).sum::<usize>()
    }

    #[cfg(test)]
    pub(crate) fn new_for_test(
        name: &str,
        kind: EntryKind,
        modified_time: SystemTime,
        children: Vec<SnapshotNode>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            modified_time,
            children: children
                .into_iter()
                .map(|child| (child.name.clone(), child))
                .collect(),
        }
    }
}

/// Base name of `path`, falling back to the whole path for roots such as `/`.
fn entry_name(path: &Path) -> OsString {
    path.file_name()
        .map(OsStr::to_os_string)
        .unwrap_or_else(|| path.as_os_str().to_os_string())
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum FilesystemError {
    #[snafu(display("Failed to stat {}", path.best_effort_path_display()))]
    StatError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("Failed to list directory {}", path.best_effort_path_display()))]
    ListError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("Failed to resolve snapshot root {}", path.display()))]
    RootError {
        path: PathBuf,
        source: std::io::Error,
    },
}
