use std::path::{Path, PathBuf};

use snafu::{ResultExt, Snafu, ensure};
use tracing::info;

use super::diff::ChangeNode;
use super::tree::{FilesystemError, RootSnafu, SnapshotNode};

/// A captured tree together with the canonical root it was captured from.
#[derive(Debug, Clone)]
pub struct Snapshot {
    root: PathBuf,
    tree: SnapshotNode,
}

impl Snapshot {
    pub fn capture(root: impl AsRef<Path>) -> Result<Self, FilesystemError> {
        let root = root.as_ref();
        let root = root.canonicalize().context(RootSnafu { path: root })?;
        let tree = SnapshotNode::capture(&root)?;
        info!("Captured {} entries under {}", tree.len(), root.display());

        Ok(Self { root, tree })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn tree(&self) -> &SnapshotNode {
        &self.tree
    }

    /// Changes in `after` relative to `before`. Both must come from the same root.
    pub fn diff(
        before: &Snapshot,
        after: &Snapshot,
    ) -> Result<Option<ChangeNode>, PreconditionError> {
        ensure!(
            before.root == after.root,
            RootMismatchSnafu {
                before: before.root.clone(),
                after: after.root.clone(),
            }
        );

        let changes = after.tree.changes_since(&before.tree);
        match &changes {
            Some(changes) => info!(
                "Found {} changed files under {}",
                changes.count_leaves(),
                after.root.display()
            ),
            None => info!("No changes under {}", after.root.display()),
        }
        Ok(changes)
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum PreconditionError {
    #[snafu(display(
        "Cannot compare snapshots of different roots: {} and {}",
        before.display(),
        after.display()
    ))]
    RootMismatch { before: PathBuf, after: PathBuf },
    #[snafu(display(
        "Change tree rooted at '{}' does not describe {}",
        root_name,
        base_dir.display()
    ))]
    ArchiveRootMismatch { base_dir: PathBuf, root_name: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filesystem::ChangeStatus;
    use filetime::{FileTime, set_file_mtime};
    use rstest::*;
    use std::fs;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    #[fixture]
    fn simple_dir() -> TempDir {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        for name in ["file_A.txt", "file_B.txt", "file_C.txt"] {
            fs::write(temp_dir.path().join(name), name).unwrap();
        }
        temp_dir
    }

    /// Rewrites `path` and pushes its mtime forward so the change is visible
    /// regardless of filesystem timestamp resolution.
    fn rewrite(path: &Path, content: &str) {
        fs::write(path, content).unwrap();
        let later = SystemTime::now() + Duration::from_secs(60);
        set_file_mtime(path, FileTime::from_system_time(later)).unwrap();
    }

    fn assert_no_changes(root: &Path, message: &str) {
        let before = Snapshot::capture(root).unwrap();
        let after = Snapshot::capture(root).unwrap();
        assert!(Snapshot::diff(&before, &after).unwrap().is_none(), "{message}");
    }

    #[rstest]
    fn simple_changes_are_found(simple_dir: TempDir) {
        let root = simple_dir.path();
        let before = Snapshot::capture(root).unwrap();

        rewrite(&root.join("file_New.txt"), "The new file!");
        rewrite(&root.join("file_A.txt"), "This file is changed");
        fs::remove_file(root.join("file_B.txt")).unwrap();

        let after = Snapshot::capture(root).unwrap();
        let changes = Snapshot::diff(&before, &after)
            .unwrap()
            .expect("No changes found");

        assert_eq!(changes.children().count(), 2);
        assert_eq!(changes.child("file_A.txt").unwrap().status(), ChangeStatus::Modified);
        assert_eq!(changes.child("file_New.txt").unwrap().status(), ChangeStatus::Added);
        assert!(changes.child("file_B.txt").is_none());
    }

    #[test]
    fn unchanged_trees_are_identical() {
        let temp_dir = TempDir::new().unwrap();
        assert_no_changes(temp_dir.path(), "Empty dir should be unchanged");

        let deep_dir = temp_dir.path().join("A").join("B").join("C");
        fs::create_dir_all(&deep_dir).unwrap();
        assert_no_changes(temp_dir.path(), "Deep empty dirs should be unchanged");

        fs::write(deep_dir.join("filey.txt"), "I'm a small filey").unwrap();
        assert_no_changes(
            temp_dir.path(),
            "Deep empty dirs with one file inside should be unchanged",
        );
    }

    #[rstest]
    fn nested_changes_are_pruned(simple_dir: TempDir) {
        let root = simple_dir.path();
        let dir_a = root.join("Dir_A");
        let dir_c = dir_a.join("Dir_C");
        fs::create_dir(&dir_a).unwrap();
        fs::write(dir_a.join("file"), "sample").unwrap();
        fs::create_dir(dir_a.join("Dir_B")).unwrap();
        fs::create_dir(&dir_c).unwrap();
        fs::write(dir_c.join("file_A"), "sample").unwrap();
        fs::write(dir_c.join("file_B"), "sample").unwrap();

        let before = Snapshot::capture(root).unwrap();
        rewrite(&dir_c.join("file_B"), "changed");
        rewrite(&dir_c.join("file_C"), "new");
        fs::create_dir(dir_a.join("Dir_D")).unwrap();
        let after = Snapshot::capture(root).unwrap();

        let changes = Snapshot::diff(&before, &after)
            .unwrap()
            .expect("No changes found");

        assert_eq!(
            changes.paths(),
            vec![
                PathBuf::from("Dir_A"),
                PathBuf::from("Dir_A/Dir_C"),
                PathBuf::from("Dir_A/Dir_C/file_B"),
                PathBuf::from("Dir_A/Dir_C/file_C"),
                PathBuf::from("Dir_A/Dir_D"),
            ]
        );
    }

    #[rstest]
    fn snapshots_of_different_roots_are_rejected(simple_dir: TempDir) {
        let other = TempDir::new().unwrap();
        let before = Snapshot::capture(simple_dir.path()).unwrap();
        let after = Snapshot::capture(other.path()).unwrap();

        let result = Snapshot::diff(&before, &after);

        assert!(matches!(result, Err(PreconditionError::RootMismatch { .. })));
    }

    #[test]
    fn capture_of_missing_root_fails() {
        let result = Snapshot::capture("/this/path/does/not/exist");

        assert!(matches!(result, Err(FilesystemError::RootError { .. })));
    }
}
