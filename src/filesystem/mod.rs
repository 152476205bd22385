//! Filesystem snapshots and the change trees computed between them.
//!
//! A [`Snapshot`] records every entry under a root together with its
//! modification time. Comparing two snapshots of the same root yields a sparse
//! [`ChangeNode`] tree holding only what was added or modified, or `None` when
//! nothing changed.

mod diff;
mod render;
mod snapshot;
mod tree;

pub use diff::{ChangeNode, ChangeStatus};
pub use render::{render_changes, render_snapshot};
pub(crate) use snapshot::ArchiveRootMismatchSnafu;
pub use snapshot::{PreconditionError, Snapshot};
pub use tree::{EntryKind, FilesystemError, SnapshotNode};
