//! Selective archives built from change trees, and their extraction.

mod format;
mod pack;
mod unpack;

use std::path::PathBuf;

use snafu::Snafu;

use crate::ext::BestEffortPathExt;
use crate::filesystem::{EntryKind, PreconditionError};

pub use format::ArchiveFormat;
pub use pack::pack_changes;
pub use unpack::unpack_into;

#[derive(Debug, Snafu)]
pub enum ArchiveError {
    #[snafu(display(
        "Unsupported archive extension for {}, expected .tar, .tar.gz, .tgz, .tar.zst or .tzst",
        path.display()
    ))]
    UnsupportedFormatError { path: PathBuf },
    #[snafu(display("Failed to create archive {}", path.best_effort_path_display()))]
    CreateError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("Failed to read {} while archiving", path.best_effort_path_display()))]
    SourceError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display(
        "{} changed from {} to {} since it was diffed",
        path.best_effort_path_display(),
        expected,
        actual
    ))]
    KindChangedError {
        path: PathBuf,
        expected: EntryKind,
        actual: EntryKind,
    },
    #[snafu(display("Failed to append {} to the archive", path.best_effort_path_display()))]
    AppendError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("Failed to finish archive {}", path.best_effort_path_display()))]
    FinishError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("Failed to open archive {}", path.best_effort_path_display()))]
    OpenError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("Corrupt or unreadable entry in archive {}", path.best_effort_path_display()))]
    EntryError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("Failed to prepare extraction target {}", path.best_effort_path_display()))]
    TargetError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display(
        "Failed to extract {} into {}",
        entry.display(),
        target.best_effort_path_display()
    ))]
    ExtractError {
        entry: PathBuf,
        target: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("Archive entry {} points outside the extraction target", entry.display()))]
    UnsafeEntryError { entry: PathBuf },
    #[snafu(display("Archive request does not match its change tree"))]
    PreconditionError { source: PreconditionError },
}
