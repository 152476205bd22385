use std::path::{Path, PathBuf};

use compio::fs;
use snafu::{OptionExt, ResultExt, Snafu, ensure};
use tracing::debug;

use crate::ext::BestEffortPathExt;

/// Fetch-blob-by-id capability.
pub trait BlobStore {
    /// Writes blob `id` into `dest_dir` under its original file name and returns the written path.
    async fn fetch(&self, id: &str, dest_dir: &Path) -> Result<PathBuf, BlobStoreError>;
}

/// Blob store backed by a local directory: blob `<id>` is the single file
/// stored in `<root>/<id>/`, whose name is the blob's original file name.
#[derive(Debug, Clone)]
pub struct DirectoryBlobStore {
    root: PathBuf,
}

impl DirectoryBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn locate(&self, id: &str) -> Result<PathBuf, BlobStoreError> {
        ensure!(
            !id.is_empty() && !id.contains(['/', '\\']) && id != "." && id != "..",
            InvalidIdSnafu { id }
        );

        let blob_dir = self.root.join(id);
        let mut files = Vec::new();
        for entry in std::fs::read_dir(&blob_dir).context(LookupSnafu { id, path: &blob_dir })? {
            let entry = entry.context(LookupSnafu { id, path: &blob_dir })?;
            let file_type = entry
                .file_type()
                .context(LookupSnafu { id, path: entry.path() })?;
            if file_type.is_file() {
                files.push(entry.path());
            }
        }

        ensure!(files.len() <= 1, AmbiguousSnafu { id });
        files.pop().context(NotFoundSnafu { id })
    }
}

impl BlobStore for DirectoryBlobStore {
    async fn fetch(&self, id: &str, dest_dir: &Path) -> Result<PathBuf, BlobStoreError> {
        let source = self.locate(id)?;
        let file_name = source.file_name().context(NotFoundSnafu { id })?;
        let destination = dest_dir.join(file_name);

        let bytes = fs::read(&source)
            .await
            .context(LookupSnafu { id, path: &source })?;
        debug!(
            "Fetched blob '{}' ({} bytes) into {}",
            id,
            bytes.len(),
            destination.best_effort_path_display()
        );
        fs::write(&destination, bytes)
            .await
            .0
            .context(WriteSnafu { path: &destination })?;

        Ok(destination)
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum BlobStoreError {
    #[snafu(display("Blob id '{}' is not valid", id))]
    InvalidIdError { id: String },
    #[snafu(display("Blob '{}' does not exist", id))]
    NotFoundError { id: String },
    #[snafu(display("Blob '{}' holds more than one file", id))]
    AmbiguousError { id: String },
    #[snafu(display("Failed to read blob '{}' from {}", id, path.best_effort_path_display()))]
    LookupError {
        id: String,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("Failed to write blob to {}", path.best_effort_path_display()))]
    WriteError {
        path: PathBuf,
        source: std::io::Error,
    },
}
