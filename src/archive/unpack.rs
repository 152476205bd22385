use std::fs::{self, File};
use std::path::{Component, Path};

use snafu::{OptionExt, ResultExt, ensure};
use tar::Archive;
use tracing::{debug, info};

use super::format::ArchiveFormat;
use super::{
    ArchiveError, EntrySnafu, ExtractSnafu, OpenSnafu, TargetSnafu, UnsafeEntrySnafu,
    UnsupportedFormatSnafu,
};

/// Restores the contents of `archive_path` under `target_dir`.
///
/// Extraction merges: files already present at the same relative path are
/// overwritten, anything not in the archive is left alone. Entries that would
/// land outside `target_dir` are rejected.
pub fn unpack_into(target_dir: &Path, archive_path: &Path) -> Result<(), ArchiveError> {
    let format = ArchiveFormat::from_path(archive_path)
        .context(UnsupportedFormatSnafu { path: archive_path })?;

    fs::create_dir_all(target_dir).context(TargetSnafu { path: target_dir })?;
    let file = File::open(archive_path).context(OpenSnafu { path: archive_path })?;
    let reader = format.reader(file).context(OpenSnafu { path: archive_path })?;

    let mut archive = Archive::new(reader);
    archive.set_preserve_permissions(true);
    archive.set_preserve_mtime(true);
    archive.set_overwrite(true);

    let mut count = 0usize;
    for entry in archive.entries().context(EntrySnafu { path: archive_path })? {
        let mut entry = entry.context(EntrySnafu { path: archive_path })?;
        let entry_path = entry
            .path()
            .context(EntrySnafu { path: archive_path })?
            .into_owned();

        ensure!(!is_absolute_entry(&entry_path), UnsafeEntrySnafu { entry: entry_path });

        debug!("Extracting {}", entry_path.display());
        let unpacked = entry.unpack_in(target_dir).context(ExtractSnafu {
            entry: entry_path.clone(),
            target: target_dir,
        })?;
        ensure!(unpacked, UnsafeEntrySnafu { entry: entry_path });
        count += 1;
    }

    info!(
        "Extracted {} entries from {} into {}",
        count,
        archive_path.display(),
        target_dir.display()
    );
    Ok(())
}

fn is_absolute_entry(path: &Path) -> bool {
    path.has_root() || matches!(path.components().next(), Some(Component::Prefix(_)))
}
