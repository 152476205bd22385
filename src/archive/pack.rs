use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use snafu::{OptionExt, ResultExt, ensure};
use tar::Builder;
use tracing::{debug, info, warn};

use super::format::ArchiveFormat;
use super::{
    AppendSnafu, ArchiveError, CreateSnafu, FinishSnafu, KindChangedSnafu, PreconditionSnafu,
    SourceSnafu, UnsupportedFormatSnafu,
};
use crate::filesystem::{ArchiveRootMismatchSnafu, ChangeNode, EntryKind};

/// Writes exactly the entries named by `changes` into a new archive at `output`.
///
/// `base_dir` is the live directory the change tree describes; entries are
/// stored as `<root name>/<relative path>`. On failure the partially written
/// archive is removed.
pub fn pack_changes(
    base_dir: &Path,
    changes: &ChangeNode,
    output: &Path,
) -> Result<(), ArchiveError> {
    let format = ArchiveFormat::from_path(output).context(UnsupportedFormatSnafu { path: output })?;
    let base_dir = base_dir
        .canonicalize()
        .context(SourceSnafu { path: base_dir })?;
    if base_dir.file_name() != Some(changes.name()) {
        return ArchiveRootMismatchSnafu {
            base_dir: base_dir.clone(),
            root_name: changes.name().to_string_lossy().into_owned(),
        }
        .fail()
        .context(PreconditionSnafu);
    }

    info!(
        "Packing {} changed files from {} into {} ({})",
        changes.count_leaves(),
        base_dir.display(),
        output.display(),
        format
    );

    let file = File::create(output).context(CreateSnafu { path: output })?;
    let result = format
        .writer(file)
        .context(CreateSnafu { path: output })
        .and_then(|writer| write_archive(writer, &base_dir, changes, output));

    if let Err(error) = &result {
        warn!("Discarding partial archive {}: {}", output.display(), error);
        if let Err(remove_error) = fs::remove_file(output) {
            debug!("Failed to remove {}: {}", output.display(), remove_error);
        }
    }
    result
}

fn write_archive(
    writer: super::format::ArchiveWriter,
    base_dir: &Path,
    changes: &ChangeNode,
    output: &Path,
) -> Result<(), ArchiveError> {
    let mut builder = Builder::new(writer);
    builder.follow_symlinks(false);

    append_node(&mut builder, base_dir, Path::new(changes.name()), changes)?;

    builder
        .into_inner()
        .context(FinishSnafu { path: output })?
        .finish()
        .context(FinishSnafu { path: output })
}

fn append_node<W: Write>(
    builder: &mut Builder<W>,
    source: &Path,
    entry_path: &Path,
    node: &ChangeNode,
) -> Result<(), ArchiveError> {
    let metadata = fs::symlink_metadata(source).context(SourceSnafu { path: source })?;
    let actual = EntryKind::from(metadata.file_type());
    ensure!(
        actual == node.kind(),
        KindChangedSnafu {
            path: source,
            expected: node.kind(),
            actual,
        }
    );

    debug!("Archiving {} as {}", source.display(), entry_path.display());
    match node.kind() {
        EntryKind::Directory => {
            builder
                .append_dir(entry_path, source)
                .context(AppendSnafu { path: source })?;
            for child in node.children() {
                append_node(
                    builder,
                    &source.join(child.name()),
                    &entry_path.join(child.name()),
                    child,
                )?;
            }
        }
        EntryKind::File => {
            let mut file = File::open(source).context(SourceSnafu { path: source })?;
            builder
                .append_file(entry_path, &mut file)
                .context(AppendSnafu { path: source })?;
        }
        EntryKind::Symlink => {
            builder
                .append_path_with_name(source, entry_path)
                .context(AppendSnafu { path: source })?;
        }
    }

    Ok(())
}
