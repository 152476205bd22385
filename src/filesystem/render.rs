use std::fmt::Write as _;

use colored::{ColoredString, Colorize};

use super::diff::{ChangeNode, ChangeStatus};
use super::tree::{EntryKind, SnapshotNode};
use crate::ext::SystemTimeExt;

const INDENT: &str = "  ";

/// Indented listing of a snapshot, one entry per line with its modification time.
pub fn render_snapshot(tree: &SnapshotNode) -> String {
    let mut out = String::new();
    write_snapshot_node(&mut out, tree, 0);
    out
}

fn write_snapshot_node(out: &mut String, node: &SnapshotNode, depth: usize) {
    let _ = writeln!(
        out,
        "{}{} [{}]",
        INDENT.repeat(depth),
        decorated_name(node.name().to_string_lossy().as_ref(), node.kind()),
        node.modified_time().to_unix_timestamp()
    );
    for child in node.children() {
        write_snapshot_node(out, child, depth + 1);
    }
}

/// Indented listing of a change tree, coloured by change status.
pub fn render_changes(changes: &ChangeNode) -> String {
    let mut out = String::new();
    write_change_node(&mut out, changes, 0);
    out
}

fn write_change_node(out: &mut String, node: &ChangeNode, depth: usize) {
    let name = decorated_name(node.name().to_string_lossy().as_ref(), node.kind());
    let _ = writeln!(
        out,
        "{}{} ({})",
        INDENT.repeat(depth),
        paint(name, node.status()),
        node.status()
    );
    for child in node.children() {
        write_change_node(out, child, depth + 1);
    }
}

fn decorated_name(name: &str, kind: EntryKind) -> String {
    match kind {
        EntryKind::Directory => format!("{name}/"),
        EntryKind::Symlink => format!("{name}@"),
        EntryKind::File => name.to_string(),
    }
}

fn paint(text: String, status: ChangeStatus) -> ColoredString {
    match status {
        ChangeStatus::Added => text.green(),
        ChangeStatus::Modified => text.yellow(),
        ChangeStatus::Replaced => text.magenta(),
        ChangeStatus::Contains => text.normal(),
    }
}
