use std::path::{Path, PathBuf};

use compio::fs;
use snafu::{OptionExt, ResultExt, Snafu};
use tracing::info;

use crate::ext::BestEffortPathExt;

const OUTPUT_FILE_NAME: &str = "output.log";
const STATUS_FILE_NAME: &str = "status";

/// Everything delivered for one finished run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub task_id: String,
    pub output: String,
    pub exit_code: i32,
    /// Archive of the files the run added or modified; `None` when nothing changed
    pub archive: Option<PathBuf>,
}

/// Submit-archive capability.
pub trait ResultSink {
    async fn submit(&self, report: &RunReport) -> Result<(), ResultSinkError>;
}

/// Delivers reports into `<outbox>/<task id>/`: the script output, the exit
/// status, and the result archive moved next to them.
#[derive(Debug, Clone)]
pub struct OutboxResultSink {
    outbox: PathBuf,
}

impl OutboxResultSink {
    pub fn new(outbox: impl Into<PathBuf>) -> Self {
        Self {
            outbox: outbox.into(),
        }
    }

    pub fn task_dir(&self, task_id: &str) -> PathBuf {
        self.outbox.join(task_id)
    }

    async fn write(path: &Path, contents: String) -> Result<(), ResultSinkError> {
        fs::write(path, contents.into_bytes())
            .await
            .0
            .context(WriteSnafu { path })
    }

    /// Moves `archive` into `task_dir`, copying when a rename is not possible.
    fn deliver_archive(archive: &Path, task_dir: &Path) -> Result<PathBuf, ResultSinkError> {
        let file_name = archive
            .file_name()
            .context(InvalidArchivePathSnafu { path: archive })?;
        let destination = task_dir.join(file_name);
        if std::fs::rename(archive, &destination).is_err() {
            std::fs::copy(archive, &destination).context(WriteSnafu { path: &destination })?;
            std::fs::remove_file(archive).context(WriteSnafu { path: archive })?;
        }
        Ok(destination)
    }
}

impl ResultSink for OutboxResultSink {
    async fn submit(&self, report: &RunReport) -> Result<(), ResultSinkError> {
        let task_dir = self.task_dir(&report.task_id);
        fs::create_dir_all(&task_dir)
            .await
            .context(WriteSnafu { path: &task_dir })?;

        Self::write(&task_dir.join(OUTPUT_FILE_NAME), report.output.clone()).await?;
        Self::write(
            &task_dir.join(STATUS_FILE_NAME),
            format!("{}\n", report.exit_code),
        )
        .await?;

        match &report.archive {
            Some(archive) => {
                let delivered = Self::deliver_archive(archive, &task_dir)?;
                info!(
                    "Delivered task '{}' with archive {}",
                    report.task_id,
                    delivered.best_effort_path_display()
                );
            }
            None => info!("Delivered task '{}' without changes", report.task_id),
        }
        Ok(())
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ResultSinkError {
    #[snafu(display("Failed to write {}", path.best_effort_path_display()))]
    WriteError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("Archive path {} has no file name", path.display()))]
    InvalidArchivePath { path: PathBuf },
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[compio::test]
    async fn submit_writes_output_status_and_archive() {
        let outbox = TempDir::new().unwrap();
        let staging = TempDir::new().unwrap();
        let archive = staging.path().join("result.tar.gz");
        std::fs::write(&archive, b"archive bytes").unwrap();
        let sink = OutboxResultSink::new(outbox.path());

        sink.submit(&RunReport {
            task_id: "task-7".into(),
            output: "hello".into(),
            exit_code: 0,
            archive: Some(archive.clone()),
        })
        .await
        .unwrap();

        let task_dir = sink.task_dir("task-7");
        assert_eq!(std::fs::read_to_string(task_dir.join("output.log")).unwrap(), "hello");
        assert_eq!(std::fs::read_to_string(task_dir.join("status")).unwrap(), "0\n");
        assert_eq!(std::fs::read(task_dir.join("result.tar.gz")).unwrap(), b"archive bytes");
        assert!(!archive.exists());
    }

    #[compio::test]
    async fn submit_without_changes_writes_no_archive() {
        let outbox = TempDir::new().unwrap();
        let sink = OutboxResultSink::new(outbox.path());

        sink.submit(&RunReport {
            task_id: "task-8".into(),
            output: String::new(),
            exit_code: 2,
            archive: None,
        })
        .await
        .unwrap();

        let entries: Vec<_> = std::fs::read_dir(sink.task_dir("task-8"))
            .unwrap()
            .map(|entry| entry.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(entries.len(), 2);
        assert_eq!(
            std::fs::read_to_string(sink.task_dir("task-8").join("status")).unwrap(),
            "2\n"
        );
    }
}
