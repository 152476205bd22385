use std::path::PathBuf;

use snafu::{ResultExt, Snafu};
use tracing::{debug, info};

use crate::archive::{self, ArchiveError, ArchiveFormat};
use crate::capabilities::{BlobStore, BlobStoreError, RunReport, ScriptRunner, ScriptRunnerError};
use crate::execution::workdir::{self, ExecDir, WorkdirError};
use crate::filesystem::{FilesystemError, PreconditionError, Snapshot};

const RESULT_FILE_STEM: &str = "result";

/// One unit of work: run control script `control_id` over data blob `data_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRequest {
    pub task_id: String,
    pub data_id: String,
    pub control_id: String,
}

/// Runs tasks inside a dedicated exec directory and archives what the control script changed.
pub struct Execution<B, R> {
    exec_dir: ExecDir,
    blob_store: B,
    runner: R,
    format: ArchiveFormat,
}

impl<B: BlobStore, R: ScriptRunner> Execution<B, R> {
    pub fn new(
        exec_dir: impl Into<PathBuf>,
        blob_store: B,
        runner: R,
        format: ArchiveFormat,
    ) -> Self {
        Self {
            exec_dir: ExecDir::new(exec_dir),
            blob_store,
            runner,
            format,
        }
    }

    /// Path the result archive is written to when a run changes anything.
    pub fn result_path(&self) -> PathBuf {
        self.exec_dir
            .root()
            .join(format!("{}.{}", RESULT_FILE_STEM, self.format.extension()))
    }

    pub async fn execute(&self, request: &TaskRequest) -> Result<RunReport, ExecutionError> {
        info!(
            "Executing task '{}' (data '{}', control '{}')",
            request.task_id, request.data_id, request.control_id
        );
        self.exec_dir.prepare().context(WorkdirSnafu)?;
        let source_dir = self.exec_dir.source_dir();
        let run_dir = self.exec_dir.run_dir();

        let data = self
            .blob_store
            .fetch(&request.data_id, &source_dir)
            .await
            .context(FetchSnafu { id: &request.data_id })?;
        let control = self
            .blob_store
            .fetch(&request.control_id, &source_dir)
            .await
            .context(FetchSnafu { id: &request.control_id })?;
        workdir::make_executable(&control).context(WorkdirSnafu)?;
        workdir::normalize_line_endings(&control).context(WorkdirSnafu)?;

        workdir::stage_input_data(&data, &run_dir).context(WorkdirSnafu)?;
        let working_dir = workdir::descend_into_data(&run_dir).context(WorkdirSnafu)?;
        let script = workdir::place_control_script(&control, &working_dir).context(WorkdirSnafu)?;

        let before = Snapshot::capture(&working_dir).context(SnapshotSnafu)?;
        let outcome = self
            .runner
            .run(&working_dir, &script)
            .await
            .context(ScriptSnafu)?;
        let after = Snapshot::capture(&working_dir).context(SnapshotSnafu)?;
        if !outcome.success() {
            info!(
                "Control script of task '{}' exited with {}",
                request.task_id, outcome.exit_code
            );
        }

        let archive = match Snapshot::diff(&before, &after).context(DiffSnafu)? {
            Some(changes) => {
                let output = self.result_path();
                archive::pack_changes(after.root(), &changes, &output).context(PackSnafu)?;
                Some(output)
            }
            None => {
                debug!("Task '{}' left the working directory untouched", request.task_id);
                None
            }
        };

        Ok(RunReport {
            task_id: request.task_id.clone(),
            output: outcome.output,
            exit_code: outcome.exit_code,
            archive,
        })
    }
}

#[derive(Debug, Snafu)]
pub enum ExecutionError {
    #[snafu(display("Failed to prepare the working directory"))]
    WorkdirError { source: WorkdirError },
    #[snafu(display("Failed to fetch blob '{}'", id))]
    FetchError { id: String, source: BlobStoreError },
    #[snafu(display("Failed to snapshot the working directory"))]
    SnapshotError { source: FilesystemError },
    #[snafu(display("Failed to run the control script"))]
    ScriptError { source: ScriptRunnerError },
    #[snafu(display("Failed to compare snapshots"))]
    DiffError { source: PreconditionError },
    #[snafu(display("Failed to archive changes"))]
    PackError { source: ArchiveError },
}
