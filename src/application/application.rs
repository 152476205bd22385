use std::path::Path;

use snafu::Snafu;
use snafu::prelude::*;
use supports_color::Stream;
use tracing::{debug, info, warn};

use crate::application::RuntimeConfig;
use crate::archive::{self, ArchiveError};
use crate::capabilities::{
    DirectoryBlobStore, OutboxResultSink, ResultSink, ResultSinkError, ScriptRunnerError,
    ShellScriptRunner,
};
use crate::cli::{Cli, Command, RunArgs};
use crate::config::{Config, ConfigError};
use crate::execution::{Execution, ExecutionError};
use crate::filesystem::{
    ChangeNode, FilesystemError, PreconditionError, Snapshot, render_changes, render_snapshot,
};

pub struct Application;

impl Application {
    pub async fn run(cli: Cli) -> Result<(), ApplicationError> {
        colored::control::set_override(supports_color::on(Stream::Stdout).is_some());

        match cli.command {
            Command::Snapshot { path } => {
                let snapshot = Snapshot::capture(&path).context(SnapshotSnafu)?;
                print!("{}", render_snapshot(snapshot.tree()));
            }
            Command::Pack { dir, since, output } => {
                let baseline = Snapshot::capture(&since).context(SnapshotSnafu)?;
                let current = Snapshot::capture(&dir).context(SnapshotSnafu)?;
                let changes = current.tree().changes_since(baseline.tree());
                Self::report_and_pack(current.root(), changes.as_ref(), &output)?;
            }
            Command::Unpack { archive, target } => {
                archive::unpack_into(&target, &archive).context(ArchiveSnafu)?;
            }
            Command::Run(args) => {
                let config = Config::read(cli.config.as_deref())
                    .await
                    .context(ConfigSnafu)?;
                debug!("Loaded config: {:?}", config);
                Self::run_task(config, args).await?;
            }
            Command::Watch {
                dir,
                output,
                command,
            } => {
                let config = Config::read(cli.config.as_deref())
                    .await
                    .context(ConfigSnafu)?;
                debug!("Loaded config: {:?}", config);
                Self::watch(&config.shell, &dir, &output, &command).await?;
            }
        }

        Ok(())
    }

    async fn run_task(config: Config, args: RunArgs) -> Result<(), ApplicationError> {
        let runtime = RuntimeConfig::new(config, args);
        let execution = Execution::new(
            &runtime.exec_dir,
            DirectoryBlobStore::new(&runtime.blob_dir),
            ShellScriptRunner::new(&runtime.shell),
            runtime.archive_format,
        );

        let report = execution
            .execute(&runtime.request)
            .await
            .context(ExecutionSnafu)?;
        let sink = OutboxResultSink::new(&runtime.outbox_dir);
        sink.submit(&report).await.context(SubmitSnafu)?;

        println!(
            "Task '{}' finished with exit code {}, results in {}",
            report.task_id,
            report.exit_code,
            sink.task_dir(&report.task_id).display()
        );
        Ok(())
    }

    async fn watch(
        shell: &Path,
        dir: &Path,
        output: &Path,
        command: &[String],
    ) -> Result<(), ApplicationError> {
        let command_line = command
            .iter()
            .map(|arg| shell_quote(arg))
            .collect::<Vec<_>>()
            .join(" ");

        let before = Snapshot::capture(dir).context(SnapshotSnafu)?;
        let outcome = ShellScriptRunner::new(shell)
            .run_command(before.root(), &command_line)
            .await
            .context(CommandSnafu)?;
        if !outcome.success() {
            warn!("'{}' exited with {}", command_line, outcome.exit_code);
        }
        let after = Snapshot::capture(dir).context(SnapshotSnafu)?;

        let changes = Snapshot::diff(&before, &after).context(PreconditionSnafu)?;
        Self::report_and_pack(after.root(), changes.as_ref(), output)
    }

    fn report_and_pack(
        base_dir: &Path,
        changes: Option<&ChangeNode>,
        output: &Path,
    ) -> Result<(), ApplicationError> {
        match changes {
            Some(changes) => {
                print!("{}", render_changes(changes));
                archive::pack_changes(base_dir, changes, output).context(ArchiveSnafu)?;
                info!("Wrote {} ({} entries)", output.display(), changes.paths().len());
            }
            None => println!("No changes in {}", base_dir.display()),
        }
        Ok(())
    }
}

/// Quotes `arg` so the shell passes it through as a single word.
fn shell_quote(arg: &str) -> String {
    let is_plain = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,+@%".contains(c));
    if is_plain {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

#[derive(Debug, Snafu)]
pub enum ApplicationError {
    #[snafu(display("Critical failure encountered during configuration stage"))]
    ConfigError { source: ConfigError },
    #[snafu(display("Failed to capture a snapshot"))]
    SnapshotError { source: FilesystemError },
    #[snafu(display("Snapshots cannot be compared"))]
    PreconditionError { source: PreconditionError },
    #[snafu(display("Archive operation failed"))]
    ArchiveError { source: ArchiveError },
    #[snafu(display("Failed to run the watched command"))]
    CommandError { source: ScriptRunnerError },
    #[snafu(display("Critical failure encountered during task execution"))]
    ExecutionError { source: ExecutionError },
    #[snafu(display("Failed to deliver the task result"))]
    SubmitError { source: ResultSinkError },
}
