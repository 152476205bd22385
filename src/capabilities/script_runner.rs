use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use compio::io::compat::AsyncStream;
use compio::process::Command;
use compio::runtime::spawn;
use futures::{AsyncBufReadExt, StreamExt, io::BufReader};
use futures_channel::mpsc::{self, UnboundedSender};
use snafu::{ResultExt, Snafu};
use tracing::{debug, info};

/// What a finished script left behind besides its filesystem changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptOutcome {
    /// Captured stdout and stderr lines, in arrival order
    pub output: String,
    /// Exit code; `-1` when the process was terminated by a signal
    pub exit_code: i32,
}

impl ScriptOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Run-script-in-directory capability.
pub trait ScriptRunner {
    async fn run(&self, workdir: &Path, script: &Path) -> Result<ScriptOutcome, ScriptRunnerError>;
}

/// Runs scripts and commands through a shell interpreter as child processes.
#[derive(Debug, Clone)]
pub struct ShellScriptRunner {
    shell: PathBuf,
}

impl ShellScriptRunner {
    pub fn new(shell: impl Into<PathBuf>) -> Self {
        Self {
            shell: shell.into(),
        }
    }

    /// Runs an arbitrary command line with `<shell> -c` inside `workdir`.
    pub async fn run_command(
        &self,
        workdir: &Path,
        command: &str,
    ) -> Result<ScriptOutcome, ScriptRunnerError> {
        let mut cmd = self.create_command(workdir);
        cmd.args(["-c", command]);
        self.execute(cmd, command).await
    }

    /// Creates the command with piped stdio, running inside `workdir`
    fn create_command(&self, workdir: &Path) -> Command {
        let mut cmd = Command::new(&self.shell);
        cmd.current_dir(workdir);
        let _ = cmd.stdin(Stdio::null());
        let _ = cmd.stdout(Stdio::piped());
        let _ = cmd.stderr(Stdio::piped());
        cmd
    }

    async fn execute(
        &self,
        mut cmd: Command,
        label: &str,
    ) -> Result<ScriptOutcome, ScriptRunnerError> {
        let mut handle = cmd.spawn().context(SpawnSnafu {
            shell: &self.shell,
            command: label,
        })?;
        info!("Started '{}' with {}", label, self.shell.display());

        let (line_sender, line_receiver) = mpsc::unbounded::<String>();
        if let Some(stdout) = handle.stdout.take() {
            spawn_line_forwarder(stdout, "stdout", line_sender.clone());
        }
        if let Some(stderr) = handle.stderr.take() {
            spawn_line_forwarder(stderr, "stderr", line_sender.clone());
        }
        drop(line_sender);

        let status = handle.wait().await.context(WaitSnafu { command: label })?;
        let lines = line_receiver.collect::<Vec<_>>().await;
        let exit_code = status.code().unwrap_or(-1);
        info!("'{}' finished with exit code {}", label, exit_code);

        Ok(ScriptOutcome {
            output: lines.join("\n"),
            exit_code,
        })
    }
}

impl ScriptRunner for ShellScriptRunner {
    async fn run(&self, workdir: &Path, script: &Path) -> Result<ScriptOutcome, ScriptRunnerError> {
        let mut cmd = self.create_command(workdir);
        cmd.arg(script);
        self.execute(cmd, &script.display().to_string()).await
    }
}

/// Forwards every line of `stream` to the debug log and to `sink`.
/// The sender is dropped when the stream ends, which is how the caller knows all output arrived.
///
/// Lines are read as raw bytes and decoded lossily. The stream is drained to
/// the end even when `sink` is gone, so the child never writes into a closed pipe.
fn spawn_line_forwarder<S>(stream: S, stream_name: &'static str, sink: UnboundedSender<String>)
where
    S: compio::io::AsyncRead + Unpin + 'static,
{
    let stream = AsyncStream::new(stream);
    spawn(async move {
        let mut reader = BufReader::new(stream);
        let mut buffer = Vec::new();

        loop {
            buffer.clear();
            match reader.read_until(b'\n', &mut buffer).await {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(trim_line_ending(&buffer)).into_owned();
                    debug!("[{}] {}", stream_name, line);
                    let _ = sink.unbounded_send(line);
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => {
                    debug!("Error reading {}: {}", stream_name, e);
                    break;
                }
            }
        }
    })
    .detach();
}

fn trim_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ScriptRunnerError {
    #[snafu(display("Failed to spawn '{}' with {}", command, shell.display()))]
    SpawnError {
        shell: PathBuf,
        command: String,
        source: std::io::Error,
    },
    #[snafu(display("Failed to wait for '{}'", command))]
    WaitError {
        command: String,
        source: std::io::Error,
    },
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[compio::test]
    async fn run_captures_output_and_exit_code() {
        let workdir = TempDir::new().unwrap();
        let script = workdir.path().join("control.sh");
        std::fs::write(&script, "echo out\necho err >&2\nexit 3\n").unwrap();

        let outcome = ShellScriptRunner::new("/bin/sh")
            .run(workdir.path(), Path::new("control.sh"))
            .await
            .unwrap();

        assert_eq!(outcome.exit_code, 3);
        assert!(!outcome.success());
        assert!(outcome.output.contains("out"));
        assert!(outcome.output.contains("err"));
    }

    #[compio::test]
    async fn run_command_executes_inside_workdir() {
        let workdir = TempDir::new().unwrap();

        let outcome = ShellScriptRunner::new("/bin/sh")
            .run_command(workdir.path(), "echo created > marker.txt")
            .await
            .unwrap();

        assert!(outcome.success());
        assert_eq!(
            std::fs::read_to_string(workdir.path().join("marker.txt")).unwrap(),
            "created\n"
        );
    }

    #[compio::test]
    async fn undecodable_output_does_not_stop_the_script() {
        let workdir = TempDir::new().unwrap();
        let script = workdir.path().join("control.sh");
        std::fs::write(
            &script,
            "printf 'before\\n\\377\\n'\nsleep 0.3\necho after\nseq 1 200000\necho done > marker\n",
        )
        .unwrap();

        let outcome = ShellScriptRunner::new("/bin/sh")
            .run(workdir.path(), Path::new("control.sh"))
            .await
            .unwrap();

        assert_eq!(outcome.exit_code, 0);
        assert!(outcome.output.contains('\u{FFFD}'));
        assert!(outcome.output.contains("after"));
        assert!(outcome.output.ends_with("200000"));
        assert_eq!(
            std::fs::read_to_string(workdir.path().join("marker")).unwrap(),
            "done\n"
        );
    }

    #[test]
    fn line_endings_are_trimmed() {
        assert_eq!(trim_line_ending(b"text\r\n"), b"text");
        assert_eq!(trim_line_ending(b"text\n"), b"text");
        assert_eq!(trim_line_ending(b"text"), b"text");
    }

    #[compio::test]
    async fn run_with_missing_shell_fails_to_spawn() {
        let workdir = TempDir::new().unwrap();

        let result = ShellScriptRunner::new("/definitely/not/a/shell")
            .run_command(workdir.path(), "true")
            .await;

        assert!(matches!(result, Err(ScriptRunnerError::SpawnError { .. })));
    }
}
