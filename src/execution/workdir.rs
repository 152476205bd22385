use std::fs::{self, DirBuilder};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use snafu::{OptionExt, ResultExt, Snafu};
use tracing::{debug, info};

use crate::archive::{self, ArchiveError, ArchiveFormat};
use crate::ext::BestEffortPathExt;

const SOURCE_DIR_NAME: &str = "src";
const RUN_DIR_NAME: &str = "run";

/// Layout of the exec directory for a single run.
///
/// `src/` receives the fetched blobs untouched, `run/` receives the unpacked
/// data the control script operates on.
#[derive(Debug, Clone)]
pub struct ExecDir {
    root: PathBuf,
}

impl ExecDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn source_dir(&self) -> PathBuf {
        self.root.join(SOURCE_DIR_NAME)
    }

    pub fn run_dir(&self) -> PathBuf {
        self.root.join(RUN_DIR_NAME)
    }

    /// Wipes whatever a previous run left and recreates the empty layout.
    pub fn prepare(&self) -> Result<(), WorkdirError> {
        match fs::remove_dir_all(&self.root) {
            Ok(()) => debug!("Removed previous exec dir {}", self.root.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e).context(CleanSnafu { path: &self.root }),
        }

        create_private_dir(&self.root, true)?;
        create_private_dir(&self.source_dir(), false)?;
        create_private_dir(&self.run_dir(), false)?;
        info!("Prepared exec dir {}", self.root.best_effort_path_display());
        Ok(())
    }
}

fn create_private_dir(path: &Path, recursive: bool) -> Result<(), WorkdirError> {
    let mut builder = DirBuilder::new();
    builder.recursive(recursive);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder.create(path).context(CreateSnafu { path })
}

/// Puts the data blob into `run_dir`: archives are extracted, anything else is copied as-is.
pub fn stage_input_data(data: &Path, run_dir: &Path) -> Result<(), WorkdirError> {
    match ArchiveFormat::from_path(data) {
        Some(format) => {
            info!("Unpacking {} data from {}", format, data.display());
            archive::unpack_into(run_dir, data).context(UnpackSnafu { path: data })
        }
        None => {
            let file_name = data.file_name().context(InvalidPathSnafu { path: data })?;
            info!("Data {} is not an archive, copying it as-is", data.display());
            fs::copy(data, run_dir.join(file_name))
                .map(|_| ())
                .context(CopySnafu { path: data })
        }
    }
}

/// Follows chains of directories that hold exactly one subdirectory and
/// nothing else, so a bundle wrapped in a top-level folder runs inside it.
pub fn descend_into_data(run_dir: &Path) -> Result<PathBuf, WorkdirError> {
    let mut current = run_dir.to_path_buf();
    loop {
        let mut entries = fs::read_dir(&current)
            .context(ReadSnafu { path: &current })?
            .collect::<Result<Vec<_>, _>>()
            .context(ReadSnafu { path: &current })?;

        let only_dir = match entries.as_slice() {
            [entry] => entry
                .file_type()
                .context(ReadSnafu { path: entry.path() })?
                .is_dir(),
            _ => false,
        };
        match entries.pop() {
            Some(entry) if only_dir => current = entry.path(),
            _ => break,
        }
    }

    debug!("Working directory is {}", current.display());
    Ok(current)
}

/// Rewrites CRLF line endings to LF so scripts authored on Windows run under a unix shell.
pub fn normalize_line_endings(path: &Path) -> Result<(), WorkdirError> {
    let contents = fs::read(path).context(ReadSnafu { path })?;
    if !contents.windows(2).any(|pair| pair == b"\r\n") {
        return Ok(());
    }

    let mut normalized = Vec::with_capacity(contents.len());
    let mut bytes = contents.iter().peekable();
    while let Some(&byte) = bytes.next() {
        if byte == b'\r' && bytes.peek() == Some(&&b'\n') {
            continue;
        }
        normalized.push(byte);
    }

    debug!("Normalized line endings of {}", path.display());
    fs::write(path, normalized).context(WriteSnafu { path })
}

pub fn make_executable(path: &Path) -> Result<(), WorkdirError> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o700))
            .context(PermissionsSnafu { path })?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}

/// Copies the control script into `workdir`, keeping its permission bits.
pub fn place_control_script(script: &Path, workdir: &Path) -> Result<PathBuf, WorkdirError> {
    let file_name = script.file_name().context(InvalidPathSnafu { path: script })?;
    let destination = workdir.join(file_name);
    fs::copy(script, &destination).context(CopySnafu { path: script })?;
    debug!("Placed control script at {}", destination.display());
    Ok(destination)
}

#[derive(Debug, Snafu)]
pub enum WorkdirError {
    #[snafu(display("Failed to clean {}", path.best_effort_path_display()))]
    CleanError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("Failed to create {}", path.best_effort_path_display()))]
    CreateError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("Failed to read {}", path.best_effort_path_display()))]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("Failed to copy {}", path.best_effort_path_display()))]
    CopyError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("Failed to write {}", path.best_effort_path_display()))]
    WriteError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("Failed to change permissions of {}", path.best_effort_path_display()))]
    PermissionsError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("Failed to unpack {}", path.best_effort_path_display()))]
    UnpackError { path: PathBuf, source: ArchiveError },
    #[snafu(display("{} does not name a file", path.display()))]
    InvalidPath { path: PathBuf },
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::*;
    use tempfile::TempDir;

    #[fixture]
    fn temp_dir() -> TempDir {
        TempDir::new().unwrap()
    }

    #[rstest]
    fn prepare_wipes_previous_run(temp_dir: TempDir) {
        let exec_dir = ExecDir::new(temp_dir.path().join("exec"));
        exec_dir.prepare().unwrap();
        fs::write(exec_dir.run_dir().join("leftover"), "old").unwrap();

        exec_dir.prepare().unwrap();

        assert!(exec_dir.source_dir().is_dir());
        assert!(exec_dir.run_dir().is_dir());
        assert!(!exec_dir.run_dir().join("leftover").exists());
    }

    #[rstest]
    fn descend_follows_single_directories(temp_dir: TempDir) {
        let nested = temp_dir.path().join("bundle").join("project");
        fs::create_dir_all(&nested).unwrap();
        fs::write(nested.join("input.csv"), "1,2").unwrap();
        fs::create_dir(nested.join("lib")).unwrap();

        assert_eq!(descend_into_data(temp_dir.path()).unwrap(), nested);
    }

    #[rstest]
    fn descend_stops_at_single_file(temp_dir: TempDir) {
        fs::write(temp_dir.path().join("only.txt"), "x").unwrap();

        assert_eq!(descend_into_data(temp_dir.path()).unwrap(), temp_dir.path());
    }

    #[rstest]
    fn descend_stays_in_empty_directory(temp_dir: TempDir) {
        assert_eq!(descend_into_data(temp_dir.path()).unwrap(), temp_dir.path());
    }

    #[rstest]
    #[case(b"echo a\r\necho b\r\n".as_slice(), b"echo a\necho b\n".as_slice())]
    #[case(b"echo a\necho b\n".as_slice(), b"echo a\necho b\n".as_slice())]
    #[case(b"lone\rcarriage\r\n".as_slice(), b"lone\rcarriage\n".as_slice())]
    fn normalizes_crlf(temp_dir: TempDir, #[case] input: &[u8], #[case] expected: &[u8]) {
        let script = temp_dir.path().join("control.sh");
        fs::write(&script, input).unwrap();

        normalize_line_endings(&script).unwrap();

        assert_eq!(fs::read(&script).unwrap(), expected);
    }

    #[cfg(unix)]
    #[rstest]
    fn failed_normalization_is_a_write_error(temp_dir: TempDir) {
        use std::os::unix::fs::PermissionsExt;

        let script = temp_dir.path().join("control.sh");
        fs::write(&script, "echo a\r\n").unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o400)).unwrap();
        let writable = fs::OpenOptions::new().write(true).open(&script).is_ok();

        let result = normalize_line_endings(&script);

        if !writable {
            assert!(matches!(result, Err(WorkdirError::WriteError { .. })));
        }
    }

    #[rstest]
    fn plain_data_is_copied(temp_dir: TempDir) {
        let data = temp_dir.path().join("input.csv");
        fs::write(&data, "1,2,3").unwrap();
        let run_dir = temp_dir.path().join("run");
        fs::create_dir(&run_dir).unwrap();

        stage_input_data(&data, &run_dir).unwrap();

        assert_eq!(fs::read_to_string(run_dir.join("input.csv")).unwrap(), "1,2,3");
    }

    #[cfg(unix)]
    #[rstest]
    fn control_script_keeps_executable_bit(temp_dir: TempDir) {
        use std::os::unix::fs::PermissionsExt;

        let script = temp_dir.path().join("control.sh");
        fs::write(&script, "#!/bin/sh\n").unwrap();
        make_executable(&script).unwrap();
        let workdir = temp_dir.path().join("work");
        fs::create_dir(&workdir).unwrap();

        let placed = place_control_script(&script, &workdir).unwrap();

        assert_eq!(placed, workdir.join("control.sh"));
        let mode = fs::metadata(&placed).unwrap().permissions().mode();
        assert_eq!(mode & 0o700, 0o700);
    }
}
