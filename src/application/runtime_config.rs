use std::path::PathBuf;

use crate::archive::ArchiveFormat;
use crate::cli::RunArgs;
use crate::config::Config;
use crate::execution::TaskRequest;

/// Settings for a `run` invocation: the config file with command-line overrides applied.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub request: TaskRequest,
    pub exec_dir: PathBuf,
    pub blob_dir: PathBuf,
    pub outbox_dir: PathBuf,
    pub archive_format: ArchiveFormat,
    pub shell: PathBuf,
}

impl RuntimeConfig {
    pub fn new(config: Config, args: RunArgs) -> Self {
        let task_id = args
            .task_id
            .unwrap_or_else(|| format!("{}-{}", args.data, args.control));
        Self {
            request: TaskRequest {
                task_id,
                data_id: args.data,
                control_id: args.control,
            },
            exec_dir: args.exec_dir.unwrap_or(config.exec_dir),
            blob_dir: args.blob_dir.unwrap_or(config.blob_dir),
            outbox_dir: args.outbox_dir.unwrap_or(config.outbox_dir),
            archive_format: config.archive_format,
            shell: config.shell,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> RunArgs {
        RunArgs {
            data: "data".into(),
            control: "script".into(),
            task_id: None,
            exec_dir: None,
            blob_dir: None,
            outbox_dir: None,
        }
    }

    #[test]
    fn falls_back_to_config_values() {
        let config = Config::default();
        let runtime = RuntimeConfig::new(config.clone(), args());

        assert_eq!(runtime.request.task_id, "data-script");
        assert_eq!(runtime.exec_dir, config.exec_dir);
        assert_eq!(runtime.outbox_dir, config.outbox_dir);
    }

    #[test]
    fn command_line_overrides_config() {
        let runtime = RuntimeConfig::new(
            Config::default(),
            RunArgs {
                task_id: Some("job-9".into()),
                blob_dir: Some("/srv/blobs".into()),
                ..args()
            },
        );

        assert_eq!(runtime.request.task_id, "job-9");
        assert_eq!(runtime.blob_dir, PathBuf::from("/srv/blobs"));
    }
}
