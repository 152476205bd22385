use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::application::data::LogLevel;

#[derive(Parser, Debug, Clone)]
#[command(version, about = "Snapshot directories and archive what changed")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[clap(long, short, default_value = "warn", value_enum, global = true)]
    pub log_level: LogLevel,

    /// Config file to read instead of ./diffpack.yaml
    #[clap(long, short, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Capture a directory tree and print it
    Snapshot { path: PathBuf },
    /// Archive what changed in a directory compared to a pristine copy of it
    Pack {
        dir: PathBuf,
        /// Pristine copy of `dir` to compare against
        #[clap(long)]
        since: PathBuf,
        #[clap(long, short)]
        output: PathBuf,
    },
    /// Extract an archive into a directory, merging with existing content
    Unpack { archive: PathBuf, target: PathBuf },
    /// Run a control script over a data blob and deliver the result
    Run(RunArgs),
    /// Run a command in a directory and archive what it changed
    Watch {
        dir: PathBuf,
        #[clap(long, short)]
        output: PathBuf,
        #[clap(required = true, last = true)]
        command: Vec<String>,
    },
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Blob id of the data to operate on
    #[clap(long)]
    pub data: String,
    /// Blob id of the control script
    #[clap(long)]
    pub control: String,
    /// Defaults to `<data>-<control>`
    #[clap(long)]
    pub task_id: Option<String>,
    #[clap(long)]
    pub exec_dir: Option<PathBuf>,
    #[clap(long)]
    pub blob_dir: Option<PathBuf>,
    #[clap(long)]
    pub outbox_dir: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::*;

    #[test]
    fn parses_watch_with_trailing_command() {
        let cli = Cli::try_parse_from([
            "diffpack", "watch", "work", "-o", "out.tar", "--", "make", "-j4",
        ])
        .unwrap();

        match cli.command {
            Command::Watch {
                dir,
                output,
                command,
            } => {
                assert_eq!(dir, PathBuf::from("work"));
                assert_eq!(output, PathBuf::from("out.tar"));
                assert_eq!(command, ["make", "-j4"]);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn global_flags_follow_subcommand() {
        let cli = Cli::try_parse_from([
            "diffpack", "run", "--data", "d", "--control", "c", "--log-level", "debug",
        ])
        .unwrap();

        assert!(matches!(cli.log_level, LogLevel::Debug));
        match cli.command {
            Command::Run(args) => {
                assert_eq!(args.data, "d");
                assert_eq!(args.task_id, None);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[rstest]
    #[case(&["diffpack"])]
    #[case(&["diffpack", "watch", "dir", "-o", "out.tar"])]
    #[case(&["diffpack", "pack", "dir", "-o", "out.tar"])]
    #[case(&["diffpack", "run", "--data", "d"])]
    fn rejects_incomplete_invocations(#[case] args: &[&str]) {
        assert!(Cli::try_parse_from(args).is_err());
    }
}
