use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::string::FromUtf8Error;

use compio::fs;
use hashlink::LinkedHashMap;
use saphyr::{LoadableYamlNode, Scalar, Yaml};
use snafu::prelude::*;
use tracing::{debug, info};

use crate::archive::ArchiveFormat;
use crate::ext::BestEffortPathExt;

const CONFIG_FILE_NAME: &str = "diffpack.yaml";
const DEFAULT_SHELL: &str = "/bin/bash";

/// Worker settings. Every key is optional in the file; missing keys keep their defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Working area, wiped at the start of every run
    pub exec_dir: PathBuf,
    /// Root of the local blob store
    pub blob_dir: PathBuf,
    /// Where run reports and result archives are delivered
    pub outbox_dir: PathBuf,
    pub archive_format: ArchiveFormat,
    /// Interpreter used for control scripts
    pub shell: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let base = std::env::temp_dir().join("diffpack");
        Self {
            exec_dir: base.join("exec"),
            blob_dir: base.join("blobs"),
            outbox_dir: base.join("outbox"),
            archive_format: ArchiveFormat::TarGz,
            shell: PathBuf::from(DEFAULT_SHELL),
        }
    }
}

impl Config {
    /// Reads `path`, or `diffpack.yaml` in the current directory when no path is given.
    ///
    /// Only the implicit file may be absent, in which case defaults are used.
    pub async fn read(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_path(path).await,
            None => {
                let default_path = PathBuf::from(CONFIG_FILE_NAME);
                if default_path.exists() {
                    Self::from_path(&default_path).await
                } else {
                    info!("No {} found, using default configuration", CONFIG_FILE_NAME);
                    Ok(Self::default())
                }
            }
        }
    }

    pub async fn from_path(path: &Path) -> Result<Self, ConfigError> {
        debug!("Reading config file: {}", path.best_effort_path_display());
        let bytes = fs::read(path).await.context(ReadSnafu {
            file_path: path.best_effort_path_display(),
        })?;
        debug!("Successfully read config file: {} bytes", bytes.len());

        let contents = String::from_utf8(bytes).context(EncodingSnafu {
            file_path: path.best_effort_path_display(),
        })?;
        contents.as_str().try_into()
    }

    fn string_value<'a>(
        top_level: &'a LinkedHashMap<Yaml, Yaml>,
        key: &'static str,
    ) -> Result<Option<&'a str>, ConfigError> {
        match top_level.get(&Yaml::Value(Scalar::String(Cow::Borrowed(key)))) {
            None => Ok(None),
            Some(value) => value.as_str().map(Some).context(NotAStringSnafu { key }),
        }
    }
}

impl TryFrom<&str> for Config {
    type Error = ConfigError;

    fn try_from(contents: &str) -> Result<Self, Self::Error> {
        let documents = Yaml::load_from_str(contents).context(ParseSnafu)?;
        let mut config = Config::default();
        let Some(document) = documents.first() else {
            debug!("Config file is empty, using defaults");
            return Ok(config);
        };

        let top_level = document.as_mapping().context(TopLevelNotMapSnafu)?;

        if let Some(exec_dir) = Self::string_value(top_level, "exec_dir")? {
            config.exec_dir = PathBuf::from(exec_dir);
        }
        if let Some(blob_dir) = Self::string_value(top_level, "blob_dir")? {
            config.blob_dir = PathBuf::from(blob_dir);
        }
        if let Some(outbox_dir) = Self::string_value(top_level, "outbox_dir")? {
            config.outbox_dir = PathBuf::from(outbox_dir);
        }
        if let Some(shell) = Self::string_value(top_level, "shell")? {
            config.shell = PathBuf::from(shell);
        }
        if let Some(format) = Self::string_value(top_level, "archive_format")? {
            config.archive_format = format
                .parse()
                .ok()
                .context(InvalidArchiveFormatSnafu { value: format })?;
        }

        debug!("Parsed config: {:?}", config);
        Ok(config)
    }
}

#[derive(Debug, Snafu)]
pub enum ConfigError {
    #[snafu(display("Failed to read the config file: {}", file_path))]
    ReadError {
        file_path: String,
        source: std::io::Error,
    },
    #[snafu(display("Config file {} is not valid UTF-8", file_path))]
    EncodingError {
        file_path: String,
        source: FromUtf8Error,
    },
    #[snafu(display("Failed to parse the config file"))]
    ParseError { source: saphyr::ScanError },
    #[snafu(display("Top level of config should be a map"))]
    TopLevelNotMap,
    #[snafu(display("Config key '{}' should be a string", key))]
    NotAString { key: String },
    #[snafu(display(
        "Unsupported archive format '{}', expected tar, tar.gz or tar.zst",
        value
    ))]
    InvalidArchiveFormat { value: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[compio::test]
    async fn config_returns_error_on_nonexistent_explicit_file() {
        let result = Config::read(Some(Path::new("nonexistent.yaml"))).await;

        assert!(matches!(result, Err(ConfigError::ReadError { .. })));
    }

    #[compio::test]
    async fn config_reads_file_from_disk() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("diffpack.yaml");
        std::fs::write(&path, "exec_dir: /srv/exec\narchive_format: tar.zst\n").unwrap();

        let config = Config::read(Some(&path)).await.unwrap();

        assert_eq!(config.exec_dir, PathBuf::from("/srv/exec"));
        assert_eq!(config.archive_format, ArchiveFormat::TarZst);
        assert_eq!(config.blob_dir, Config::default().blob_dir);
    }

    #[test]
    fn config_parses_every_key() {
        let yaml = r#"
exec_dir: /var/lib/diffpack/exec
blob_dir: /var/lib/diffpack/blobs
outbox_dir: /var/lib/diffpack/outbox
archive_format: tar
shell: /bin/sh
"#;
        let config: Config = yaml.try_into().unwrap();

        assert_eq!(
            config,
            Config {
                exec_dir: PathBuf::from("/var/lib/diffpack/exec"),
                blob_dir: PathBuf::from("/var/lib/diffpack/blobs"),
                outbox_dir: PathBuf::from("/var/lib/diffpack/outbox"),
                archive_format: ArchiveFormat::Tar,
                shell: PathBuf::from("/bin/sh"),
            }
        );
    }

    #[test]
    fn config_handles_empty_file() {
        let config: Config = "".try_into().unwrap();

        assert_eq!(config, Config::default());
    }

    #[test]
    fn config_ignores_unknown_keys() {
        let config: Config = "other_config: value".try_into().unwrap();

        assert_eq!(config, Config::default());
    }

    #[test]
    fn config_returns_error_on_invalid_yaml() {
        let result: Result<Config, _> = "invalid: yaml: content: [unclosed".try_into();

        assert!(matches!(result, Err(ConfigError::ParseError { .. })));
    }

    #[test]
    fn config_returns_error_when_top_level_is_not_map() {
        let result: Result<Config, _> = "- item1\n- item2".try_into();

        assert!(matches!(result, Err(ConfigError::TopLevelNotMap)));
    }

    #[test]
    fn config_returns_error_on_non_string_value() {
        let result: Result<Config, _> = "exec_dir:\n  - a\n  - b".try_into();

        assert!(matches!(result, Err(ConfigError::NotAString { key }) if key == "exec_dir"));
    }

    #[test]
    fn config_returns_error_on_unknown_archive_format() {
        let result: Result<Config, _> = "archive_format: 7z".try_into();

        assert!(matches!(
            result,
            Err(ConfigError::InvalidArchiveFormat { value }) if value == "7z"
        ));
    }
}
