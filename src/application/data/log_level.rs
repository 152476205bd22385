use clap::ValueEnum;
use tracing::Level;

/// Verbosity selected with `--log-level`; `silent` installs no subscriber at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum LogLevel {
    /// Every visited path and forwarded script line
    Debug,
    /// Per-operation summaries
    Info,
    #[default]
    Warn,
    Error,
    Silent,
}

impl LogLevel {
    pub fn to_tracing_level(self) -> Option<Level> {
        Some(match self {
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
            LogLevel::Silent => return None,
        })
    }
}
